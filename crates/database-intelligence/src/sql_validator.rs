//! Static safety checks for candidate SQL.
//!
//! Heuristic only: keyword substrings and a handful of injection patterns, not a
//! parser. It will reject harmless identifiers such as `update_count` or
//! `created_at`, and a determined author can obfuscate past it. Read-only
//! connections in the executor are the second line of defense.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Keywords that reject a statement wherever they appear, case-insensitively.
pub const BLOCKED_KEYWORDS: [&str; 11] = [
    "DROP", "DELETE", "UPDATE", "INSERT", "TRUNCATE", "ALTER", "CREATE", "GRANT", "REVOKE", "EXEC",
    "EXECUTE",
];

pub const EMPTY_SQL_ERROR: &str = "SQL query cannot be empty";
pub const INJECTION_ERROR: &str = "Potential SQL injection detected";
pub const UNBALANCED_PARENS_ERROR: &str = "Unbalanced parentheses in SQL query";
pub const SELECT_ONLY_ERROR: &str = "Only SELECT queries are allowed";

lazy_static! {
    static ref INJECTION_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i);\s*DROP\s+TABLE").unwrap(),
        Regex::new(r"(?i);\s*DELETE\s+FROM").unwrap(),
        Regex::new(r"(?i)UNION\s+SELECT").unwrap(),
        Regex::new(r"(?i)OR\s+1\s*=\s*1").unwrap(),
        Regex::new(r"(?i)'\s*OR\s*'").unwrap(),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl SqlValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlValidator;

impl SqlValidator {
    pub fn new() -> Self {
        Self
    }

    /// Runs every rule and accumulates all errors.
    pub fn validate(&self, sql: &str) -> SqlValidationResult {
        if sql.trim().is_empty() {
            return SqlValidationResult::from_errors(vec![EMPTY_SQL_ERROR.to_string()]);
        }

        let mut errors = Vec::new();
        let sql_upper = sql.trim().to_uppercase();

        for keyword in BLOCKED_KEYWORDS {
            if sql_upper.contains(keyword) {
                errors.push(format!(
                    "Dangerous SQL keyword detected: {}. Only SELECT queries are allowed.",
                    keyword
                ));
            }
        }

        for pattern in INJECTION_PATTERNS.iter() {
            if pattern.is_match(sql) {
                errors.push(INJECTION_ERROR.to_string());
            }
        }

        if !parentheses_balanced(sql) {
            errors.push(UNBALANCED_PARENS_ERROR.to_string());
        }

        if !sql_upper.starts_with("SELECT") {
            errors.push(SELECT_ONLY_ERROR.to_string());
        }

        SqlValidationResult::from_errors(errors)
    }
}

/// Running count never negative and ends at zero.
fn parentheses_balanced(sql: &str) -> bool {
    let mut depth: i64 = 0;
    for c in sql.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
