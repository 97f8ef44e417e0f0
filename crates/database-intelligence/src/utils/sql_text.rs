//! Normalization of raw model output into a bare SQL statement

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref LEADING_SQL_FENCE: Regex = Regex::new(r"^(?i)```sql\s*").unwrap();
    static ref LEADING_FENCE: Regex = Regex::new(r"^```\s*").unwrap();
    static ref TRAILING_FENCE: Regex = Regex::new(r"```\s*$").unwrap();
}

/// Strips markdown code fences and one layer of surrounding quotes.
///
/// Idempotent on already-clean SQL; the result never has leading or trailing
/// whitespace.
pub fn clean_generated_sql(raw: &str) -> String {
    let mut sql = raw.trim().to_string();

    sql = LEADING_SQL_FENCE.replace(&sql, "").into_owned();
    sql = LEADING_FENCE.replace(&sql, "").into_owned();
    sql = TRAILING_FENCE.replace(&sql, "").into_owned();
    sql = sql.trim().to_string();

    let sql = strip_wrapping(&sql, '"');
    let sql = strip_wrapping(sql, '\'');
    sql.trim().to_string()
}

fn strip_wrapping(text: &str, quote: char) -> &str {
    if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_sql_fence() {
        assert_eq!(
            clean_generated_sql("```sql\nSELECT * FROM orders\n```"),
            "SELECT * FROM orders"
        );
    }

    #[test]
    fn test_strips_bare_fence() {
        assert_eq!(clean_generated_sql("```\nSELECT 1\n```  "), "SELECT 1");
    }

    #[test]
    fn test_strips_uppercase_language_tag() {
        assert_eq!(clean_generated_sql("```SQL SELECT 1```"), "SELECT 1");
    }

    #[test]
    fn test_strips_double_then_single_quotes() {
        assert_eq!(clean_generated_sql("\"SELECT 1\""), "SELECT 1");
        assert_eq!(clean_generated_sql("'SELECT 1'"), "SELECT 1");
        assert_eq!(clean_generated_sql("\"'SELECT 1'\""), "SELECT 1");
    }

    #[test]
    fn test_inner_quotes_untouched() {
        let sql = "SELECT * FROM t WHERE name = 'x'";
        assert_eq!(clean_generated_sql(sql), sql);
    }

    #[test]
    fn test_idempotent_on_clean_sql() {
        let once = clean_generated_sql("  ```sql\n SELECT id FROM t \n```\n");
        assert_eq!(once, "SELECT id FROM t");
        assert_eq!(clean_generated_sql(&once), once);
    }

    #[test]
    fn test_lone_quote_kept() {
        assert_eq!(clean_generated_sql("\""), "\"");
        assert_eq!(clean_generated_sql(""), "");
    }
}
