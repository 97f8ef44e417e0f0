//! System and user prompts for SQL generation

use super::retrieval::SchemaContext;

/// Role plus safety constraints, parameterized by the target dialect name.
pub fn build_system_prompt(dialect: &str) -> String {
    format!(
        "You are an expert SQL query generator for {} database. \
         Convert natural language questions into valid SQL SELECT queries only. \
         Do not include DROP, DELETE, UPDATE, INSERT, or any data modification commands. \
         Return ONLY the SQL query, no explanations, no markdown formatting, no code blocks. \
         The SQL should be clean and ready to execute.",
        dialect
    )
}

/// Schema context (when any was retrieved) followed by the question.
pub fn build_user_prompt(question: &str, context: &SchemaContext) -> String {
    let mut prompt = String::new();

    if !context.is_empty() {
        prompt.push_str("Database Schema Information:\n");
        prompt.push_str(&context.to_prompt_block());
        prompt.push('\n');
    }

    prompt.push_str("Question: ");
    prompt.push_str(question);
    prompt.push_str("\n\n");
    prompt.push_str(
        "Generate a SQL SELECT query for this question. Use the schema information provided above.",
    );
    prompt
}

/// Human-readable summary returned alongside the generated SQL.
pub fn build_explanation(question: &str, sql: &str, context: &SchemaContext) -> String {
    let mut explanation = format!("Generated SQL for: \"{}\"\n\n", question);

    if !context.is_empty() {
        explanation.push_str("Used schema context from: ");
        explanation.push_str(&context.schema_names().join(", "));
        explanation.push('\n');
    }

    explanation.push_str("\nSQL Query:\n");
    explanation.push_str(sql);
    explanation
}
