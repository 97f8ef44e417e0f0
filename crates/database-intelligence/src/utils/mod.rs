//! Utilities module - text helpers shared by the pipelines

pub mod sql_text;

pub use sql_text::clean_generated_sql;
