//! SQL utilities for the PostgreSQL data source
//!
//! Provides condition translation, sanitization, and LIKE escaping.

pub mod condition;
pub mod sanitize;

pub use condition::{build_condition_clause, column_sql};
pub use sanitize::{
    POSTGRES_RESERVED_WORDS, escape_like, quote_identifier, validate_column_name,
    validate_identifier,
};
