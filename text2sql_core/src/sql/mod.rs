/// Scalar values and column types shared by the store and formatter.
pub mod types;

/// Markdown fence stripping for model completions.
pub mod sanitize;

/// Uppercased whitespace tokenization of a SQL string.
pub mod statement;

/// Clause-by-clause natural-language gloss of a statement.
pub mod explain;
