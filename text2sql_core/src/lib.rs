/// Module defining the crate-wide error type.
pub mod error;

/// Module loading deployment configuration and built-in schema presets.
pub mod config;

/// Module for SQL cleanup, tokenization and explanation.
pub mod sql;

/// Module holding the in-memory relational store.
pub mod store;

/// Module reaching the language model that writes SQL.
pub mod llm;

/// Module rendering query results for display.
pub mod format;

/// Module sequencing one request from question to report.
pub mod pipeline;

/// Re-export of the crate error and result alias.
pub use error::{Error, Result};

/// Re-exports for configuration types.
pub use config::{AppConfig, FormattingRules, LlmConfig, SchemaConfig};

/// Re-exports for the explainer and its output.
pub use sql::explain::{ExplainMode, Explainer, Explanation};

/// Re-export of the completion sanitizer.
pub use sql::sanitize::sanitize;

/// Re-exports for the store handle and its results.
pub use store::{MemoryStore, QueryOutput, StoreError};

/// Re-exports for the language-model collaborator.
pub use llm::{ChatClient, LlmError, RetryPolicy, SqlGenerator};

/// Re-exports for result formatting.
pub use format::{QueryResult, ResultFormatter};

/// Re-exports for the orchestrator.
pub use pipeline::{Pipeline, Report};
