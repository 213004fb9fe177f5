//! Natural-language to SQL translation through a chat-completion model.

use crate::config::SchemaConfig;
use thiserror::Error;

mod client;
mod retry;

pub use client::ChatClient;
pub use retry::RetryPolicy;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request timed out")]
    Timeout,

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("malformed completion: {0}")]
    Malformed(String),
}

impl LlmError {
    /// Timeouts and transient service failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Timeout | LlmError::Unavailable(_))
    }
}

/// Turns a question into a completion that should contain one SQL statement.
pub trait SqlGenerator {
    fn generate(&self, system_prompt: &str, question: &str) -> Result<String, LlmError>;
}

impl<F> SqlGenerator for F
where
    F: Fn(&str, &str) -> Result<String, LlmError>,
{
    fn generate(&self, system_prompt: &str, question: &str) -> Result<String, LlmError> {
        self(system_prompt, question)
    }
}

/// System prompt describing the configured tables to the model.
pub fn system_prompt(schema: &SchemaConfig) -> String {
    let mut prompt = String::from("你是一个能够将中文自然语言查询转换为SQL查询的AI助手。\n");

    if let [table] = schema.tables.as_slice() {
        prompt.push_str(&format!(
            "数据库有一个名为'{}'的表，包含以下列：{}。\n",
            table.name,
            column_list(&table.columns)
        ));
    } else {
        prompt.push_str(&format!("数据库有{}个表：\n", schema.tables.len()));
        for (idx, table) in schema.tables.iter().enumerate() {
            prompt.push_str(&format!(
                "{}. '{}'表，包含以下列：{}\n",
                idx + 1,
                table.name,
                column_list(&table.columns)
            ));
        }
    }

    prompt.push_str("只返回SQL查询，不要包含任何其他文本或解释。");
    if schema.tables.len() > 1 {
        prompt.push_str("支持复杂查询，包括多表连接、比较、排序和聚合函数。");
    } else {
        prompt.push_str("支持复杂查询，如比较、排序和聚合函数。");
    }
    prompt
}

fn column_list(columns: &[crate::sql::types::Column]) -> String {
    columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
