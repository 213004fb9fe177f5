//! Error types for the text-to-SQL core

use crate::llm::LlmError;
use crate::store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("语言模型请求超时，已尝试 {attempts} 次")]
    LlmTimeout { attempts: u32 },

    #[error("语言模型调用失败: {0}")]
    Llm(#[from] LlmError),

    /// The explainer found a clause keyword without its companion.
    #[error("无法解释该查询: {0}")]
    MalformedSql(String),

    #[error("数据库错误: {0}")]
    Store(#[from] StoreError),

    #[error("配置错误: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
