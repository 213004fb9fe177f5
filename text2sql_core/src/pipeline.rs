//! Request orchestration: question → SQL → explanation + result → report.

use crate::config::AppConfig;
use crate::error::Result;
use crate::format::{QueryResult, ResultFormatter};
use crate::llm::{system_prompt, RetryPolicy, SqlGenerator};
use crate::sql::explain::Explainer;
use crate::sql::sanitize::sanitize;
use crate::store::MemoryStore;
use std::fmt;

/// Placeholder for report sections that could not be produced.
pub const MISSING: &str = "(无)";

const EMPTY_SQL: &str = "语言模型没有返回SQL查询。";
const NOT_EXECUTED: &str = "查询已终止：无法解释生成的SQL，未执行。";

/// The three fixed sections printed for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub sql: String,
    pub explanation: String,
    pub body: String,
}

impl Report {
    fn failed(body: String) -> Self {
        Self {
            sql: MISSING.to_string(),
            explanation: MISSING.to_string(),
            body,
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SQL查询: {}", self.sql)?;
        writeln!(f, "解释: {}", self.explanation)?;
        writeln!(f, "结果:")?;
        write!(f, "{}", self.body)
    }
}

pub struct Pipeline {
    store: MemoryStore,
    generator: Box<dyn SqlGenerator>,
    retry: RetryPolicy,
    system_prompt: String,
    explainer: Explainer,
    formatter: ResultFormatter,
}

impl Pipeline {
    /// Opens and seeds the store for `config.schema`.
    pub fn new(config: &AppConfig, generator: Box<dyn SqlGenerator>) -> Result<Self> {
        let mut store = MemoryStore::open();
        store.seed(&config.schema)?;

        Ok(Self {
            store,
            generator,
            retry: RetryPolicy::from_config(&config.llm),
            system_prompt: system_prompt(&config.schema),
            explainer: Explainer::new(config.schema.explain_mode()),
            formatter: ResultFormatter::new(config.formatting.clone()),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Full request: the language model writes the SQL.
    pub fn process(&self, question: &str) -> Report {
        let completion = match self
            .retry
            .call(self.generator.as_ref(), &self.system_prompt, question)
        {
            Ok(completion) => completion,
            Err(err) => {
                log::error!("could not translate {:?}: {}", question, err);
                return Report::failed(err.to_string());
            }
        };
        log::debug!("model completion: {:?}", completion);
        self.process_sql(&completion)
    }

    /// Runs caller-supplied SQL, possibly still wrapped in a code fence.
    pub fn process_sql(&self, raw: &str) -> Report {
        let sql = sanitize(raw);
        if sql.is_empty() {
            return Report::failed(EMPTY_SQL.to_string());
        }
        log::debug!("sanitized SQL: {}", sql);

        let explanation = match self.explainer.explain(&sql) {
            Ok(explanation) => explanation.to_string(),
            Err(err) => {
                log::error!("refusing to run {:?}: {}", sql, err);
                return Report {
                    sql,
                    explanation: err.to_string(),
                    body: NOT_EXECUTED.to_string(),
                };
            }
        };

        let result = self.execute(&sql);
        if let QueryResult::Error(message) = &result {
            log::error!("store rejected {:?}: {}", sql, message);
        }
        let body = self.formatter.format(&result);

        Report {
            sql,
            explanation,
            body,
        }
    }

    pub fn execute(&self, sql: &str) -> QueryResult {
        QueryResult::from(self.store.execute(sql))
    }

    pub fn shutdown(self) {
        self.store.close();
    }
}
