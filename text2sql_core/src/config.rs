//! Deployment configuration loaded from TOML.
//!
//! # Configuration Format
//!
//! ```toml
//! [llm]
//! endpoint = "https://api.openai.com/v1/chat/completions"
//! model = "gpt-4o-mini"
//! api_key_env = "OPENAI_API_KEY"   # optional; omit for local endpoints
//! timeout_secs = 30
//! max_attempts = 3
//! initial_backoff_ms = 2000
//! max_backoff_ms = 10000
//!
//! [schema]
//! name = "employees"
//! explain_mode = "single_table"    # or "multi_table"
//!
//! [[schema.tables]]
//! name = "employees"
//! columns = [{ name = "id", type = "INTEGER" }, { name = "salary", type = "REAL" }]
//! rows = [[1, 75000]]
//!
//! [[formatting.unit_suffixes]]
//! column = "salary"
//! suffix = "元"
//! requires = ["name"]
//!
//! [formatting.summary]
//! id_column = "car_id"
//! value_column = "price"
//! template = "{id}号车辆的价格是{value}"
//! ```

use crate::error::{Error, Result};
use crate::sql::explain::ExplainMode;
use crate::sql::types::{Column, Value};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Built-in presets, embedded at compile time.
pub const PRESETS: [(&str, &str); 3] = [
    ("employees", include_str!("../schemas/employees.toml")),
    ("vehicles", include_str!("../schemas/vehicles.toml")),
    ("company", include_str!("../schemas/company.toml")),
];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    pub schema: SchemaConfig,

    #[serde(default)]
    pub formatting: FormattingRules,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default)]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            temperature: 0.0,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}

fn default_timeout() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    2000
}

fn default_max_backoff_ms() -> u64 {
    10000
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaConfig {
    pub name: String,

    #[serde(default)]
    pub explain_mode: Option<ExplainMode>,

    pub tables: Vec<TableConfig>,
}

impl SchemaConfig {
    /// Explicit mode if configured, otherwise inferred from the table count.
    pub fn explain_mode(&self) -> ExplainMode {
        self.explain_mode.unwrap_or(if self.tables.len() > 1 {
            ExplainMode::MultiTable
        } else {
            ExplainMode::SingleTable
        })
    }

    fn has_column(&self, name: &str) -> bool {
        self.tables
            .iter()
            .flat_map(|t| t.columns.iter())
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

/// Column-name triggers for presentational annotations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormattingRules {
    #[serde(default)]
    pub unit_suffixes: Vec<UnitSuffix>,

    #[serde(default)]
    pub summary: Option<SummaryRule>,
}

/// Appends `suffix` to every value of `column`, when `column` and all
/// `requires` columns are present in the result headers.
#[derive(Debug, Clone, Deserialize)]
pub struct UnitSuffix {
    pub column: String,
    pub suffix: String,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// One-line summary for single-row results carrying both columns.
/// `template` uses `{id}` and `{value}` placeholders.
#[derive(Debug, Clone, Deserialize)]
pub struct SummaryRule {
    pub id_column: String,
    pub value_column: String,
    pub template: String,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn preset(name: &str) -> Result<Self> {
        let (_, content) = PRESETS
            .iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                let known: Vec<&str> = PRESETS.iter().map(|(n, _)| *n).collect();
                Error::Config(format!(
                    "unknown preset '{}' (available: {})",
                    name,
                    known.join(", ")
                ))
            })?;
        Self::from_toml_str(content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema.tables.is_empty() {
            return Err(Error::Config("schema declares no tables".to_string()));
        }

        let mut table_names = HashSet::new();
        for table in &self.schema.tables {
            if !table_names.insert(table.name.to_lowercase()) {
                return Err(Error::Config(format!("duplicate table '{}'", table.name)));
            }
            if table.columns.is_empty() {
                return Err(Error::Config(format!("table '{}' has no columns", table.name)));
            }
            let mut column_names = HashSet::new();
            for column in &table.columns {
                if !column_names.insert(column.name.to_lowercase()) {
                    return Err(Error::Config(format!(
                        "duplicate column '{}' in table '{}'",
                        column.name, table.name
                    )));
                }
            }
            for (idx, row) in table.rows.iter().enumerate() {
                if row.len() != table.columns.len() {
                    return Err(Error::Config(format!(
                        "row {} of table '{}' has {} values, expected {}",
                        idx + 1,
                        table.name,
                        row.len(),
                        table.columns.len()
                    )));
                }
            }
        }

        for rule in &self.formatting.unit_suffixes {
            for column in std::iter::once(&rule.column).chain(rule.requires.iter()) {
                self.require_column(column, "unit suffix")?;
            }
        }

        if let Some(summary) = &self.formatting.summary {
            self.require_column(&summary.id_column, "summary")?;
            self.require_column(&summary.value_column, "summary")?;
            if !summary.template.contains("{id}") || !summary.template.contains("{value}") {
                return Err(Error::Config(
                    "summary template must contain {id} and {value}".to_string(),
                ));
            }
        }

        if self.llm.max_attempts == 0 {
            return Err(Error::Config("llm.max_attempts must be at least 1".to_string()));
        }

        Ok(())
    }

    fn require_column(&self, column: &str, rule: &str) -> Result<()> {
        if self.schema.has_column(column) {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "{} rule references unknown column '{}'",
                rule, column
            )))
        }
    }
}
