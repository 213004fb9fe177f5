//! Natural-language gloss of a generated SQL statement.
//!
//! The explainer works on [`SqlStatement`] tokens only. Fragments are
//! extracted positionally and lowercased for display, which loses literal
//! casing and lets a WHERE fragment swallow any trailing GROUP BY, ORDER BY
//! or LIMIT text. Both behaviours are kept on purpose and covered by tests.

use super::statement::SqlStatement;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;

const CLAUSE_STOPS: [&str; 4] = ["WHERE", "GROUP", "ORDER", "LIMIT"];
const JOIN_MODIFIERS: [&str; 7] = ["JOIN", "INNER", "LEFT", "RIGHT", "FULL", "ON", "AND"];

/// How table names are pulled out of the FROM clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplainMode {
    /// The table is the single token after `FROM`.
    #[default]
    SingleTable,
    /// Every non-modifier token between `FROM` and the next clause keyword.
    MultiTable,
}

/// Clause fragments of one statement, rendered as a single sentence by `Display`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Explanation {
    pub projection: Option<String>,
    pub tables: Option<String>,
    pub joined: bool,
    pub filter: Option<String>,
    pub grouping: Option<String>,
    pub ordering: Option<String>,
    pub limit: Option<String>,
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("这个查询")?;
        if let Some(fields) = &self.projection {
            let tables = self.tables.as_deref().unwrap_or_default();
            write!(f, "获取{}，数据来自{}表", fields, tables)?;
        }
        if self.joined {
            f.write_str("，进行了表连接")?;
        }
        if let Some(condition) = &self.filter {
            write!(f, "，条件是{}", condition)?;
        }
        if let Some(group) = &self.grouping {
            write!(f, "，按{}进行分组", group)?;
        }
        if let Some(order) = &self.ordering {
            write!(f, "，结果按{}排序", order)?;
        }
        if let Some(limit) = &self.limit {
            write!(f, "，只显示前{}条结果", limit)?;
        }
        f.write_str("。")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Explainer {
    mode: ExplainMode,
}

impl Explainer {
    pub fn new(mode: ExplainMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ExplainMode {
        self.mode
    }

    pub fn explain(&self, sql: &str) -> Result<Explanation> {
        let stmt = SqlStatement::tokenize(sql);
        log::debug!("explaining {} tokens in {:?} mode", stmt.len(), self.mode);

        let mut explanation = Explanation::default();

        if let Some(select_idx) = stmt.position("SELECT") {
            let from_idx = match stmt.position("FROM") {
                Some(idx) if idx > select_idx => idx,
                _ => return Err(Error::MalformedSql("SELECT 缺少对应的 FROM 子句".to_string())),
            };
            explanation.projection = Some(projection(stmt.slice(select_idx + 1, from_idx)));
            explanation.tables = Some(self.tables(&stmt, from_idx)?);
        }

        explanation.joined = stmt.contains("JOIN");

        if let Some(idx) = stmt.position("WHERE") {
            explanation.filter = Some(spaced_lower(stmt.tail(idx + 1)));
        }
        if let Some(idx) = stmt.pair_position("GROUP", "BY") {
            explanation.grouping = Some(spaced_lower(stmt.tail(idx + 2)));
        }
        if let Some(idx) = stmt.pair_position("ORDER", "BY") {
            explanation.ordering = Some(spaced_lower(stmt.tail(idx + 2)));
        }
        if let Some(idx) = stmt.position("LIMIT") {
            let count = stmt
                .get(idx + 1)
                .ok_or_else(|| Error::MalformedSql("LIMIT 后缺少行数".to_string()))?;
            explanation.limit = Some(count.to_string());
        }

        Ok(explanation)
    }

    fn tables(&self, stmt: &SqlStatement, from_idx: usize) -> Result<String> {
        match self.mode {
            ExplainMode::SingleTable => stmt
                .get(from_idx + 1)
                .map(str::to_lowercase)
                .ok_or_else(|| Error::MalformedSql("FROM 后缺少表名".to_string())),
            ExplainMode::MultiTable => {
                let tables: Vec<String> = stmt
                    .tail(from_idx + 1)
                    .iter()
                    .take_while(|t| !CLAUSE_STOPS.contains(&t.as_str()))
                    .filter(|t| !JOIN_MODIFIERS.contains(&t.as_str()))
                    .map(|t| t.to_lowercase())
                    .collect();
                Ok(tables.join(", "))
            }
        }
    }
}

/// Projection tokens rejoined with `", "`. A separator comma already
/// attached to a token is dropped first so it is not doubled.
fn projection(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| t.strip_suffix(',').unwrap_or(t.as_str()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
        .to_lowercase()
}

fn spaced_lower(tokens: &[String]) -> String {
    tokens.join(" ").to_lowercase()
}
