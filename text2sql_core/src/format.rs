//! Renders query results as a bordered text grid, applying the schema's
//! presentational rules (unit suffixes, single-row summaries).

use crate::config::{FormattingRules, SummaryRule, UnitSuffix};
use crate::sql::types::Value;
use crate::store::{QueryOutput, StoreError};
use tabled::builder::Builder;
use tabled::settings::Style;

/// Body text shown when a query matches no rows.
pub const NO_RESULTS: &str = "没有找到匹配的结果。";

/// Outcome of running one statement: rows or the store's error text, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Rows {
        headers: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Error(String),
}

impl From<Result<QueryOutput, StoreError>> for QueryResult {
    fn from(result: Result<QueryOutput, StoreError>) -> Self {
        match result {
            Ok(output) => QueryResult::Rows {
                headers: output.headers,
                rows: output.rows,
            },
            Err(err) => QueryResult::Error(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResultFormatter {
    rules: FormattingRules,
}

impl ResultFormatter {
    pub fn new(rules: FormattingRules) -> Self {
        Self { rules }
    }

    pub fn format(&self, result: &QueryResult) -> String {
        let (headers, rows) = match result {
            QueryResult::Error(message) => return message.clone(),
            QueryResult::Rows { rows, .. } if rows.is_empty() => return NO_RESULTS.to_string(),
            QueryResult::Rows { headers, rows } => (headers, rows),
        };

        let cells = self.cells(headers, rows);

        let mut builder = Builder::default();
        builder.push_record(headers.iter().cloned());
        for row in &cells {
            builder.push_record(row.iter().cloned());
        }
        let mut table = builder.build();
        table.with(Style::ascii());
        let grid = table.to_string();

        match self.summary(headers, &cells) {
            Some(summary) => format!("{}\n\n{}", summary, grid),
            None => grid,
        }
    }

    /// Display strings for every cell, with unit suffixes applied.
    /// Suffixed values are text from here on.
    fn cells(&self, headers: &[String], rows: &[Vec<Value>]) -> Vec<Vec<String>> {
        let suffixes: Vec<(usize, &UnitSuffix)> = self
            .rules
            .unit_suffixes
            .iter()
            .filter(|rule| rule.requires.iter().all(|c| position(headers, c).is_some()))
            .filter_map(|rule| position(headers, &rule.column).map(|idx| (idx, rule)))
            .collect();

        rows.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(idx, value)| {
                        let mut cell = value.to_string();
                        if !value.is_null() {
                            for (_, rule) in suffixes.iter().filter(|(col, _)| *col == idx) {
                                cell.push_str(&rule.suffix);
                            }
                        }
                        cell
                    })
                    .collect()
            })
            .collect()
    }

    fn summary(&self, headers: &[String], cells: &[Vec<String>]) -> Option<String> {
        let SummaryRule {
            id_column,
            value_column,
            template,
        } = self.rules.summary.as_ref()?;
        let [row] = cells else {
            return None;
        };
        let id = row.get(position(headers, id_column)?)?;
        let value = row.get(position(headers, value_column)?)?;
        Some(template.replace("{id}", id).replace("{value}", value))
    }
}

fn position(headers: &[String], column: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn formatter(preset: &str) -> ResultFormatter {
        ResultFormatter::new(AppConfig::preset(preset).unwrap().formatting)
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_no_results_regardless_of_headers() {
        for names in [vec![], vec!["id"], vec!["car_id", "price"]] {
            let result = QueryResult::Rows {
                headers: headers(&names),
                rows: vec![],
            };
            assert_eq!(formatter("vehicles").format(&result), NO_RESULTS);
        }
    }

    #[test]
    fn test_error_passes_through() {
        let result = QueryResult::Error("no such column: age".to_string());
        assert_eq!(formatter("employees").format(&result), "no such column: age");
    }

    #[test]
    fn test_salary_suffix() {
        let headers = headers(&["id", "name", "department", "salary"]);
        let rows = vec![vec![Value::Integer(1), text("张伟"), text("IT"), Value::Integer(75000)]];
        let formatter = formatter("employees");

        let cells = formatter.cells(&headers, &rows);
        assert_eq!(cells[0][3], "75000元");

        let output = formatter.format(&QueryResult::Rows { headers, rows });
        assert!(output.contains("| 75000元 |"), "{output}");
        assert!(output.starts_with('+'));
    }

    #[test]
    fn test_suffix_requires_trigger_columns() {
        let headers = headers(&["department", "salary"]);
        let rows = vec![vec![text("IT"), Value::Float(75000.0)]];
        let cells = formatter("employees").cells(&headers, &rows);
        assert_eq!(cells[0][1], "75000.0");
    }

    #[test]
    fn test_null_cells_are_not_suffixed() {
        let headers = headers(&["name", "salary"]);
        let rows = vec![vec![text("新人"), Value::Null]];
        let cells = formatter("employees").cells(&headers, &rows);
        assert_eq!(cells[0][1], "NULL");
    }

    #[test]
    fn test_single_row_summary() {
        let result = QueryResult::Rows {
            headers: headers(&["car_id", "brand", "price"]),
            rows: vec![vec![Value::Integer(7), text("Toyota"), Value::Integer(20000)]],
        };
        let output = formatter("vehicles").format(&result);
        let lines: Vec<&str> = output.lines().collect();

        assert!(lines[0].contains('7') && lines[0].contains("20000"), "{output}");
        assert_eq!(lines[0], "7号车辆的价格是20000");
        assert_eq!(lines[1], "");
        assert!(lines[2].starts_with('+'));
        assert!(output.contains("Toyota"));
    }

    #[test]
    fn test_summary_needs_exactly_one_row() {
        let result = QueryResult::Rows {
            headers: headers(&["car_id", "price"]),
            rows: vec![
                vec![Value::Integer(7), Value::Integer(20000)],
                vec![Value::Integer(8), Value::Integer(21000)],
            ],
        };
        assert!(formatter("vehicles").format(&result).starts_with('+'));
    }

    #[test]
    fn test_summary_needs_both_columns() {
        let result = QueryResult::Rows {
            headers: headers(&["car_id", "brand"]),
            rows: vec![vec![Value::Integer(7), text("Toyota")]],
        };
        assert!(formatter("vehicles").format(&result).starts_with('+'));
    }

    #[test]
    fn test_grid_has_header_row() {
        let result = QueryResult::Rows {
            headers: headers(&["id"]),
            rows: vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        };
        let output = ResultFormatter::default().format(&result);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "+----+");
        assert_eq!(lines[1], "| id |");
        assert_eq!(lines[3], "| 1  |");
    }

    #[test]
    fn test_store_error_conversion() {
        let result = QueryResult::from(Err(StoreError::NoSuchColumn("age".to_string())));
        assert_eq!(result, QueryResult::Error("no such column: age".to_string()));
    }
}
