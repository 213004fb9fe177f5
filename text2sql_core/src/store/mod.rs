//! In-memory relational store that runs generated SELECT statements.
//!
//! Lifecycle: [`MemoryStore::open`] → [`MemoryStore::seed`] →
//! [`MemoryStore::execute`] per request → [`MemoryStore::close`].

use crate::config::SchemaConfig;
use crate::sql::types::{Column, Value};
use sqlparser::ast::Statement as SqlStatement;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::{Parser as SqlParser, ParserError};
use thiserror::Error;

pub mod eval;
mod select;

/// Errors raised while seeding or querying the store. The display text is
/// what the user sees in place of a result table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("no such table: {0}")]
    NoSuchTable(String),

    #[error("no such column: {0}")]
    NoSuchColumn(String),

    #[error("ambiguous column name: {0}")]
    AmbiguousColumn(String),

    #[error("misuse of aggregate function {0}()")]
    MisusedAggregate(String),

    #[error("no such function: {0}")]
    NoSuchFunction(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("table {0} already exists")]
    DuplicateTable(String),

    #[error("table {table} has {expected} columns but {found} values were supplied")]
    RowArity {
        table: String,
        expected: usize,
        found: usize,
    },
}

impl From<ParserError> for StoreError {
    fn from(err: ParserError) -> Self {
        StoreError::Syntax(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

/// Rows of one result set, positionally aligned with `headers`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Vec<Table>,
}

impl MemoryStore {
    pub fn open() -> Self {
        log::info!("opened in-memory store");
        Self::default()
    }

    pub fn create_table(&mut self, name: &str, columns: Vec<Column>) -> StoreResult<()> {
        if self.table(name).is_some() {
            return Err(StoreError::DuplicateTable(name.to_string()));
        }
        self.tables.push(Table {
            name: name.to_string(),
            columns,
            rows: Vec::new(),
        });
        Ok(())
    }

    /// Appends a row, applying each column's type affinity.
    pub fn insert(&mut self, table: &str, values: Vec<Value>) -> StoreResult<()> {
        let target = self
            .tables
            .iter_mut()
            .find(|t| t.name.eq_ignore_ascii_case(table))
            .ok_or_else(|| StoreError::NoSuchTable(table.to_string()))?;

        if values.len() != target.columns.len() {
            return Err(StoreError::RowArity {
                table: target.name.clone(),
                expected: target.columns.len(),
                found: values.len(),
            });
        }

        let row = values
            .into_iter()
            .zip(&target.columns)
            .map(|(value, column)| value.coerce(column.data_type))
            .collect();
        target.rows.push(row);
        Ok(())
    }

    pub fn seed(&mut self, schema: &SchemaConfig) -> StoreResult<()> {
        for table in &schema.tables {
            self.create_table(&table.name, table.columns.clone())?;
            for row in &table.rows {
                self.insert(&table.name, row.clone())?;
            }
            log::info!("seeded table {} with {} rows", table.name, table.rows.len());
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Runs one read-only SELECT statement.
    pub fn execute(&self, sql: &str) -> StoreResult<QueryOutput> {
        let dialect = GenericDialect {};
        let statements = SqlParser::parse_sql(&dialect, sql)?;

        let statement = match statements.as_slice() {
            [] => return Err(StoreError::Syntax("empty statement".to_string())),
            [statement] => statement,
            _ => {
                return Err(StoreError::Unsupported(
                    "only one statement may be executed at a time".to_string(),
                ))
            }
        };

        match statement {
            SqlStatement::Query(query) => {
                let output = select::run(self, query)?;
                log::debug!("query returned {} rows", output.rows.len());
                Ok(output)
            }
            _ => Err(StoreError::Unsupported(
                "only SELECT statements can be executed".to_string(),
            )),
        }
    }

    pub fn close(self) {
        log::info!("closed in-memory store ({} tables)", self.tables.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::sql::types::DataType;

    fn employees() -> MemoryStore {
        let config = AppConfig::preset("employees").unwrap();
        let mut store = MemoryStore::open();
        store.seed(&config.schema).unwrap();
        store
    }

    fn company() -> MemoryStore {
        let config = AppConfig::preset("company").unwrap();
        let mut store = MemoryStore::open();
        store.seed(&config.schema).unwrap();
        store
    }

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_seed_applies_affinity() {
        let store = employees();
        let table = store.table("EMPLOYEES").unwrap();
        assert_eq!(table.rows.len(), 20);
        assert_eq!(table.rows[0][3], Value::Float(75000.0));
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let mut store = MemoryStore::open();
        store
            .create_table("t", vec![Column::new("id", DataType::Integer)])
            .unwrap();
        let err = store
            .create_table("T", vec![Column::new("id", DataType::Integer)])
            .unwrap_err();
        assert_eq!(err, StoreError::DuplicateTable("T".to_string()));
    }

    #[test]
    fn test_insert_checks_arity() {
        let mut store = MemoryStore::open();
        store
            .create_table("t", vec![Column::new("id", DataType::Integer)])
            .unwrap();
        let err = store
            .insert("t", vec![Value::Integer(1), Value::Integer(2)])
            .unwrap_err();
        assert!(matches!(err, StoreError::RowArity { expected: 1, found: 2, .. }));
    }

    #[test]
    fn test_select_with_filter_order_limit() {
        let store = employees();
        let output = store
            .execute("SELECT name, salary FROM employees WHERE department = 'IT' ORDER BY salary DESC LIMIT 3")
            .unwrap();
        assert_eq!(output.headers, vec!["name", "salary"]);
        assert_eq!(
            output.rows,
            vec![
                vec![text("韩磊"), Value::Float(77000.0)],
                vec![text("刘洋"), Value::Float(76000.0)],
                vec![text("张伟"), Value::Float(75000.0)],
            ]
        );
    }

    #[test]
    fn test_select_star_headers() {
        let store = employees();
        let output = store.execute("SELECT * FROM employees WHERE id = 1;").unwrap();
        assert_eq!(output.headers, vec!["id", "name", "department", "salary"]);
        assert_eq!(output.rows.len(), 1);
    }

    #[test]
    fn test_group_by_aggregates() {
        let store = employees();
        let output = store
            .execute("SELECT department, COUNT(*) AS headcount, AVG(salary) FROM employees GROUP BY department ORDER BY headcount DESC, department")
            .unwrap();
        assert_eq!(output.headers, vec!["department", "headcount", "AVG(salary)"]);
        assert_eq!(output.rows.len(), 4);
        assert_eq!(output.rows[0][1], Value::Integer(5));
        let it = output
            .rows
            .iter()
            .find(|row| row[0] == text("IT"))
            .unwrap();
        assert_eq!(it[2], Value::Float(74800.0));
    }

    #[test]
    fn test_aggregate_without_group_on_empty_input() {
        let store = employees();
        let output = store
            .execute("SELECT COUNT(*), MAX(salary) FROM employees WHERE salary > 1000000")
            .unwrap();
        assert_eq!(output.rows, vec![vec![Value::Integer(0), Value::Null]]);
    }

    #[test]
    fn test_having_filters_groups() {
        let store = employees();
        let output = store
            .execute("SELECT department FROM employees GROUP BY department HAVING MIN(salary) >= 70000 ORDER BY 1")
            .unwrap();
        assert_eq!(output.rows, vec![vec![text("IT")], vec![text("市场")], vec![text("销售")]]);
    }

    #[test]
    fn test_join_with_aliases() {
        let store = company();
        let output = store
            .execute("SELECT e.name, d.name, d.location FROM employees e JOIN departments d ON e.department_id = d.id WHERE d.name = 'HR' ORDER BY e.id")
            .unwrap();
        assert_eq!(output.headers, vec!["name", "name", "location"]);
        assert_eq!(output.rows.len(), 3);
        assert_eq!(output.rows[0], vec![text("王芳"), text("HR"), text("上海")]);
    }

    #[test]
    fn test_left_join_pads_nulls() {
        let mut store = company();
        store
            .insert(
                "employees",
                vec![Value::Integer(11), text("新人"), Value::Integer(9), Value::Integer(50000)],
            )
            .unwrap();
        let output = store
            .execute("SELECT e.name, d.name FROM employees e LEFT JOIN departments d ON e.department_id = d.id WHERE d.id IS NULL")
            .unwrap();
        assert_eq!(output.rows, vec![vec![text("新人"), Value::Null]]);
    }

    #[test]
    fn test_ambiguous_column() {
        let store = company();
        let err = store
            .execute("SELECT name FROM employees JOIN departments ON employees.department_id = departments.id")
            .unwrap_err();
        assert_eq!(err, StoreError::AmbiguousColumn("name".to_string()));
    }

    #[test]
    fn test_unknown_column_and_table() {
        let store = employees();
        assert_eq!(
            store.execute("SELECT age FROM employees").unwrap_err().to_string(),
            "no such column: age"
        );
        assert_eq!(
            store.execute("SELECT * FROM staff").unwrap_err().to_string(),
            "no such table: staff"
        );
    }

    #[test]
    fn test_like_between_in() {
        let store = employees();
        let output = store
            .execute("SELECT id FROM employees WHERE name LIKE '%梅' AND salary BETWEEN 60000 AND 80000 AND department IN ('HR', '市场') ORDER BY id")
            .unwrap();
        assert_eq!(output.rows, vec![vec![Value::Integer(14)], vec![Value::Integer(16)]]);
    }

    #[test]
    fn test_distinct_and_offset() {
        let store = employees();
        let output = store
            .execute("SELECT DISTINCT department FROM employees ORDER BY department LIMIT 2 OFFSET 1")
            .unwrap();
        assert_eq!(output.rows, vec![vec![text("IT")], vec![text("市场")]]);
    }

    #[test]
    fn test_select_without_from() {
        let store = MemoryStore::open();
        let output = store.execute("SELECT 1 + 2 AS three, 'a' || 'b'").unwrap();
        assert_eq!(output.headers[0], "three");
        assert_eq!(output.rows, vec![vec![Value::Integer(3), text("ab")]]);
    }

    #[test]
    fn test_rejects_writes_and_batches() {
        let store = employees();
        assert!(matches!(
            store.execute("DELETE FROM employees"),
            Err(StoreError::Unsupported(_))
        ));
        assert!(matches!(
            store.execute("SELECT 1; SELECT 2"),
            Err(StoreError::Unsupported(_))
        ));
        assert!(matches!(
            store.execute("SELEC name FROM employees"),
            Err(StoreError::Syntax(_))
        ));
    }

    #[test]
    fn test_aggregate_in_where_is_misuse() {
        let store = employees();
        assert_eq!(
            store
                .execute("SELECT name FROM employees WHERE salary > AVG(salary)")
                .unwrap_err(),
            StoreError::MisusedAggregate("avg".to_string())
        );
    }

    #[test]
    fn test_bare_column_follows_max() {
        let store = employees();
        let output = store
            .execute("SELECT name, MAX(salary) FROM employees")
            .unwrap();
        assert_eq!(output.rows, vec![vec![text("萧峰"), Value::Float(84000.0)]]);
    }

    #[test]
    fn test_bare_column_follows_min_per_group() {
        let store = employees();
        let output = store
            .execute("SELECT department, name, MIN(salary) FROM employees GROUP BY department")
            .unwrap();
        assert_eq!(
            output.rows,
            vec![
                vec![text("HR"), text("王芳"), Value::Float(65000.0)],
                vec![text("IT"), text("陈明"), Value::Float(72000.0)],
                vec![text("市场"), text("赵辉"), Value::Float(70000.0)],
                vec![text("销售"), text("李斯"), Value::Float(80000.0)],
            ]
        );
    }

    #[test]
    fn test_numeric_text_literal_matches_integer_column() {
        let store = employees();
        let output = store
            .execute("SELECT name FROM employees WHERE id = '1'")
            .unwrap();
        assert_eq!(output.rows, vec![vec![text("张伟")]]);
    }

    #[test]
    fn test_integer_overflow_does_not_panic() {
        let store = employees();
        let output = store
            .execute("SELECT -(-9223372036854775807 - 1), SUM(9223372036854775807) FROM employees")
            .unwrap();
        assert_eq!(
            output.rows,
            vec![vec![
                Value::Float(9223372036854775808.0),
                Value::Float(20.0 * 9223372036854775808.0),
            ]]
        );
    }

    #[test]
    fn test_scalar_subquery_in_where() {
        let store = employees();
        let output = store
            .execute("SELECT name FROM employees WHERE salary > (SELECT AVG(salary) FROM employees) AND department = 'IT' ORDER BY id")
            .unwrap();
        assert_eq!(
            output.rows,
            vec![vec![text("张伟")], vec![text("刘洋")], vec![text("郭震")], vec![text("韩磊")]]
        );
    }

    #[test]
    fn test_scalar_subquery_in_projection() {
        let store = company();
        let output = store
            .execute("SELECT (SELECT MAX(salary) FROM employees) AS top, (SELECT name FROM departments WHERE id = 9)")
            .unwrap();
        assert_eq!(output.headers[0], "top");
        assert_eq!(output.rows, vec![vec![Value::Float(82000.0), Value::Null]]);
    }

    #[test]
    fn test_in_subquery() {
        let store = company();
        let output = store
            .execute("SELECT name FROM employees WHERE department_id IN (SELECT id FROM departments WHERE location = '北京') ORDER BY id")
            .unwrap();
        assert_eq!(output.rows, vec![vec![text("张伟")], vec![text("陈明")], vec![text("刘洋")]]);

        let output = store
            .execute("SELECT name FROM employees WHERE department_id NOT IN (SELECT id FROM departments WHERE location IN ('北京', '上海')) ORDER BY id")
            .unwrap();
        assert_eq!(
            output.rows,
            vec![vec![text("李斯")], vec![text("赵静")], vec![text("周浩")], vec![text("吴娜")]]
        );
    }

    #[test]
    fn test_exists_subquery() {
        let store = company();
        let count = |location: &str| {
            store
                .execute(&format!(
                    "SELECT COUNT(*) FROM employees WHERE EXISTS (SELECT 1 FROM departments WHERE location = '{}')",
                    location
                ))
                .unwrap()
                .rows
        };
        assert_eq!(count("深圳"), vec![vec![Value::Integer(10)]]);
        assert_eq!(count("杭州"), vec![vec![Value::Integer(0)]]);
    }

    #[test]
    fn test_subquery_must_return_one_column() {
        let store = company();
        let err = store
            .execute("SELECT name FROM employees WHERE id IN (SELECT id, name FROM departments)")
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Syntax("sub-select returns 2 columns - expected 1".to_string())
        );
    }
}
