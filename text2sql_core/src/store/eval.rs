use super::{select, MemoryStore, StoreError, StoreResult};
use crate::sql::types::{Column, Value};
use sqlparser::ast::{
    BinaryOperator, Expr, Function, FunctionArg, FunctionArgExpr, Ident, Query, UnaryOperator,
    Value as SqlValue,
};
use std::cmp::Ordering;

const AGGREGATES: [&str; 5] = ["COUNT", "SUM", "AVG", "MIN", "MAX"];

#[derive(Debug, Clone)]
struct Binding {
    qualifier: String,
    name: String,
}

/// Column layout of the rows produced by FROM and JOIN.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: Vec<Binding>,
}

impl Scope {
    pub fn push_table(&mut self, qualifier: &str, columns: &[Column]) {
        self.bindings.extend(columns.iter().map(|c| Binding {
            qualifier: qualifier.to_string(),
            name: c.name.clone(),
        }));
    }

    pub fn extend(&mut self, other: Scope) {
        self.bindings.extend(other.bindings);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.bindings[idx].name
    }

    /// Positions of every column visible under `qualifier`, for `t.*`.
    pub fn columns_of(&self, qualifier: &str) -> Vec<usize> {
        self.bindings
            .iter()
            .enumerate()
            .filter(|(_, b)| b.qualifier.eq_ignore_ascii_case(qualifier))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn resolve(&self, idents: &[Ident]) -> StoreResult<usize> {
        let (qualifier, column) = match idents {
            [column] => (None, column),
            [.., qualifier, column] => (Some(qualifier), column),
            [] => return Err(StoreError::Syntax("empty identifier".to_string())),
        };

        let mut candidates = self.bindings.iter().enumerate().filter(|(_, b)| {
            b.name.eq_ignore_ascii_case(&column.value)
                && qualifier.map_or(true, |q| b.qualifier.eq_ignore_ascii_case(&q.value))
        });

        let display = || match qualifier {
            Some(q) => format!("{}.{}", q.value, column.value),
            None => column.value.clone(),
        };

        match (candidates.next(), candidates.next()) {
            (Some((idx, _)), None) => Ok(idx),
            (None, _) => Err(StoreError::NoSuchColumn(display())),
            (Some(_), Some(_)) => Err(StoreError::AmbiguousColumn(display())),
        }
    }
}

/// The row an expression is evaluated against. Aggregate functions read
/// `group`; everything else reads `row`.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub row: &'a [Value],
    pub group: Option<&'a [Vec<Value>]>,
}

impl<'a> Frame<'a> {
    pub fn row(row: &'a [Value]) -> Self {
        Self { row, group: None }
    }
}

pub struct ExpressionEvaluator<'s> {
    scope: &'s Scope,
    store: Option<&'s MemoryStore>,
}

impl<'s> ExpressionEvaluator<'s> {
    pub fn new(scope: &'s Scope) -> Self {
        Self { scope, store: None }
    }

    /// Lets subqueries read from `store`. Without it they are unsupported.
    pub fn with_store(mut self, store: &'s MemoryStore) -> Self {
        self.store = Some(store);
        self
    }

    /// WHERE/ON/HAVING semantics: UNKNOWN filters the row out.
    pub fn matches(&self, expr: &Expr, frame: Frame<'_>) -> StoreResult<bool> {
        Ok(self.evaluate(expr, frame)?.truthy().unwrap_or(false))
    }

    /// Resolves every column reference without evaluating, so unknown or
    /// ambiguous names fail even when no rows would reach them.
    pub fn check(&self, expr: &Expr) -> StoreResult<()> {
        match expr {
            Expr::Identifier(ident) => self.scope.resolve(std::slice::from_ref(ident)).map(|_| ()),
            Expr::CompoundIdentifier(idents) => self.scope.resolve(idents).map(|_| ()),
            Expr::Nested(inner)
            | Expr::IsNull(inner)
            | Expr::IsNotNull(inner)
            | Expr::UnaryOp { expr: inner, .. } => self.check(inner),
            Expr::BinaryOp { left, right, .. } => {
                self.check(left)?;
                self.check(right)
            }
            Expr::Between { expr, low, high, .. } => {
                self.check(expr)?;
                self.check(low)?;
                self.check(high)
            }
            Expr::InList { expr, list, .. } => {
                self.check(expr)?;
                list.iter().try_for_each(|e| self.check(e))
            }
            Expr::InSubquery { expr, .. } => self.check(expr),
            Expr::Like { expr, pattern, .. } | Expr::ILike { expr, pattern, .. } => {
                self.check(expr)?;
                self.check(pattern)
            }
            Expr::Function(func) => function_args(func)
                .iter()
                .filter_map(|arg| arg.as_expr())
                .try_for_each(|e| self.check(e)),
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, expr: &Expr, frame: Frame<'_>) -> StoreResult<Value> {
        match expr {
            Expr::Identifier(ident) => {
                let idx = self.scope.resolve(std::slice::from_ref(ident))?;
                Ok(frame.row[idx].clone())
            }
            Expr::CompoundIdentifier(idents) => {
                let idx = self.scope.resolve(idents)?;
                Ok(frame.row[idx].clone())
            }
            Expr::Value(sql_val) => convert_sql_value(sql_val),
            Expr::Nested(inner) => self.evaluate(inner, frame),
            Expr::UnaryOp { op, expr } => {
                let value = self.evaluate(expr, frame)?;
                self.evaluate_unary_op(op, value)
            }
            Expr::BinaryOp { left, op, right } => {
                self.evaluate_binary_op(left, op, right, frame)
            }
            Expr::IsNull(inner) => Ok(Value::from_bool(self.evaluate(inner, frame)?.is_null())),
            Expr::IsNotNull(inner) => {
                Ok(Value::from_bool(!self.evaluate(inner, frame)?.is_null()))
            }
            Expr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let value = self.evaluate(expr, frame)?;
                let low = self.evaluate(low, frame)?;
                let high = self.evaluate(high, frame)?;
                let above = value.compare(&low).map(|o| o != Ordering::Less);
                let below = value.compare(&high).map(|o| o != Ordering::Greater);
                Ok(negate(and(above, below), *negated))
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let value = self.evaluate(expr, frame)?;
                let candidates = list
                    .iter()
                    .map(|item| self.evaluate(item, frame))
                    .collect::<StoreResult<Vec<_>>>()?;
                Ok(membership(&value, &candidates, *negated))
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                let value = self.evaluate(expr, frame)?;
                let candidates = self.subquery(subquery)?;
                Ok(membership(&value, &candidates, *negated))
            }
            Expr::Subquery(query) => Ok(self
                .subquery(query)?
                .into_iter()
                .next()
                .unwrap_or(Value::Null)),
            Expr::Exists { subquery, negated } => {
                let store = self.subquery_store(subquery)?;
                let found = !select::run(store, subquery)?.rows.is_empty();
                Ok(Value::from_bool(found != *negated))
            }
            Expr::Like {
                negated,
                expr,
                pattern,
                ..
            }
            | Expr::ILike {
                negated,
                expr,
                pattern,
                ..
            } => {
                let value = self.evaluate(expr, frame)?;
                let pattern = self.evaluate(pattern, frame)?;
                if value.is_null() || pattern.is_null() {
                    return Ok(Value::Null);
                }
                let text: Vec<char> = value.to_string().chars().collect();
                let pattern: Vec<char> = pattern.to_string().chars().collect();
                Ok(negate(Some(like_match(&text, &pattern)), *negated))
            }
            Expr::Function(func) => self.evaluate_function(func, frame),
            _ => Err(StoreError::Unsupported(format!("expression {}", expr))),
        }
    }

    fn evaluate_unary_op(&self, op: &UnaryOperator, value: Value) -> StoreResult<Value> {
        match op {
            UnaryOperator::Not => Ok(negate(value.truthy(), true)),
            UnaryOperator::Plus => Ok(value),
            UnaryOperator::Minus => Ok(match numeric(value) {
                Value::Integer(i) => i
                    .checked_neg()
                    .map(Value::Integer)
                    .unwrap_or(Value::Float(-(i as f64))),
                Value::Float(f) => Value::Float(-f),
                other => other,
            }),
            _ => Err(StoreError::Unsupported(format!("operator {}", op))),
        }
    }

    fn evaluate_binary_op(
        &self,
        left: &Expr,
        op: &BinaryOperator,
        right: &Expr,
        frame: Frame<'_>,
    ) -> StoreResult<Value> {
        let left_val = self.evaluate(left, frame)?;
        let right_val = self.evaluate(right, frame)?;

        match op {
            BinaryOperator::And => Ok(and(left_val.truthy(), right_val.truthy())
                .map(Value::from_bool)
                .unwrap_or(Value::Null)),
            BinaryOperator::Or => {
                let result = match (left_val.truthy(), right_val.truthy()) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                };
                Ok(result.map(Value::from_bool).unwrap_or(Value::Null))
            }
            BinaryOperator::Gt
            | BinaryOperator::Lt
            | BinaryOperator::GtEq
            | BinaryOperator::LtEq
            | BinaryOperator::Eq
            | BinaryOperator::NotEq => Ok(compare_values(&left_val, op, &right_val)),
            BinaryOperator::Plus
            | BinaryOperator::Minus
            | BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::Modulo => Ok(arithmetic(left_val, op, right_val)),
            BinaryOperator::StringConcat => {
                if left_val.is_null() || right_val.is_null() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Text(format!("{}{}", left_val, right_val)))
                }
            }
            _ => Err(StoreError::Unsupported(format!("operator {}", op))),
        }
    }

    fn evaluate_function(&self, func: &Function, frame: Frame<'_>) -> StoreResult<Value> {
        let name = func.name.to_string().to_uppercase();
        if AGGREGATES.contains(&name.as_str()) {
            return self.evaluate_aggregate(&name, func, frame);
        }

        let args = function_args(func)
            .iter()
            .map(|arg| match arg.as_expr() {
                Some(expr) => self.evaluate(expr, frame),
                None => Err(StoreError::Syntax(format!("wildcard argument to {}", name))),
            })
            .collect::<StoreResult<Vec<_>>>()?;

        match (name.as_str(), args.as_slice()) {
            ("UPPER", [v]) => Ok(map_text(v, |s| s.to_uppercase())),
            ("LOWER", [v]) => Ok(map_text(v, |s| s.to_lowercase())),
            ("LENGTH", [v]) => Ok(if v.is_null() {
                Value::Null
            } else {
                Value::Integer(v.to_string().chars().count() as i64)
            }),
            ("ABS", [v]) => Ok(match numeric(v.clone()) {
                Value::Integer(i) => i
                    .checked_abs()
                    .map(Value::Integer)
                    .unwrap_or(Value::Float((i as f64).abs())),
                Value::Float(f) => Value::Float(f.abs()),
                other => other,
            }),
            ("ROUND", [v]) => Ok(round(v, 0)),
            ("ROUND", [v, digits]) => Ok(round(v, digits.as_i64().unwrap_or(0))),
            ("COALESCE", values) | ("IFNULL", values) if !values.is_empty() => Ok(values
                .iter()
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(Value::Null)),
            ("UPPER" | "LOWER" | "LENGTH" | "ABS" | "ROUND" | "COALESCE" | "IFNULL", _) => Err(
                StoreError::Syntax(format!("wrong number of arguments to function {}()", name)),
            ),
            _ => Err(StoreError::NoSuchFunction(func.name.to_string())),
        }
    }

    fn evaluate_aggregate(&self, name: &str, func: &Function, frame: Frame<'_>) -> StoreResult<Value> {
        let group = frame
            .group
            .ok_or_else(|| StoreError::MisusedAggregate(name.to_lowercase()))?;

        let args = function_args(func);
        if name == "COUNT" && matches!(args.as_slice(), [ArgExpr::Wildcard]) {
            return Ok(Value::Integer(group.len() as i64));
        }
        let arg = match args.as_slice() {
            [arg] => arg.as_expr().ok_or_else(|| {
                StoreError::Syntax(format!("wildcard argument to {}", name.to_lowercase()))
            })?,
            _ => {
                return Err(StoreError::Syntax(format!(
                    "wrong number of arguments to function {}()",
                    name.to_lowercase()
                )))
            }
        };

        let mut values = Vec::with_capacity(group.len());
        for row in group {
            let value = self.evaluate(arg, Frame::row(row))?;
            if !value.is_null() && !(func.distinct && values.contains(&value)) {
                values.push(value);
            }
        }

        Ok(match name {
            "COUNT" => Value::Integer(values.len() as i64),
            "SUM" if values.is_empty() => Value::Null,
            "SUM" => {
                let exact = values.iter().try_fold(0i64, |total, v| match v {
                    Value::Integer(i) => total.checked_add(*i),
                    _ => None,
                });
                match exact {
                    Some(total) => Value::Integer(total),
                    None => Value::Float(values.iter().filter_map(Value::as_f64).sum()),
                }
            }
            "AVG" if values.is_empty() => Value::Null,
            "AVG" => {
                let total: f64 = values.iter().filter_map(Value::as_f64).sum();
                Value::Float(total / values.len() as f64)
            }
            "MIN" => values.into_iter().min_by(|a, b| a.sort_cmp(b)).unwrap_or(Value::Null),
            _ => values.into_iter().max_by(|a, b| a.sort_cmp(b)).unwrap_or(Value::Null),
        })
    }

    /// Member of `group` where `arg` first reaches its maximum (or minimum).
    /// NULLs never qualify.
    pub fn extreme_row<'g>(
        &self,
        is_max: bool,
        arg: &Expr,
        group: &'g [Vec<Value>],
    ) -> StoreResult<Option<&'g [Value]>> {
        let mut best: Option<(Value, &'g [Value])> = None;
        for row in group {
            let value = self.evaluate(arg, Frame::row(row))?;
            if value.is_null() {
                continue;
            }
            let wanted = if is_max { Ordering::Greater } else { Ordering::Less };
            let replace = match &best {
                Some((current, _)) => value.sort_cmp(current) == wanted,
                None => true,
            };
            if replace {
                best = Some((value, row.as_slice()));
            }
        }
        Ok(best.map(|(_, row)| row))
    }

    fn subquery_store(&self, query: &Query) -> StoreResult<&'s MemoryStore> {
        self.store
            .ok_or_else(|| StoreError::Unsupported(format!("subquery ({})", query)))
    }

    /// First-column values of an uncorrelated subquery.
    fn subquery(&self, query: &Query) -> StoreResult<Vec<Value>> {
        let output = select::run(self.subquery_store(query)?, query)?;
        if output.headers.len() != 1 {
            return Err(StoreError::Syntax(format!(
                "sub-select returns {} columns - expected 1",
                output.headers.len()
            )));
        }
        Ok(output
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }
}

fn is_aggregate(func: &Function) -> bool {
    let name = func.name.to_string().to_uppercase();
    AGGREGATES.contains(&name.as_str())
}

/// Outermost aggregate calls in `expr`, left to right.
fn aggregate_calls<'e>(expr: &'e Expr, calls: &mut Vec<&'e Function>) {
    match expr {
        Expr::Function(func) if is_aggregate(func) => calls.push(func),
        Expr::Function(func) => {
            for arg in function_args(func) {
                if let Some(inner) = arg.as_expr() {
                    aggregate_calls(inner, calls);
                }
            }
        }
        Expr::Nested(inner)
        | Expr::IsNull(inner)
        | Expr::IsNotNull(inner)
        | Expr::UnaryOp { expr: inner, .. }
        | Expr::InSubquery { expr: inner, .. } => aggregate_calls(inner, calls),
        Expr::BinaryOp { left, right, .. }
        | Expr::Like {
            expr: left,
            pattern: right,
            ..
        }
        | Expr::ILike {
            expr: left,
            pattern: right,
            ..
        } => {
            aggregate_calls(left, calls);
            aggregate_calls(right, calls);
        }
        Expr::Between { expr, low, high, .. } => {
            aggregate_calls(expr, calls);
            aggregate_calls(low, calls);
            aggregate_calls(high, calls);
        }
        Expr::InList { expr, list, .. } => {
            aggregate_calls(expr, calls);
            for item in list {
                aggregate_calls(item, calls);
            }
        }
        _ => {}
    }
}

/// Lower-cased name of the first aggregate call inside `expr`, if any.
pub fn aggregate_name(expr: &Expr) -> Option<String> {
    let mut calls = Vec::new();
    aggregate_calls(expr, &mut calls);
    calls.first().map(|func| func.name.to_string().to_lowercase())
}

/// The only MIN or MAX call across `exprs`, as `(is_max, argument)`. Bare
/// columns in such a query are read from the row holding that extreme.
pub fn extreme_aggregate<'e>(
    exprs: impl IntoIterator<Item = &'e Expr>,
) -> Option<(bool, &'e Expr)> {
    let mut calls = Vec::new();
    for expr in exprs {
        aggregate_calls(expr, &mut calls);
    }
    let mut extremes = calls.into_iter().filter_map(|func| {
        match func.name.to_string().to_uppercase().as_str() {
            "MIN" => Some((false, func)),
            "MAX" => Some((true, func)),
            _ => None,
        }
    });
    let (is_max, func) = match (extremes.next(), extremes.next()) {
        (Some(only), None) => only,
        _ => return None,
    };
    match function_args(func).as_slice() {
        [ArgExpr::Expr(arg)] => Some((is_max, *arg)),
        _ => None,
    }
}

enum ArgExpr<'a> {
    Expr(&'a Expr),
    Wildcard,
}

impl<'a> ArgExpr<'a> {
    fn as_expr(&self) -> Option<&'a Expr> {
        match self {
            ArgExpr::Expr(expr) => Some(expr),
            ArgExpr::Wildcard => None,
        }
    }
}

fn function_args(func: &Function) -> Vec<ArgExpr<'_>> {
    func.args
        .iter()
        .map(|arg| {
            let arg = match arg {
                FunctionArg::Unnamed(arg) => arg,
                FunctionArg::Named { arg, .. } => arg,
            };
            match arg {
                FunctionArgExpr::Expr(expr) => ArgExpr::Expr(expr),
                FunctionArgExpr::Wildcard | FunctionArgExpr::QualifiedWildcard(_) => {
                    ArgExpr::Wildcard
                }
            }
        })
        .collect()
}

pub fn convert_sql_value(sql_val: &SqlValue) -> StoreResult<Value> {
    match sql_val {
        SqlValue::Number(n, _) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Value::Integer(i))
            } else {
                n.parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| StoreError::Syntax(format!("invalid number {}", n)))
            }
        }
        SqlValue::SingleQuotedString(s) | SqlValue::DoubleQuotedString(s) => {
            Ok(Value::Text(s.clone()))
        }
        SqlValue::Boolean(b) => Ok(Value::from_bool(*b)),
        SqlValue::Null => Ok(Value::Null),
        _ => Err(StoreError::Unsupported(format!("literal {}", sql_val))),
    }
}

/// `IN` over already evaluated candidates, NULL-aware.
fn membership(value: &Value, candidates: &[Value], negated: bool) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let mut saw_null = false;
    for candidate in candidates {
        match value.compare(candidate) {
            Some(Ordering::Equal) => return Value::from_bool(!negated),
            None => saw_null = true,
            Some(_) => {}
        }
    }
    if saw_null {
        Value::Null
    } else {
        Value::from_bool(negated)
    }
}

fn compare_values(left: &Value, op: &BinaryOperator, right: &Value) -> Value {
    let Some(ordering) = left.compare(right) else {
        return Value::Null;
    };
    Value::from_bool(match op {
        BinaryOperator::Eq => ordering == Ordering::Equal,
        BinaryOperator::NotEq => ordering != Ordering::Equal,
        BinaryOperator::Gt => ordering == Ordering::Greater,
        BinaryOperator::Lt => ordering == Ordering::Less,
        BinaryOperator::GtEq => ordering != Ordering::Less,
        _ => ordering != Ordering::Greater,
    })
}

/// Text operands are read as numbers; non-numeric text is zero.
fn numeric(value: Value) -> Value {
    match value {
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::Integer)
                .or_else(|_| s.parse::<f64>().map(Value::Float))
                .unwrap_or(Value::Integer(0))
        }
        other => other,
    }
}

fn arithmetic(left: Value, op: &BinaryOperator, right: Value) -> Value {
    if left.is_null() || right.is_null() {
        return Value::Null;
    }
    match (numeric(left), numeric(right)) {
        (Value::Integer(l), Value::Integer(r)) => {
            let result = match op {
                BinaryOperator::Plus => l.checked_add(r),
                BinaryOperator::Minus => l.checked_sub(r),
                BinaryOperator::Multiply => l.checked_mul(r),
                BinaryOperator::Divide if r == 0 => return Value::Null,
                BinaryOperator::Divide => l.checked_div(r),
                BinaryOperator::Modulo if r == 0 => return Value::Null,
                _ => l.checked_rem(r),
            };
            result
                .map(Value::Integer)
                .unwrap_or_else(|| float_arithmetic(l as f64, op, r as f64))
        }
        (l, r) => float_arithmetic(
            l.as_f64().unwrap_or(0.0),
            op,
            r.as_f64().unwrap_or(0.0),
        ),
    }
}

fn float_arithmetic(l: f64, op: &BinaryOperator, r: f64) -> Value {
    match op {
        BinaryOperator::Plus => Value::Float(l + r),
        BinaryOperator::Minus => Value::Float(l - r),
        BinaryOperator::Multiply => Value::Float(l * r),
        _ if r == 0.0 => Value::Null,
        BinaryOperator::Divide => Value::Float(l / r),
        _ => Value::Float(l % r),
    }
}

fn and(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn negate(result: Option<bool>, negated: bool) -> Value {
    match result {
        Some(b) => Value::from_bool(b != negated),
        None => Value::Null,
    }
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    if value.is_null() {
        Value::Null
    } else {
        Value::Text(f(&value.to_string()))
    }
}

fn round(value: &Value, digits: i64) -> Value {
    let Some(v) = value.as_f64() else {
        return Value::Null;
    };
    let factor = 10f64.powi(digits.clamp(0, 15) as i32);
    Value::Float((v * factor).round() / factor)
}

/// SQL LIKE with `%` and `_`, ASCII case-insensitive.
fn like_match(text: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('%', rest)) => (0..=text.len()).any(|i| like_match(&text[i..], rest)),
        Some(('_', rest)) => !text.is_empty() && like_match(&text[1..], rest),
        Some((c, rest)) => match text.split_first() {
            Some((t, text_rest)) => t.eq_ignore_ascii_case(c) && like_match(text_rest, rest),
            None => false,
        },
    }
}
