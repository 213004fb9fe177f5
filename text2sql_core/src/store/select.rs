use super::eval::{
    aggregate_name, convert_sql_value, extreme_aggregate, ExpressionEvaluator, Frame, Scope,
};
use super::{MemoryStore, QueryOutput, StoreError, StoreResult};
use crate::sql::types::Value;
use sqlparser::ast::{
    Distinct, Expr, GroupByExpr, Ident, Join, JoinConstraint, JoinOperator, OrderByExpr, Query,
    SelectItem, SetExpr, TableFactor, TableWithJoins, UnaryOperator, Value as SqlValue,
};
use std::cmp::Ordering;

/// A single output column: either a source column copied through, or an
/// expression evaluated per row (or per group).
#[derive(Debug, Clone)]
enum Item {
    Column(usize),
    Expr(Expr),
}

struct OutputColumn {
    header: String,
    alias: Option<String>,
    item: Item,
}

/// Rows visible to projection: a plain row, or a group's representative
/// row plus all of its members. Bare columns read the representative.
struct Unit {
    row: Vec<Value>,
    group: Option<Vec<Vec<Value>>>,
}

impl Unit {
    fn frame(&self) -> Frame<'_> {
        Frame {
            row: &self.row,
            group: self.group.as_deref(),
        }
    }
}

enum SortKey {
    Output(usize),
    Expr(Expr),
}

pub(crate) fn run(store: &MemoryStore, query: &Query) -> StoreResult<QueryOutput> {
    if query.with.is_some() {
        return Err(StoreError::Unsupported("WITH clauses".to_string()));
    }
    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        _ => {
            return Err(StoreError::Unsupported("set operations".to_string()))
        }
    };

    let (scope, mut rows) = source(store, &select.from)?;
    let evaluator = ExpressionEvaluator::new(&scope).with_store(store);

    if let Some(selection) = &select.selection {
        if let Some(name) = aggregate_name(selection) {
            return Err(StoreError::MisusedAggregate(name));
        }
        evaluator.check(selection)?;
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if evaluator.matches(selection, Frame::row(&row))? {
                kept.push(row);
            }
        }
        rows = kept;
    }

    let columns = projection(&scope, &evaluator, &select.projection)?;

    let group_exprs = match &select.group_by {
        GroupByExpr::Expressions(exprs) => exprs
            .iter()
            .map(|expr| group_key(&scope, &evaluator, &columns, expr))
            .collect::<StoreResult<Vec<_>>>()?,
        GroupByExpr::All => return Err(StoreError::Unsupported("GROUP BY ALL".to_string())),
    };

    let aggregated = !group_exprs.is_empty()
        || select.having.is_some()
        || columns.iter().any(|c| match &c.item {
            Item::Expr(expr) => aggregate_name(expr).is_some(),
            Item::Column(_) => false,
        });

    let mut units = if aggregated {
        let mut units = group(&evaluator, &group_exprs, rows, scope.len())?;
        let extreme = extreme_aggregate(columns.iter().filter_map(|c| match &c.item {
            Item::Expr(expr) => Some(expr),
            Item::Column(_) => None,
        }));
        if let Some((is_max, arg)) = extreme {
            for unit in &mut units {
                let Some(members) = &unit.group else {
                    continue;
                };
                if let Some(row) = evaluator.extreme_row(is_max, arg, members)? {
                    unit.row = row.to_vec();
                }
            }
        }
        units
    } else {
        rows.into_iter()
            .map(|row| Unit { row, group: None })
            .collect()
    };

    if let Some(having) = &select.having {
        let mut kept = Vec::with_capacity(units.len());
        for unit in units {
            if evaluator.matches(having, unit.frame())? {
                kept.push(unit);
            }
        }
        units = kept;
    }

    let sort_keys = query
        .order_by
        .iter()
        .map(|order| sort_key(&scope, &columns, order))
        .collect::<StoreResult<Vec<_>>>()?;

    let mut output = Vec::with_capacity(units.len());
    for unit in &units {
        let frame = unit.frame();
        let values = columns
            .iter()
            .map(|c| evaluate_item(&evaluator, &c.item, frame))
            .collect::<StoreResult<Vec<_>>>()?;
        let keys = sort_keys
            .iter()
            .map(|key| match key {
                SortKey::Output(idx) => Ok(values[*idx].clone()),
                SortKey::Expr(expr) => evaluator.evaluate(expr, frame),
            })
            .collect::<StoreResult<Vec<_>>>()?;
        output.push((values, keys));
    }

    if !sort_keys.is_empty() {
        output.sort_by(|(_, a), (_, b)| compare_keys(&query.order_by, a, b));
    }

    let mut rows: Vec<Vec<Value>> = output.into_iter().map(|(values, _)| values).collect();

    match &select.distinct {
        Some(Distinct::Distinct) => {
            let mut unique: Vec<Vec<Value>> = Vec::with_capacity(rows.len());
            for row in rows {
                if !unique.contains(&row) {
                    unique.push(row);
                }
            }
            rows = unique;
        }
        Some(Distinct::On(_)) => {
            return Err(StoreError::Unsupported("DISTINCT ON".to_string()));
        }
        None => {}
    }

    let offset = match &query.offset {
        Some(offset) => constant_count(&offset.value)?.unwrap_or(0),
        None => 0,
    };
    let limit = match &query.limit {
        Some(limit) => constant_count(limit)?,
        None => None,
    };

    let rows = rows
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    Ok(QueryOutput {
        headers: columns.into_iter().map(|c| c.header).collect(),
        rows,
    })
}

/// Builds the joined row set for FROM. No FROM yields one empty row so
/// constant projections still produce output.
fn source(store: &MemoryStore, from: &[TableWithJoins]) -> StoreResult<(Scope, Vec<Vec<Value>>)> {
    let mut scope = Scope::default();
    let mut rows: Vec<Vec<Value>> = vec![Vec::new()];

    for table_with_joins in from {
        let (relation_scope, relation_rows) = relation(store, &table_with_joins.relation)?;
        let (joined_scope, joined_rows) = cross(scope, rows, relation_scope, &relation_rows);
        scope = joined_scope;
        rows = joined_rows;

        for join in &table_with_joins.joins {
            let (next_scope, next_rows) = apply_join(store, scope, rows, join)?;
            scope = next_scope;
            rows = next_rows;
        }
    }

    Ok((scope, rows))
}

fn relation(store: &MemoryStore, factor: &TableFactor) -> StoreResult<(Scope, Vec<Vec<Value>>)> {
    match factor {
        TableFactor::Table { name, alias, .. } => {
            let table_name = name
                .0
                .last()
                .map(|ident| ident.value.clone())
                .unwrap_or_default();
            let table = store
                .table(&table_name)
                .ok_or_else(|| StoreError::NoSuchTable(table_name.clone()))?;

            let qualifier = alias
                .as_ref()
                .map(|alias| alias.name.value.clone())
                .unwrap_or_else(|| table.name.clone());

            let mut scope = Scope::default();
            scope.push_table(&qualifier, &table.columns);
            Ok((scope, table.rows.clone()))
        }
        _ => Err(StoreError::Unsupported(
            "derived tables and table functions".to_string(),
        )),
    }
}

fn cross(
    mut left_scope: Scope,
    left: Vec<Vec<Value>>,
    right_scope: Scope,
    right: &[Vec<Value>],
) -> (Scope, Vec<Vec<Value>>) {
    left_scope.extend(right_scope);
    let rows = left
        .iter()
        .flat_map(|l| right.iter().map(move |r| concat(l, r)))
        .collect();
    (left_scope, rows)
}

fn apply_join(
    store: &MemoryStore,
    left_scope: Scope,
    left: Vec<Vec<Value>>,
    join: &Join,
) -> StoreResult<(Scope, Vec<Vec<Value>>)> {
    let (constraint, outer) = match &join.join_operator {
        JoinOperator::Inner(constraint) => (Some(constraint), false),
        JoinOperator::LeftOuter(constraint) => (Some(constraint), true),
        JoinOperator::CrossJoin => (None, false),
        other => {
            return Err(StoreError::Unsupported(format!("join operator {:?}", other)));
        }
    };
    let condition = match constraint {
        Some(JoinConstraint::On(expr)) => Some(expr),
        Some(JoinConstraint::None) | None => None,
        Some(JoinConstraint::Using(_)) | Some(JoinConstraint::Natural) => {
            return Err(StoreError::Unsupported("USING and NATURAL joins".to_string()));
        }
    };

    let (right_scope, right) = relation(store, &join.relation)?;
    let right_width = right_scope.len();

    let mut scope = left_scope;
    scope.extend(right_scope);

    let evaluator = ExpressionEvaluator::new(&scope).with_store(store);
    if let Some(condition) = condition {
        evaluator.check(condition)?;
    }

    let mut rows = Vec::new();
    for l in &left {
        let mut matched = false;
        for r in &right {
            let combined = concat(l, r);
            let keep = match condition {
                Some(condition) => evaluator.matches(condition, Frame::row(&combined))?,
                None => true,
            };
            if keep {
                matched = true;
                rows.push(combined);
            }
        }
        if outer && !matched {
            rows.push(concat(l, &vec![Value::Null; right_width]));
        }
    }

    Ok((scope, rows))
}

fn concat(left: &[Value], right: &[Value]) -> Vec<Value> {
    left.iter().chain(right).cloned().collect()
}

fn projection(
    scope: &Scope,
    evaluator: &ExpressionEvaluator<'_>,
    items: &[SelectItem],
) -> StoreResult<Vec<OutputColumn>> {
    let mut columns = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard(_) => {
                if scope.is_empty() {
                    return Err(StoreError::Syntax("no tables specified".to_string()));
                }
                columns.extend((0..scope.len()).map(|idx| source_column(scope, idx)));
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let qualifier = name
                    .0
                    .last()
                    .map(|ident| ident.value.clone())
                    .unwrap_or_default();
                let positions = scope.columns_of(&qualifier);
                if positions.is_empty() {
                    return Err(StoreError::NoSuchTable(qualifier));
                }
                columns.extend(positions.into_iter().map(|idx| source_column(scope, idx)));
            }
            SelectItem::UnnamedExpr(expr) => {
                let mut column = output_column(scope, evaluator, expr)?;
                if let Item::Expr(_) = column.item {
                    column.header = expr.to_string();
                }
                columns.push(column);
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                let mut column = output_column(scope, evaluator, expr)?;
                column.header = alias.value.clone();
                column.alias = Some(alias.value.clone());
                columns.push(column);
            }
        }
    }
    Ok(columns)
}

fn source_column(scope: &Scope, idx: usize) -> OutputColumn {
    OutputColumn {
        header: scope.name(idx).to_string(),
        alias: None,
        item: Item::Column(idx),
    }
}

fn output_column(
    scope: &Scope,
    evaluator: &ExpressionEvaluator<'_>,
    expr: &Expr,
) -> StoreResult<OutputColumn> {
    let reference = match expr {
        Expr::Identifier(ident) => Some(std::slice::from_ref(ident)),
        Expr::CompoundIdentifier(idents) => Some(idents.as_slice()),
        _ => None,
    };
    match reference {
        Some(idents) => {
            let idx = scope.resolve(idents)?;
            Ok(OutputColumn {
                header: idents.last().map(|i| i.value.clone()).unwrap_or_default(),
                alias: None,
                item: Item::Column(idx),
            })
        }
        None => {
            evaluator.check(expr)?;
            Ok(OutputColumn {
                header: String::new(),
                alias: None,
                item: Item::Expr(expr.clone()),
            })
        }
    }
}

fn evaluate_item(
    evaluator: &ExpressionEvaluator<'_>,
    item: &Item,
    frame: Frame<'_>,
) -> StoreResult<Value> {
    match item {
        Item::Column(idx) => Ok(frame.row[*idx].clone()),
        Item::Expr(expr) => evaluator.evaluate(expr, frame),
    }
}

/// 1-based position into the select list, as used by `GROUP BY 1`.
fn ordinal(expr: &Expr, columns: &[OutputColumn], clause: &str) -> StoreResult<Option<usize>> {
    let Expr::Value(SqlValue::Number(n, _)) = expr else {
        return Ok(None);
    };
    match n.parse::<usize>() {
        Ok(pos) if pos >= 1 && pos <= columns.len() => Ok(Some(pos - 1)),
        _ => Err(StoreError::Syntax(format!(
            "{} term out of range - should be between 1 and {}",
            clause,
            columns.len()
        ))),
    }
}

fn alias_position(ident: &Ident, columns: &[OutputColumn]) -> Option<usize> {
    columns.iter().position(|c| {
        c.alias
            .as_deref()
            .map_or(false, |alias| alias.eq_ignore_ascii_case(&ident.value))
    })
}

fn group_key(
    scope: &Scope,
    evaluator: &ExpressionEvaluator<'_>,
    columns: &[OutputColumn],
    expr: &Expr,
) -> StoreResult<Item> {
    let item = if let Some(pos) = ordinal(expr, columns, "GROUP BY")? {
        columns[pos].item.clone()
    } else if let Expr::Identifier(ident) = expr {
        match scope.resolve(std::slice::from_ref(ident)) {
            Ok(idx) => Item::Column(idx),
            Err(err) => match alias_position(ident, columns) {
                Some(pos) => columns[pos].item.clone(),
                None => return Err(err),
            },
        }
    } else {
        evaluator.check(expr)?;
        Item::Expr(expr.clone())
    };

    if let Item::Expr(expr) = &item {
        if let Some(name) = aggregate_name(expr) {
            return Err(StoreError::MisusedAggregate(name));
        }
    }
    Ok(item)
}

/// Partitions rows by the group key. Groups come out ordered by key; an
/// aggregate query without GROUP BY is one group, even over zero rows.
fn group(
    evaluator: &ExpressionEvaluator<'_>,
    keys: &[Item],
    rows: Vec<Vec<Value>>,
    width: usize,
) -> StoreResult<Vec<Unit>> {
    if keys.is_empty() {
        let row = rows.first().cloned().unwrap_or_else(|| vec![Value::Null; width]);
        return Ok(vec![Unit {
            row,
            group: Some(rows),
        }]);
    }

    let mut groups: Vec<(Vec<Value>, Vec<Vec<Value>>)> = Vec::new();
    for row in rows {
        let key = keys
            .iter()
            .map(|item| evaluate_item(evaluator, item, Frame::row(&row)))
            .collect::<StoreResult<Vec<_>>>()?;
        match groups
            .iter_mut()
            .find(|(existing, _)| cmp_values(existing, &key) == Ordering::Equal)
        {
            Some((_, members)) => members.push(row),
            None => groups.push((key, vec![row])),
        }
    }

    groups.sort_by(|(a, _), (b, _)| cmp_values(a, b));

    Ok(groups
        .into_iter()
        .filter_map(|(_, members)| {
            let row = members.first()?.clone();
            Some(Unit {
                row,
                group: Some(members),
            })
        })
        .collect())
}

fn sort_key(scope: &Scope, columns: &[OutputColumn], order: &OrderByExpr) -> StoreResult<SortKey> {
    if let Some(pos) = ordinal(&order.expr, columns, "ORDER BY")? {
        return Ok(SortKey::Output(pos));
    }
    if let Expr::Identifier(ident) = &order.expr {
        if let Some(pos) = alias_position(ident, columns) {
            return Ok(SortKey::Output(pos));
        }
        scope.resolve(std::slice::from_ref(ident))?;
    }
    Ok(SortKey::Expr(order.expr.clone()))
}

fn compare_keys(order_by: &[OrderByExpr], a: &[Value], b: &[Value]) -> Ordering {
    for ((order, left), right) in order_by.iter().zip(a).zip(b) {
        let ordering = left.sort_cmp(right);
        let ordering = if order.asc.unwrap_or(true) {
            ordering
        } else {
            ordering.reverse()
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn cmp_values(a: &[Value], b: &[Value]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(l, r)| l.sort_cmp(r))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// LIMIT/OFFSET operand. Negative values mean "no bound".
fn constant_count(expr: &Expr) -> StoreResult<Option<usize>> {
    let value = match expr {
        Expr::Value(value) => convert_sql_value(value)?,
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } if matches!(expr.as_ref(), Expr::Value(_)) => {
            return Ok(None);
        }
        _ => {
            return Err(StoreError::Unsupported(
                "LIMIT and OFFSET must be integer literals".to_string(),
            ))
        }
    };
    match value {
        Value::Integer(n) if n >= 0 => Ok(usize::try_from(n).ok()),
        Value::Integer(_) => Ok(None),
        _ => Err(StoreError::Syntax("datatype mismatch".to_string())),
    }
}
