//! INSERT / UPDATE / DELETE shapes
//!
//! Every mutation is a locked read-modify-write of one whole table and
//! returns an empty row-set.

use log::debug;
use serde_json::{Number, Value};

use super::shape::{parse_where, Predicate, TableRef};
use super::text::{
    find_top_level, parse_value, split_top_level, strip_keyword, unwrap_parens, ColumnRef,
    ParamCursor,
};
use super::Interpreter;
use crate::error::Result;
use crate::types::{loose_eq, Row};

/// Natural keys enforced by the remote schema besides `id`
const UNIQUE_KEYS: &[(&str, [&str; 2])] = &[
    ("likes", ["post_id", "user_id"]),
    ("follows", ["follower_id", "following_id"]),
];

/// Columns a lone DELETE parameter may identify
const IDENTITY_CANDIDATES: [&str; 3] = ["id", "post_id", "user_id"];

fn unique_key(table: &str) -> Option<[&'static str; 2]> {
    UNIQUE_KEYS
        .iter()
        .find(|(name, _)| *name == table)
        .map(|(_, key)| *key)
}

/// Right-hand side of a `SET` or `ON DUPLICATE KEY UPDATE` assignment
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Assign {
    Value(Value),
    /// `VALUES(col)`: the value the conflicting tuple tried to insert
    Inserted(String),
    /// `col + n` / `col - n`
    Increment { column: String, delta: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Conflict {
    Append,
    Ignore,
    Upsert(Vec<(String, Assign)>),
}

#[derive(Debug, Clone)]
pub(crate) struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub tuples: Vec<Row>,
    pub conflict: Conflict,
}

#[derive(Debug, Clone)]
pub(crate) struct Update {
    pub table: TableRef,
    pub assignments: Vec<(String, Assign)>,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone)]
pub(crate) enum DeleteFilter {
    Predicates(Vec<Predicate>),
    /// One parameter: matches `id`, `post_id` or `user_id`
    AnyIdentity(Value),
    /// Two parameters: the table's natural key
    Pair([(String, Value); 2]),
}

#[derive(Debug, Clone)]
pub(crate) struct Delete {
    pub table: TableRef,
    pub filter: DeleteFilter,
}

fn bare_name(text: &str) -> Option<String> {
    ColumnRef::parse(text)
        .filter(|column| column.qualifier.is_none())
        .map(|column| column.name)
}

fn parse_assign(expr: &str, params: &mut ParamCursor<'_>) -> Option<Assign> {
    let expr = expr.trim();
    if let Some(value) = parse_value(expr, params) {
        return Some(Assign::Value(value));
    }
    if let Some(rest) = strip_keyword(expr, "values") {
        return Some(Assign::Inserted(bare_name(unwrap_parens(rest)?)?));
    }
    for (op, sign) in [("+", 1.0), ("-", -1.0)] {
        if let Some(pos) = find_top_level(expr, op, 1) {
            let column = bare_name(&expr[..pos])?;
            let delta = parse_value(&expr[pos + 1..], params)?;
            let delta = number_of(&delta)?;
            return Some(Assign::Increment { column, delta: sign * delta });
        }
    }
    None
}

fn parse_assignments(text: &str, params: &mut ParamCursor<'_>) -> Option<Vec<(String, Assign)>> {
    split_top_level(text, ",")
        .into_iter()
        .map(|part| {
            let eq = find_top_level(part, "=", 0)?;
            let column = ColumnRef::parse(&part[..eq])?.name;
            Some((column, parse_assign(&part[eq + 1..], params)?))
        })
        .collect()
}

/// `INSERT [IGNORE] INTO t (cols) VALUES (...)[, (...)] [ON DUPLICATE KEY UPDATE ...]`
pub(crate) fn parse_insert(text: &str, params: &mut ParamCursor<'_>) -> Option<Insert> {
    let rest = strip_keyword(text, "insert")?;
    let (rest, ignore) = match strip_keyword(rest, "ignore") {
        Some(rest) => (rest, true),
        None => (rest, false),
    };
    let rest = strip_keyword(rest, "into")?;

    let values_pos = find_top_level(rest, "values", 0)?;
    let target = rest[..values_pos].trim();
    let paren = target.find('(')?;
    let table = bare_name(&target[..paren])?;
    let columns: Vec<String> = split_top_level(unwrap_parens(&target[paren..])?, ",")
        .into_iter()
        .map(bare_name)
        .collect::<Option<_>>()?;

    let body = &rest[values_pos + 6..];
    let (tuples_text, upsert_text) = match find_top_level(body, "on duplicate key update", 0) {
        Some(pos) => (&body[..pos], Some(&body[pos + 23..])),
        None => (body, None),
    };

    let mut tuples = Vec::new();
    for tuple in split_top_level(tuples_text, ",") {
        let values = split_top_level(unwrap_parens(tuple)?, ",");
        if values.len() != columns.len() {
            return None;
        }
        let mut row = Row::new();
        for (column, value) in columns.iter().zip(values) {
            row.insert(column.clone(), parse_value(value, params)?);
        }
        tuples.push(row);
    }

    let conflict = match (upsert_text, ignore) {
        (Some(_), true) => return None,
        (Some(text), false) => Conflict::Upsert(parse_assignments(text, params)?),
        (None, true) => Conflict::Ignore,
        (None, false) => Conflict::Append,
    };
    Some(Insert { table, columns, tuples, conflict })
}

/// `UPDATE t SET ... WHERE ...`; a WHERE clause is required
pub(crate) fn parse_update(text: &str, params: &mut ParamCursor<'_>) -> Option<Update> {
    let rest = strip_keyword(text, "update")?;
    let set_pos = find_top_level(rest, "set", 0)?;
    let table = TableRef::parse(&rest[..set_pos])?;
    let after = &rest[set_pos + 3..];
    let where_pos = find_top_level(after, "where", 0)?;

    let assignments = parse_assignments(&after[..where_pos], params)?;
    if assignments
        .iter()
        .any(|(_, assign)| matches!(assign, Assign::Inserted(_)))
    {
        return None;
    }
    let predicates = parse_where(&after[where_pos + 5..], params)?;
    Some(Update { table, assignments, predicates })
}

/// `DELETE FROM t WHERE ...`
///
/// The WHERE clause is used when it parses and its placeholders consume the
/// parameters exactly. Otherwise the target rows are inferred from the
/// parameter count: one parameter matches any identity column, two match the
/// table's natural key. Anything else is not recognised.
pub(crate) fn parse_delete(
    text: &str,
    params: &mut ParamCursor<'_>,
    raw_params: &[Value],
) -> Option<Delete> {
    let rest = strip_keyword(text, "delete")?;
    let rest = strip_keyword(rest, "from")?;
    let where_pos = find_top_level(rest, "where", 0)?;
    let table = TableRef::parse(&rest[..where_pos])?;

    if let Some(predicates) = parse_where(&rest[where_pos + 5..], params) {
        if params.exactly_consumed() {
            return Some(Delete { table, filter: DeleteFilter::Predicates(predicates) });
        }
    }

    let filter = match raw_params {
        [value] => DeleteFilter::AnyIdentity(value.clone()),
        [first, second] => {
            let [a, b] = unique_key(&table.table)?;
            DeleteFilter::Pair([(a.to_string(), first.clone()), (b.to_string(), second.clone())])
        }
        _ => return None,
    };
    debug!("DELETE on '{}' resolved by parameter count", table.table);
    Some(Delete { table, filter })
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn add(current: Option<&Value>, delta: f64) -> Value {
    let sum = current.and_then(number_of).unwrap_or(0.0) + delta;
    if sum.fract() == 0.0 && sum.abs() < 9_007_199_254_740_992.0 {
        Value::from(sum as i64)
    } else {
        Number::from_f64(sum).map_or(Value::Null, Value::Number)
    }
}

fn apply_assignments(row: &mut Row, assignments: &[(String, Assign)], inserted: Option<&Row>) {
    for (column, assign) in assignments {
        let value = match assign {
            Assign::Value(value) => value.clone(),
            Assign::Inserted(source) => inserted
                .and_then(|tuple| tuple.get(source))
                .cloned()
                .unwrap_or(Value::Null),
            Assign::Increment { column: source, delta } => add(row.get(source), *delta),
        };
        row.insert(column.clone(), value);
    }
}

/// Whether `candidate` collides with `existing` by `id`, the table's natural
/// key, or (for unkeyed tables) every inserted column.
fn is_duplicate(table: &str, existing: &Row, candidate: &Row) -> bool {
    let same = |column: &str| match (existing.get(column), candidate.get(column)) {
        (Some(a), Some(b)) => !a.is_null() && loose_eq(a, b),
        _ => false,
    };

    let mut keyed = false;
    if candidate.contains_key("id") {
        keyed = true;
        if same("id") {
            return true;
        }
    }
    if let Some(key) = unique_key(table) {
        if key.iter().all(|column| candidate.contains_key(*column)) {
            keyed = true;
            if key.iter().all(|column| same(column)) {
                return true;
            }
        }
    }
    !keyed
        && candidate.iter().all(|(column, value)| {
            existing.get(column).map_or(false, |current| loose_eq(current, value))
        })
}

impl Interpreter {
    pub(crate) fn run_insert(&self, insert: &Insert) -> Result<Vec<Row>> {
        let (added, merged) = self.store.modify_table(&insert.table, |rows| {
            let mut added = 0;
            let mut merged = 0;
            for tuple in &insert.tuples {
                if insert.conflict == Conflict::Append {
                    rows.push(tuple.clone());
                    added += 1;
                    continue;
                }
                match rows.iter().position(|row| is_duplicate(&insert.table, row, tuple)) {
                    None => {
                        rows.push(tuple.clone());
                        added += 1;
                    }
                    Some(index) => {
                        if let Conflict::Upsert(assignments) = &insert.conflict {
                            apply_assignments(&mut rows[index], assignments, Some(tuple));
                            merged += 1;
                        }
                    }
                }
            }
            (added, merged)
        })?;
        debug!(
            "INSERT into '{}' ({} columns): {} added, {} merged, {} skipped",
            insert.table,
            insert.columns.len(),
            added,
            merged,
            insert.tuples.len() - added - merged
        );
        Ok(Vec::new())
    }

    pub(crate) fn run_update(&self, update: &Update) -> Result<Vec<Row>> {
        let changed = self.store.modify_table(&update.table.table, |rows| {
            let mut changed = 0;
            for row in rows.iter_mut() {
                let resolve = |column: &ColumnRef| row.get(&column.name).cloned().unwrap_or(Value::Null);
                if !update.predicates.iter().all(|p| p.matches(&resolve)) {
                    continue;
                }
                apply_assignments(row, &update.assignments, None);
                changed += 1;
            }
            changed
        })?;
        debug!("UPDATE '{}': {} rows changed", update.table.table, changed);
        Ok(Vec::new())
    }

    pub(crate) fn run_delete(&self, delete: &Delete) -> Result<Vec<Row>> {
        let removed = self.store.modify_table(&delete.table.table, |rows| {
            let before = rows.len();
            rows.retain(|row| !delete_matches(&delete.filter, row));
            before - rows.len()
        })?;
        debug!("DELETE from '{}': {} rows removed", delete.table.table, removed);
        Ok(Vec::new())
    }
}

fn delete_matches(filter: &DeleteFilter, row: &Row) -> bool {
    let has = |column: &str, value: &Value| {
        row.get(column)
            .map_or(false, |current| !current.is_null() && loose_eq(current, value))
    };
    match filter {
        DeleteFilter::Predicates(predicates) => {
            let resolve = |column: &ColumnRef| row.get(&column.name).cloned().unwrap_or(Value::Null);
            predicates.iter().all(|p| p.matches(&resolve))
        }
        DeleteFilter::AnyIdentity(value) => IDENTITY_CANDIDATES.iter().any(|column| has(column, value)),
        DeleteFilter::Pair(pair) => pair.iter().all(|(column, value)| has(column, value)),
    }
}
