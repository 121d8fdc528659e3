//! SELECT shapes
//!
//! Three joined shapes (feed, post comments, follow graph) share one join
//! runner; they differ in the tables they accept and their default ordering.
//! Single-table selects are either a `COUNT(*)` or a plain lookup.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use super::shape::{parse_order_by, parse_where, Operand, OrderKey, Predicate, Shape, TableRef, Test};
use super::text::{
    as_count, find_top_level, parse_literal, parse_value, split_top_level, strip_keyword,
    unquote_ident, unwrap_parens, ColumnRef, ParamCursor,
};
use super::Interpreter;
use crate::error::Result;
use crate::types::{compare_values, loose_eq, Row};

/// Clause keywords in the order they must appear after FROM
const CLAUSES: [&str; 6] = ["where", "group by", "having", "order by", "limit", "offset"];

#[derive(Debug, Clone)]
pub(crate) enum SelectItem {
    /// `*`
    Star,
    /// `alias.*`
    AllOf(String),
    Column { column: ColumnRef, alias: String },
    Literal { value: Value, alias: String },
    CountStar { alias: String },
    Derived { alias: String, derived: Derived },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DerivedKind {
    Count,
    Exists,
}

/// A correlated `(SELECT COUNT(*) ...)` or `EXISTS (SELECT ...)` column
#[derive(Debug, Clone)]
pub(crate) struct Derived {
    pub kind: DerivedKind,
    pub source: TableRef,
    pub predicates: Vec<Predicate>,
}

/// ORDER BY / LIMIT / OFFSET
#[derive(Debug, Clone, Default)]
pub(crate) struct Window {
    pub order: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// `base JOIN joined ON joined.col = base.col`
#[derive(Debug, Clone)]
pub(crate) struct JoinedSelect {
    pub base: TableRef,
    pub joined: TableRef,
    pub outer: bool,
    pub base_key: String,
    pub joined_key: String,
    pub items: Vec<SelectItem>,
    pub predicates: Vec<Predicate>,
    pub window: Window,
}

#[derive(Debug, Clone)]
pub(crate) struct Lookup {
    pub source: TableRef,
    pub items: Vec<SelectItem>,
    pub predicates: Vec<Predicate>,
    pub window: Window,
}

#[derive(Debug, Clone)]
pub(crate) struct CountSelect {
    pub source: TableRef,
    pub alias: String,
    pub predicates: Vec<Predicate>,
}

struct SelectParts<'a> {
    items: &'a str,
    from: &'a str,
    where_clause: Option<&'a str>,
    order_by: Option<&'a str>,
    limit: Option<&'a str>,
    offset: Option<&'a str>,
}

fn split_select(text: &str) -> Option<SelectParts<'_>> {
    let rest = strip_keyword(text, "select")?;
    if strip_keyword(rest, "distinct").is_some() {
        return None;
    }
    let from_pos = find_top_level(rest, "from", 0)?;
    let tail = &rest[from_pos + 4..];
    if find_top_level(tail, "union", 0).is_some() {
        return None;
    }

    let mut found: Vec<(usize, &str)> = CLAUSES
        .iter()
        .filter_map(|kw| find_top_level(tail, kw, 0).map(|pos| (pos, *kw)))
        .collect();
    found.sort();
    let in_order = found
        .windows(2)
        .all(|pair| CLAUSES.iter().position(|kw| *kw == pair[0].1) < CLAUSES.iter().position(|kw| *kw == pair[1].1));
    if !in_order {
        return None;
    }

    let from_end = found.first().map_or(tail.len(), |(pos, _)| *pos);
    let mut parts = SelectParts {
        items: rest[..from_pos].trim(),
        from: tail[..from_end].trim(),
        where_clause: None,
        order_by: None,
        limit: None,
        offset: None,
    };
    for (i, (pos, kw)) in found.iter().enumerate() {
        let end = found.get(i + 1).map_or(tail.len(), |(next, _)| *next);
        let body = tail[pos + kw.len()..end].trim();
        match *kw {
            "where" => parts.where_clause = Some(body),
            "order by" => parts.order_by = Some(body),
            "limit" => parts.limit = Some(body),
            "offset" => parts.offset = Some(body),
            _ => return None,
        }
    }
    Some(parts)
}

fn is_count_star(expr: &str) -> bool {
    let compact: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    compact.eq_ignore_ascii_case("count(*)") || compact.eq_ignore_ascii_case("count(1)")
}

impl SelectItem {
    fn parse(item: &str, params: &mut ParamCursor<'_>) -> Option<Self> {
        let (expr, alias) = match find_top_level(item, "as", 0) {
            Some(pos) => (item[..pos].trim(), Some(unquote_ident(&item[pos + 2..]).to_string())),
            None => (item.trim(), None),
        };

        if expr == "*" {
            return Some(SelectItem::Star);
        }
        if let Some(qualifier) = expr.strip_suffix(".*") {
            let table = ColumnRef::parse(qualifier).filter(|c| c.qualifier.is_none())?;
            return Some(SelectItem::AllOf(table.name));
        }
        if is_count_star(expr) {
            return Some(SelectItem::CountStar {
                alias: alias.unwrap_or_else(|| "COUNT(*)".to_string()),
            });
        }
        if let Some(rest) = strip_keyword(expr, "exists") {
            let derived = Derived::parse(unwrap_parens(rest)?, DerivedKind::Exists, params)?;
            return Some(SelectItem::Derived {
                alias: alias.unwrap_or_else(|| expr.to_string()),
                derived,
            });
        }
        if let Some(inner) = unwrap_parens(expr) {
            let derived = Derived::parse(inner, DerivedKind::Count, params)?;
            return Some(SelectItem::Derived {
                alias: alias.unwrap_or_else(|| expr.to_string()),
                derived,
            });
        }
        if let Some(value) = parse_literal(expr) {
            return Some(SelectItem::Literal {
                value,
                alias: alias.unwrap_or_else(|| expr.to_string()),
            });
        }
        let column = ColumnRef::parse(expr)?;
        let alias = alias.unwrap_or_else(|| column.name.clone());
        Some(SelectItem::Column { column, alias })
    }
}

fn parse_items(text: &str, params: &mut ParamCursor<'_>) -> Option<Vec<SelectItem>> {
    split_top_level(text, ",")
        .into_iter()
        .map(|item| SelectItem::parse(item, params))
        .collect()
}

impl Derived {
    fn parse(inner: &str, kind: DerivedKind, params: &mut ParamCursor<'_>) -> Option<Self> {
        let parts = split_select(inner)?;
        if parts.order_by.is_some() || parts.offset.is_some() {
            return None;
        }
        if kind == DerivedKind::Count && !is_count_star(parts.items) {
            return None;
        }
        let source = TableRef::parse(parts.from)?;
        let predicates = match parts.where_clause {
            Some(clause) => parse_where(clause, params)?,
            None => Vec::new(),
        };
        // EXISTS (... LIMIT 1): consume the operand, the answer is the same
        if let Some(limit) = parts.limit {
            parse_value(limit, params)?;
        }
        Some(Self { kind, source, predicates })
    }
}

fn parse_window(parts: &SelectParts<'_>, params: &mut ParamCursor<'_>) -> Option<Window> {
    let order = match parts.order_by {
        Some(clause) => parse_order_by(clause)?,
        None => Vec::new(),
    };
    let limit = match parts.limit {
        Some(clause) if clause.contains(',') => return None,
        Some(clause) => Some(as_count(&parse_value(clause, params)?)?),
        None => None,
    };
    let offset = match parts.offset {
        Some(clause) => as_count(&parse_value(clause, params)?)?,
        None => 0,
    };
    Some(Window { order, limit, offset })
}

/// Split `base [LEFT|INNER] JOIN joined ON a = b`. Returns (base, joined, outer, on-clause).
fn split_join(from: &str) -> Option<(TableRef, TableRef, bool, &str)> {
    let join_pos = find_top_level(from, "join", 0)?;
    let before = from[..join_pos].trim();
    let after = &from[join_pos + 4..];
    if find_top_level(after, "join", 0).is_some() {
        return None;
    }

    let lower = before.to_ascii_lowercase();
    let (base_text, outer) = if let Some(stripped) = lower.strip_suffix(" left outer") {
        (&before[..stripped.len()], true)
    } else if let Some(stripped) = lower.strip_suffix(" left") {
        (&before[..stripped.len()], true)
    } else if let Some(stripped) = lower.strip_suffix(" inner") {
        (&before[..stripped.len()], false)
    } else {
        (before, false)
    };

    let on_pos = find_top_level(after, "on", 0)?;
    let base = TableRef::parse(base_text)?;
    let joined = TableRef::parse(after[..on_pos].trim())?;
    Some((base, joined, outer, after[on_pos + 2..].trim()))
}

/// Classify a SELECT into one of the read shapes
pub(crate) fn classify(text: &str, params: &mut ParamCursor<'_>) -> Option<Shape> {
    let parts = split_select(text)?;
    let items = parse_items(parts.items, params)?;

    if find_top_level(parts.from, "join", 0).is_some() {
        return classify_joined(&parts, items, params);
    }

    let source = TableRef::parse(parts.from)?;
    let predicates = match parts.where_clause {
        Some(clause) => parse_where(clause, params)?,
        None => Vec::new(),
    };

    if let [SelectItem::CountStar { alias }] = items.as_slice() {
        if parts.order_by.is_some() || parts.limit.is_some() {
            return None;
        }
        return Some(Shape::Count(CountSelect {
            source,
            alias: alias.clone(),
            predicates,
        }));
    }
    if items
        .iter()
        .any(|item| matches!(item, SelectItem::CountStar { .. } | SelectItem::Derived { .. }))
    {
        return None;
    }

    let window = parse_window(&parts, params)?;
    Some(Shape::Lookup(Lookup { source, items, predicates, window }))
}

fn classify_joined(
    parts: &SelectParts<'_>,
    items: Vec<SelectItem>,
    params: &mut ParamCursor<'_>,
) -> Option<Shape> {
    let (base, joined, outer, on_clause) = split_join(parts.from)?;

    let on = Predicate::parse(on_clause, params)?;
    let other = match &on.test {
        Test::Eq(Operand::Column(other)) => other,
        _ => return None,
    };
    let qualifier_of = |column: &ColumnRef| column.qualifier.clone().unwrap_or_default();
    let (base_key, joined_key) = if joined.answers_to(&qualifier_of(&on.column))
        && base.answers_to(&qualifier_of(other))
    {
        (other.name.clone(), on.column.name.clone())
    } else if base.answers_to(&qualifier_of(&on.column)) && joined.answers_to(&qualifier_of(other)) {
        (on.column.name.clone(), other.name.clone())
    } else {
        return None;
    };

    if items.iter().any(|item| matches!(item, SelectItem::CountStar { .. })) {
        return None;
    }
    let predicates = match parts.where_clause {
        Some(clause) => parse_where(clause, params)?,
        None => Vec::new(),
    };
    let window = parse_window(parts, params)?;

    let select = JoinedSelect {
        base,
        joined,
        outer,
        base_key,
        joined_key,
        items,
        predicates,
        window,
    };
    match (select.base.table.as_str(), select.joined.table.as_str()) {
        ("posts", "profiles") => Some(Shape::Feed(select)),
        ("comments", "profiles") => Some(Shape::PostComments(select)),
        ("follows", "profiles") => Some(Shape::FollowGraph(select)),
        _ => None,
    }
}

/// Rows visible to column references, innermost first
struct Scope<'a> {
    bindings: Vec<(&'a TableRef, Option<&'a Row>)>,
}

impl<'a> Scope<'a> {
    fn get(&self, column: &ColumnRef) -> Value {
        let found = match &column.qualifier {
            Some(qualifier) => self
                .bindings
                .iter()
                .find(|(table, _)| table.answers_to(qualifier))
                .and_then(|(_, row)| row.and_then(|row| row.get(&column.name))),
            None => self
                .bindings
                .iter()
                .find_map(|(_, row)| row.and_then(|row| row.get(&column.name))),
        };
        found.cloned().unwrap_or(Value::Null)
    }

    fn matches_all(&self, predicates: &[Predicate]) -> bool {
        let resolve = |column: &ColumnRef| self.get(column);
        predicates.iter().all(|predicate| predicate.matches(&resolve))
    }
}

/// Whole tables loaded at most once per query
struct TableCache<'a> {
    interpreter: &'a Interpreter,
    tables: HashMap<String, Vec<Row>>,
}

impl<'a> TableCache<'a> {
    fn new(interpreter: &'a Interpreter) -> Self {
        Self { interpreter, tables: HashMap::new() }
    }

    fn load(&mut self, table: &str) {
        if !self.tables.contains_key(table) {
            let rows = self.interpreter.store.get_table(table);
            self.tables.insert(table.to_string(), rows);
        }
    }

    fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn evaluate_derived(derived: &Derived, outer: &Scope<'_>, cache: &TableCache<'_>) -> Value {
    let mut candidates = cache.rows(&derived.source.table).iter().filter(|row| {
        let mut bindings = vec![(&derived.source, Some(*row))];
        for &(table, outer_row) in &outer.bindings {
            bindings.push((table, outer_row));
        }
        Scope { bindings }.matches_all(&derived.predicates)
    });
    match derived.kind {
        DerivedKind::Count => Value::from(candidates.count()),
        // MySQL reports EXISTS as 0/1
        DerivedKind::Exists => Value::from(i64::from(candidates.next().is_some())),
    }
}

fn project(items: &[SelectItem], scope: &Scope<'_>, cache: &TableCache<'_>) -> Row {
    let mut out = Row::new();
    for item in items {
        match item {
            SelectItem::Star => {
                // Innermost binding is listed first; the base table should win ties
                for (_, row) in scope.bindings.iter().rev() {
                    if let Some(row) = row {
                        out.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
            }
            SelectItem::AllOf(qualifier) => {
                let row = scope
                    .bindings
                    .iter()
                    .find(|(table, _)| table.answers_to(qualifier))
                    .and_then(|(_, row)| *row);
                if let Some(row) = row {
                    out.extend(row.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            SelectItem::Column { column, alias } => {
                out.insert(alias.clone(), scope.get(column));
            }
            SelectItem::Literal { value, alias } => {
                out.insert(alias.clone(), value.clone());
            }
            SelectItem::CountStar { alias } => {
                out.insert(alias.clone(), Value::Null);
            }
            SelectItem::Derived { alias, derived } => {
                out.insert(alias.clone(), evaluate_derived(derived, scope, cache));
            }
        }
    }
    out
}

/// Unqualified keys prefer output aliases (e.g. `ORDER BY like_count`)
fn sort_key(key: &OrderKey, output: &Row, scope: &Scope<'_>) -> Value {
    if key.column.qualifier.is_none() {
        if let Some(value) = output.get(&key.column.name) {
            return value.clone();
        }
    }
    scope.get(&key.column)
}

fn apply_window(mut entries: Vec<(Row, Vec<Value>)>, window: &Window, order: &[OrderKey]) -> Vec<Row> {
    if !order.is_empty() {
        entries.sort_by(|(_, a), (_, b)| {
            for (i, key) in order.iter().enumerate() {
                let ord = compare_values(&a[i], &b[i]);
                let ord = if key.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
    entries
        .into_iter()
        .skip(window.offset)
        .take(window.limit.unwrap_or(usize::MAX))
        .map(|(row, _)| row)
        .collect()
}

fn preload_derived(items: &[SelectItem], cache: &mut TableCache<'_>) {
    for item in items {
        if let SelectItem::Derived { derived, .. } = item {
            cache.load(&derived.source.table);
        }
    }
}

impl Interpreter {
    /// Posts with author profile fields and like/comment aggregates, newest first
    pub(crate) fn run_feed(&self, select: &JoinedSelect) -> Result<Vec<Row>> {
        let newest_first = OrderKey {
            column: ColumnRef {
                qualifier: Some(select.base.alias.clone()),
                name: "created_at".to_string(),
            },
            descending: true,
        };
        self.run_joined(select, Some(newest_first))
    }

    /// Comments on a post with commenter profile fields, oldest first
    pub(crate) fn run_post_comments(&self, select: &JoinedSelect) -> Result<Vec<Row>> {
        let oldest_first = OrderKey {
            column: ColumnRef {
                qualifier: Some(select.base.alias.clone()),
                name: "created_at".to_string(),
            },
            descending: false,
        };
        self.run_joined(select, Some(oldest_first))
    }

    /// Followers or followees, depending on which side of `follows` the ON clause uses
    pub(crate) fn run_follow_graph(&self, select: &JoinedSelect) -> Result<Vec<Row>> {
        self.run_joined(select, None)
    }

    fn run_joined(&self, select: &JoinedSelect, default_order: Option<OrderKey>) -> Result<Vec<Row>> {
        let mut cache = TableCache::new(self);
        cache.load(&select.base.table);
        cache.load(&select.joined.table);
        preload_derived(&select.items, &mut cache);

        let order: Vec<OrderKey> = if select.window.order.is_empty() {
            default_order.into_iter().collect()
        } else {
            select.window.order.clone()
        };

        let joined_rows = cache.rows(&select.joined.table);
        let mut entries = Vec::new();
        for base_row in cache.rows(&select.base.table) {
            let partner = base_row
                .get(&select.base_key)
                .filter(|key| !key.is_null())
                .and_then(|key| {
                    joined_rows.iter().find(|row| {
                        row.get(&select.joined_key)
                            .map_or(false, |candidate| loose_eq(candidate, key))
                    })
                });
            if partner.is_none() && !select.outer {
                continue;
            }

            let scope = Scope {
                bindings: vec![(&select.base, Some(base_row)), (&select.joined, partner)],
            };
            if !scope.matches_all(&select.predicates) {
                continue;
            }
            let output = project(&select.items, &scope, &cache);
            let keys = order.iter().map(|key| sort_key(key, &output, &scope)).collect();
            entries.push((output, keys));
        }
        Ok(apply_window(entries, &select.window, &order))
    }

    pub(crate) fn run_count(&self, count: &CountSelect) -> Result<Vec<Row>> {
        let rows = self.store.get_table(&count.source.table);
        let total = rows
            .iter()
            .filter(|row| {
                Scope { bindings: vec![(&count.source, Some(*row))] }.matches_all(&count.predicates)
            })
            .count();
        let mut out = Row::new();
        out.insert(count.alias.clone(), Value::from(total));
        Ok(vec![out])
    }

    pub(crate) fn run_lookup(&self, lookup: &Lookup) -> Result<Vec<Row>> {
        let cache = TableCache::new(self);
        let rows = self.store.get_table(&lookup.source.table);
        let mut entries = Vec::new();
        for row in &rows {
            let scope = Scope { bindings: vec![(&lookup.source, Some(row))] };
            if !scope.matches_all(&lookup.predicates) {
                continue;
            }
            let output = project(&lookup.items, &scope, &cache);
            let keys = lookup
                .window
                .order
                .iter()
                .map(|key| sort_key(key, &output, &scope))
                .collect();
            entries.push((output, keys));
        }
        Ok(apply_window(entries, &lookup.window, &lookup.window.order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify_select(sql: &str, params: &[Value]) -> Option<Shape> {
        let text = super::super::text::collapse(sql);
        let mut cursor = ParamCursor::new(params);
        classify(&text, &mut cursor)
    }

    #[test]
    fn test_split_select_clauses() {
        let parts = split_select("SELECT * FROM posts WHERE a = ? ORDER BY created_at DESC LIMIT 10 OFFSET 5").unwrap();
        assert_eq!(parts.items, "*");
        assert_eq!(parts.from, "posts");
        assert_eq!(parts.where_clause, Some("a = ?"));
        assert_eq!(parts.order_by, Some("created_at DESC"));
        assert_eq!(parts.limit, Some("10"));
        assert_eq!(parts.offset, Some("5"));
    }

    #[test]
    fn test_split_select_rejects_grouping_and_misordered_clauses() {
        assert!(split_select("SELECT user_id FROM posts GROUP BY user_id").is_none());
        assert!(split_select("SELECT * FROM posts LIMIT 1 WHERE a = 1").is_none());
        assert!(split_select("SELECT DISTINCT domain FROM posts").is_none());
    }

    #[test]
    fn test_feed_classification_binds_viewer_before_filter() {
        let sql = "SELECT p.*, pr.username, \
                   EXISTS (SELECT 1 FROM likes l WHERE l.post_id = p.id AND l.user_id = ?) AS is_liked \
                   FROM posts p JOIN profiles pr ON pr.id = p.user_id WHERE p.domain = ?";
        match classify_select(sql, &[json!("viewer"), json!("science")]) {
            Some(Shape::Feed(select)) => {
                assert_eq!(select.base_key, "user_id");
                assert_eq!(select.joined_key, "id");
                assert_eq!(select.predicates[0].equality_value(), Some(&json!("science")));
                match &select.items[2] {
                    SelectItem::Derived { alias, derived } => {
                        assert_eq!(alias, "is_liked");
                        assert_eq!(derived.kind, DerivedKind::Exists);
                        assert_eq!(derived.predicates[1].equality_value(), Some(&json!("viewer")));
                    }
                    other => panic!("expected derived item, got {:?}", other),
                }
            }
            other => panic!("expected feed, got {:?}", other),
        }
    }

    #[test]
    fn test_join_on_clause_either_orientation() {
        let a = classify_select("SELECT c.* FROM comments c JOIN profiles pr ON c.user_id = pr.id", &[]);
        let b = classify_select("SELECT c.* FROM comments c JOIN profiles pr ON pr.id = c.user_id", &[]);
        for shape in [a, b] {
            match shape {
                Some(Shape::PostComments(select)) => {
                    assert_eq!(select.base_key, "user_id");
                    assert_eq!(select.joined_key, "id");
                }
                other => panic!("expected comments, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_unknown_join_pairs_are_rejected() {
        assert!(classify_select("SELECT * FROM likes l JOIN posts p ON p.id = l.post_id", &[]).is_none());
        assert!(classify_select(
            "SELECT * FROM posts p JOIN profiles pr ON pr.id = p.user_id JOIN likes l ON l.post_id = p.id",
            &[]
        )
        .is_none());
    }

    #[test]
    fn test_count_and_lookup_classification() {
        assert!(matches!(
            classify_select("SELECT COUNT(*) AS count FROM likes WHERE post_id = ?", &[json!("p1")]),
            Some(Shape::Count(_))
        ));
        match classify_select("SELECT id, username AS name FROM profiles LIMIT ?", &[json!(5)]) {
            Some(Shape::Lookup(lookup)) => {
                assert_eq!(lookup.items.len(), 2);
                assert_eq!(lookup.window.limit, Some(5));
            }
            other => panic!("expected lookup, got {:?}", other),
        }
    }
}
