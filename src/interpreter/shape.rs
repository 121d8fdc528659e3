//! Query shapes
//!
//! Each query is classified into exactly one [`Shape`] by its structural
//! signature; every shape has one dedicated handler. Anything outside the
//! enumerated set is [`Shape::Unrecognized`].

use std::fmt;

use serde_json::Value;

use super::select::{self, CountSelect, JoinedSelect, Lookup};
use super::text::{
    collapse, find_top_level, parse_literal, split_top_level, strip_keyword, unwrap_parens,
    ColumnRef, ParamCursor,
};
use super::write::{self, Delete, Insert, Update};
use crate::types::{like_match, loose_eq};

/// Public classification of a query, reported alongside local results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeKind {
    /// posts joined with author profiles, plus like/comment aggregates
    Feed,
    /// comments on a post joined with author profiles
    PostComments,
    /// follows joined with profiles (followers / following)
    FollowGraph,
    /// `SELECT COUNT(*)` over one table
    Count,
    /// single-table select
    Lookup,
    Insert,
    Update,
    Delete,
    /// no known shape matched; executes as zero rows
    Unrecognized,
}

impl ShapeKind {
    pub fn is_recognized(&self) -> bool {
        !matches!(self, ShapeKind::Unrecognized)
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Feed => "feed",
            ShapeKind::PostComments => "post-comments",
            ShapeKind::FollowGraph => "follow-graph",
            ShapeKind::Count => "count",
            ShapeKind::Lookup => "lookup",
            ShapeKind::Insert => "insert",
            ShapeKind::Update => "update",
            ShapeKind::Delete => "delete",
            ShapeKind::Unrecognized => "unrecognized",
        };
        write!(f, "{}", name)
    }
}

/// A classified query with its parameters already bound
#[derive(Debug, Clone)]
pub(crate) enum Shape {
    Feed(JoinedSelect),
    PostComments(JoinedSelect),
    FollowGraph(JoinedSelect),
    Count(CountSelect),
    Lookup(Lookup),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Unrecognized,
}

impl Shape {
    /// Classify `query`, binding `params` to its placeholders in textual order
    pub(crate) fn classify(query: &str, params: &[Value]) -> Shape {
        let text = collapse(query);
        let mut cursor = ParamCursor::new(params);

        let shape = if strip_keyword(&text, "select").is_some() {
            select::classify(&text, &mut cursor)
        } else if strip_keyword(&text, "insert").is_some() {
            write::parse_insert(&text, &mut cursor).map(Shape::Insert)
        } else if strip_keyword(&text, "update").is_some() {
            write::parse_update(&text, &mut cursor).map(Shape::Update)
        } else if strip_keyword(&text, "delete").is_some() {
            write::parse_delete(&text, &mut cursor, params).map(Shape::Delete)
        } else {
            None
        };
        shape.unwrap_or(Shape::Unrecognized)
    }

    pub(crate) fn kind(&self) -> ShapeKind {
        match self {
            Shape::Feed(_) => ShapeKind::Feed,
            Shape::PostComments(_) => ShapeKind::PostComments,
            Shape::FollowGraph(_) => ShapeKind::FollowGraph,
            Shape::Count(_) => ShapeKind::Count,
            Shape::Lookup(_) => ShapeKind::Lookup,
            Shape::Insert(_) => ShapeKind::Insert,
            Shape::Update(_) => ShapeKind::Update,
            Shape::Delete(_) => ShapeKind::Delete,
            Shape::Unrecognized => ShapeKind::Unrecognized,
        }
    }
}

/// `table [AS] alias`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TableRef {
    pub table: String,
    pub alias: String,
}

impl TableRef {
    pub(crate) fn parse(text: &str) -> Option<Self> {
        let parts: Vec<&str> = text.split(' ').filter(|p| !p.is_empty()).collect();
        let (table, alias) = match parts.as_slice() {
            [table] => (*table, *table),
            [table, alias] => (*table, *alias),
            [table, kw, alias] if kw.eq_ignore_ascii_case("as") => (*table, *alias),
            _ => return None,
        };
        let table = ColumnRef::parse(table).filter(|c| c.qualifier.is_none())?.name;
        let alias = ColumnRef::parse(alias).filter(|c| c.qualifier.is_none())?.name;
        Some(Self { table, alias })
    }

    /// True if `qualifier` names this table by alias or by table name
    pub(crate) fn answers_to(&self, qualifier: &str) -> bool {
        qualifier == self.alias || qualifier == self.table
    }
}

/// Right-hand side of a predicate or assignment
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Value(Value),
    Column(ColumnRef),
}

impl Operand {
    pub(crate) fn parse(text: &str, params: &mut ParamCursor<'_>) -> Option<Self> {
        let text = text.trim();
        if text == "?" {
            return Some(Operand::Value(params.next_value()));
        }
        if let Some(value) = parse_literal(text) {
            return Some(Operand::Value(value));
        }
        ColumnRef::parse(text).map(Operand::Column)
    }

    fn resolve<F: Fn(&ColumnRef) -> Value>(&self, resolve: &F) -> Value {
        match self {
            Operand::Value(value) => value.clone(),
            Operand::Column(column) => resolve(column),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Test {
    Eq(Operand),
    NotEq(Operand),
    Like(Operand),
    IsNull,
    IsNotNull,
}

/// One `column <test>` conjunct of a WHERE or ON clause
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub column: ColumnRef,
    pub test: Test,
}

impl Predicate {
    pub(crate) fn parse(text: &str, params: &mut ParamCursor<'_>) -> Option<Self> {
        let text = unwrap_parens(text).unwrap_or(text).trim();
        let lower = text.to_ascii_lowercase();

        if let Some(column) = lower.strip_suffix(" is not null") {
            return Some(Self {
                column: ColumnRef::parse(column)?,
                test: Test::IsNotNull,
            });
        }
        if let Some(column) = lower.strip_suffix(" is null") {
            return Some(Self {
                column: ColumnRef::parse(column)?,
                test: Test::IsNull,
            });
        }
        if let Some(pos) = find_top_level(text, "like", 0) {
            let column = ColumnRef::parse(&text[..pos])?;
            let operand = Operand::parse(&text[pos + 4..], params)?;
            return Some(Self { column, test: Test::Like(operand) });
        }

        let not_eq = find_top_level(text, "!=", 0).or_else(|| find_top_level(text, "<>", 0));
        if let Some(pos) = not_eq {
            let column = ColumnRef::parse(&text[..pos])?;
            let operand = Operand::parse(&text[pos + 2..], params)?;
            return Some(Self { column, test: Test::NotEq(operand) });
        }
        if find_top_level(text, "<", 0).is_some() || find_top_level(text, ">", 0).is_some() {
            return None;
        }
        let pos = find_top_level(text, "=", 0)?;
        let column = ColumnRef::parse(&text[..pos])?;
        let operand = Operand::parse(&text[pos + 1..], params)?;
        Some(Self { column, test: Test::Eq(operand) })
    }

    /// Evaluate with SQL NULL semantics: comparisons against NULL never match
    pub(crate) fn matches<F: Fn(&ColumnRef) -> Value>(&self, resolve: &F) -> bool {
        let left = resolve(&self.column);
        match &self.test {
            Test::IsNull => left.is_null(),
            Test::IsNotNull => !left.is_null(),
            Test::Eq(operand) => {
                let right = operand.resolve(resolve);
                !left.is_null() && !right.is_null() && loose_eq(&left, &right)
            }
            Test::NotEq(operand) => {
                let right = operand.resolve(resolve);
                !left.is_null() && !right.is_null() && !loose_eq(&left, &right)
            }
            Test::Like(operand) => like_match(&left, &operand.resolve(resolve)),
        }
    }

    /// The bound value of a plain `column = value` predicate
    pub(crate) fn equality_value(&self) -> Option<&Value> {
        match &self.test {
            Test::Eq(Operand::Value(value)) => Some(value),
            _ => None,
        }
    }
}

/// Parse a WHERE clause of `AND`-joined predicates. `OR` is not supported.
pub(crate) fn parse_where(text: &str, params: &mut ParamCursor<'_>) -> Option<Vec<Predicate>> {
    if find_top_level(text, "or", 0).is_some() {
        return None;
    }
    split_top_level(text, "and")
        .into_iter()
        .map(|part| Predicate::parse(part, params))
        .collect()
}

/// One `ORDER BY` key
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OrderKey {
    pub column: ColumnRef,
    pub descending: bool,
}

pub(crate) fn parse_order_by(text: &str) -> Option<Vec<OrderKey>> {
    split_top_level(text, ",")
        .into_iter()
        .map(|part| {
            let (column, descending) = match part.rsplit_once(' ') {
                Some((column, dir)) if dir.eq_ignore_ascii_case("desc") => (column, true),
                Some((column, dir)) if dir.eq_ignore_ascii_case("asc") => (column, false),
                _ => (part, false),
            };
            Some(OrderKey {
                column: ColumnRef::parse(column)?,
                descending,
            })
        })
        .collect()
}
