//! Query-shape interpreter for the local store
//!
//! The interpreter answers the application's fixed set of SQL texts against
//! the [`LocalStore`] without a general SQL engine.
//!
//! ## Execution Model
//!
//! 1. Collapse the query text (whitespace outside literals, trailing `;`)
//! 2. Classify it into one [`ShapeKind`], binding `?` parameters in textual order
//! 3. Run the shape's dedicated handler over whole-table reads/writes
//! 4. Return rows (reads) or an empty row-set (mutations)
//!
//! Unrecognized queries and handler failures never propagate: both yield an
//! empty row-set. Unrecognized queries are logged under the
//! `relaysql::unrecognized` target.

use std::sync::Arc;

use log::{debug, error, warn};
use serde_json::Value;

use crate::store::LocalStore;
use crate::types::Row;

mod select;
mod shape;
mod text;
mod write;

#[cfg(test)]
mod tests;

pub use shape::ShapeKind;

use shape::Shape;

/// Log target for queries that match no known shape
pub const UNRECOGNIZED_TARGET: &str = "relaysql::unrecognized";

/// Rows produced by the local interpreter along with the shape that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub shape: ShapeKind,
    pub rows: Vec<Row>,
}

/// Classifies and executes queries against a [`LocalStore`]
#[derive(Clone)]
pub struct Interpreter {
    store: Arc<LocalStore>,
}

impl Interpreter {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Classify a query without executing it
    pub fn classify(&self, query: &str, params: &[Value]) -> ShapeKind {
        Shape::classify(query, params).kind()
    }

    /// Execute a query locally; never fails
    pub fn run(&self, query: &str, params: &[Value]) -> Vec<Row> {
        self.run_classified(query, params).rows
    }

    /// Execute a query locally and report its shape, so that callers can tell
    /// an unrecognized query apart from a recognized one that matched nothing
    pub fn run_classified(&self, query: &str, params: &[Value]) -> Execution {
        let shape = Shape::classify(query, params);
        let kind = shape.kind();

        let result = match &shape {
            Shape::Feed(select) => self.run_feed(select),
            Shape::PostComments(select) => self.run_post_comments(select),
            Shape::FollowGraph(select) => self.run_follow_graph(select),
            Shape::Count(count) => self.run_count(count),
            Shape::Lookup(lookup) => self.run_lookup(lookup),
            Shape::Insert(insert) => self.run_insert(insert),
            Shape::Update(update) => self.run_update(update),
            Shape::Delete(delete) => self.run_delete(delete),
            Shape::Unrecognized => {
                warn!(
                    target: UNRECOGNIZED_TARGET,
                    "No local shape for query ({} params): {}",
                    params.len(),
                    query.trim()
                );
                Ok(Vec::new())
            }
        };

        let rows = match result {
            Ok(rows) => {
                debug!("Local {} query returned {} rows", kind, rows.len());
                rows
            }
            Err(e) => {
                error!("Local {} query failed: {}", kind, e);
                Vec::new()
            }
        };
        Execution { shape: kind, rows }
    }
}
