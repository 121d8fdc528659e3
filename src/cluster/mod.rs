//! Cluster stack
//!
//! An ordered list of database connections, primary first. A query is tried
//! against each connection in turn, one attempt per connection, until one
//! succeeds. The answer is tagged with the position that served it.
//!
//! ```text
//! Trying(0) ──ok──> Success(PRIMARY)
//!     │ err
//!     v
//! Trying(1) ──ok──> Success(SECONDARY_1)
//!     │ err
//!     v
//!    ...
//!     │ err
//!     v
//! AllFailed(last error)
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, warn};
use serde_json::Value;

use crate::error::{RelayError, Result};
use crate::types::Row;

pub mod mysql;

pub use mysql::MySqlCluster;

/// One database cluster reachable through a live connection (pool)
#[async_trait]
pub trait ClusterConnection: Send + Sync {
    /// Name for logs. Must not contain credentials.
    fn name(&self) -> &str;

    /// Run a query with positional parameters
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;
}

/// Position of a connection within the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLabel {
    Primary,
    Secondary(usize),
}

impl ClusterLabel {
    pub fn for_index(index: usize) -> Self {
        if index == 0 {
            ClusterLabel::Primary
        } else {
            ClusterLabel::Secondary(index)
        }
    }
}

impl fmt::Display for ClusterLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterLabel::Primary => write!(f, "PRIMARY"),
            ClusterLabel::Secondary(i) => write!(f, "SECONDARY_{}", i),
        }
    }
}

/// Rows plus the label of the cluster that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct StackResult {
    pub rows: Vec<Row>,
    pub source: ClusterLabel,
}

/// Try each connection in order until one answers
pub async fn execute_on_stack(
    connections: &[Arc<dyn ClusterConnection>],
    sql: &str,
    params: &[Value],
) -> Result<StackResult> {
    let mut last_error = None;

    for (index, connection) in connections.iter().enumerate() {
        let label = ClusterLabel::for_index(index);
        match connection.query(sql, params).await {
            Ok(rows) => {
                debug!("{} ({}) answered with {} rows", label, connection.name(), rows.len());
                return Ok(StackResult { rows, source: label });
            }
            Err(e) => {
                warn!("{} ({}) failed: {}", label, connection.name(), e);
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(last) => {
            error!("All {} database clusters failed", connections.len());
            Err(RelayError::stack_exhausted(connections.len(), last))
        }
        None => Err(RelayError::NoClusters),
    }
}

/// The process-wide cluster stack, built once at startup
#[derive(Clone, Default)]
pub struct ClusterStack {
    connections: Vec<Arc<dyn ClusterConnection>>,
}

impl ClusterStack {
    pub fn new(connections: Vec<Arc<dyn ClusterConnection>>) -> Self {
        Self { connections }
    }

    /// Lazy MySQL pools, one per configured URL, in preference order
    pub fn from_urls(urls: &[String], acquire_timeout: std::time::Duration) -> Result<Self> {
        let mut connections: Vec<Arc<dyn ClusterConnection>> = Vec::with_capacity(urls.len());
        for url in urls {
            connections.push(Arc::new(MySqlCluster::connect_lazy(url, acquire_timeout)?));
        }
        Ok(Self::new(connections))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.name()).collect()
    }

    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StackResult> {
        execute_on_stack(&self.connections, sql, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: String,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ClusterConnection for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RelayError::Cluster(format!("{} is down", self.name)))
            } else {
                let mut row = Row::new();
                row.insert("served_by".into(), json!(self.name));
                Ok(vec![row])
            }
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(ClusterLabel::for_index(0).to_string(), "PRIMARY");
        assert_eq!(ClusterLabel::for_index(1).to_string(), "SECONDARY_1");
        assert_eq!(ClusterLabel::for_index(4).to_string(), "SECONDARY_4");
    }

    #[tokio::test]
    async fn test_primary_answers_without_touching_secondaries() {
        let primary = Scripted::new("a", false);
        let secondary = Scripted::new("b", false);
        let stack: Vec<Arc<dyn ClusterConnection>> = vec![primary.clone(), secondary.clone()];

        let result = execute_on_stack(&stack, "SELECT 1", &[]).await.unwrap();
        assert_eq!(result.source, ClusterLabel::Primary);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_stack() {
        let err = execute_on_stack(&[], "SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, RelayError::NoClusters));
        assert!(ClusterStack::default().is_empty());
    }

    #[test]
    fn test_stack_reports_its_clusters() {
        let stack = ClusterStack::new(vec![
            Scripted::new("db1", false) as Arc<dyn ClusterConnection>,
            Scripted::new("db2", true) as Arc<dyn ClusterConnection>,
        ]);
        assert_eq!(stack.len(), 2);
        assert!(!stack.is_empty());
        assert_eq!(stack.names(), vec!["db1", "db2"]);
    }
}
