//! Client query dispatcher
//!
//! The single entry point application code uses to run a query. Every query
//! is first POSTed to the remote endpoint; any transport failure, non-2xx
//! status, or 2xx body without a usable row-set sends the same query and
//! parameters to the local interpreter instead. The connectivity mode is
//! published before the call returns.
//!
//! A dispatch never fails: the worst case is an empty row-set.

use std::sync::Arc;

use log::{debug, error, warn};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::error::{RelayError, Result};
use crate::interpreter::{Execution, Interpreter, ShapeKind};
use crate::mode::ModePublisher;
use crate::store::{FileMedium, LocalStore};
use crate::types::{Mode, QueryRequest, Row};

/// Which path answered a dispatched query
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// The remote endpoint; `source` is the cluster label it reported
    Remote { source: Option<String> },
    /// The local interpreter, with the shape it classified the query as
    Local { shape: ShapeKind },
}

/// Rows plus the route that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub rows: Vec<Row>,
    pub route: Route,
}

pub struct Dispatcher {
    client: reqwest::Client,
    endpoint: String,
    interpreter: Interpreter,
    mode: Arc<ModePublisher>,
}

impl Dispatcher {
    pub fn new(config: &ClientConfig, interpreter: Interpreter) -> Result<Self> {
        Self::with_publisher(config, interpreter, ModePublisher::new())
    }

    /// Dispatcher publishing to an existing mode cell
    pub fn with_publisher(
        config: &ClientConfig,
        interpreter: Interpreter,
        mode: Arc<ModePublisher>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            interpreter,
            mode,
        })
    }

    /// Dispatcher over a file-backed local store in `config.data_dir`
    pub fn open(config: &ClientConfig) -> Result<Self> {
        let medium = Arc::new(FileMedium::open(&config.data_dir)?);
        let store = Arc::new(LocalStore::new(medium, config.key_prefix.clone()));
        Self::new(config, Interpreter::new(store))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn mode(&self) -> &Arc<ModePublisher> {
        &self.mode
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    /// Run a query, remote first with local fallback
    pub async fn execute(&self, query: &str, params: &[Value]) -> Vec<Row> {
        self.execute_routed(query, params).await.rows
    }

    /// Like [`execute`](Self::execute), also reporting which path answered
    pub async fn execute_routed(&self, query: &str, params: &[Value]) -> Dispatched {
        match self.execute_remote(query, params).await {
            Ok((rows, source)) => {
                self.mode.set_mode(Mode::Remote);
                Dispatched {
                    rows,
                    route: Route::Remote { source },
                }
            }
            Err(e) => {
                warn!("Remote query failed ({}); falling back to local store", e);
                self.mode.set_mode(Mode::Local);
                let execution = self.execute_local(query, params).await;
                Dispatched {
                    rows: execution.rows,
                    route: Route::Local {
                        shape: execution.shape,
                    },
                }
            }
        }
    }

    async fn execute_remote(
        &self,
        query: &str,
        params: &[Value],
    ) -> Result<(Vec<Row>, Option<String>)> {
        let request = QueryRequest {
            query: Some(query.to_string()),
            params: params.to_vec(),
        };
        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::RemoteStatus(status.as_u16()));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::RemoteBody(e.to_string()))?;

        let (rows, source) = parse_rows(body)?;
        debug!(
            "Remote answered with {} rows from {}",
            rows.len(),
            source.as_deref().unwrap_or("unknown cluster")
        );
        Ok((rows, source))
    }

    /// Local store work is blocking file I/O; keep it off the async workers
    async fn execute_local(&self, query: &str, params: &[Value]) -> Execution {
        let interpreter = self.interpreter.clone();
        let query = query.to_string();
        let params = params.to_vec();

        match tokio::task::spawn_blocking(move || interpreter.run_classified(&query, &params)).await {
            Ok(execution) => execution,
            Err(e) => {
                error!("Local execution task failed: {}", e);
                Execution {
                    shape: ShapeKind::Unrecognized,
                    rows: Vec::new(),
                }
            }
        }
    }
}

/// Extract rows from `{data: [...]}` or `{data: {rows: [...], meta: {source}}}`.
/// Non-object entries are dropped.
fn parse_rows(body: Value) -> Result<(Vec<Row>, Option<String>)> {
    let data = match body {
        Value::Object(mut map) => map.remove("data"),
        _ => None,
    };

    match data {
        Some(Value::Array(items)) => Ok((objects(items), None)),
        Some(Value::Object(mut data)) => {
            let source = data
                .get("meta")
                .and_then(|meta| meta.get("source"))
                .and_then(Value::as_str)
                .map(str::to_string);
            match data.remove("rows") {
                Some(Value::Array(items)) => Ok((objects(items), source)),
                _ => Err(RelayError::RemoteBody("data.rows is not an array".into())),
            }
        }
        _ => Err(RelayError::RemoteBody("missing data".into())),
    }
}

fn objects(items: Vec<Value>) -> Vec<Row> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rows_accepts_both_shapes() {
        let (rows, source) = parse_rows(json!({"data": [{"id": 1}]})).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(source, None);

        let (rows, source) = parse_rows(json!({
            "data": {"rows": [{"id": 1}, {"id": 2}], "meta": {"source": "SECONDARY_1"}}
        }))
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(source.as_deref(), Some("SECONDARY_1"));
    }

    #[test]
    fn test_parse_rows_drops_non_objects() {
        let (rows, _) = parse_rows(json!({"data": [{"id": 1}, 7, "x", null]})).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_parse_rows_rejects_unusable_bodies() {
        for body in [
            json!({}),
            json!([]),
            json!({"data": "rows"}),
            json!({"data": {"meta": {"source": "PRIMARY"}}}),
            json!({"message": "nope"}),
        ] {
            let err = parse_rows(body).unwrap_err();
            assert!(err.is_transport());
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back() {
        let config = ClientConfig {
            endpoint: "http://127.0.0.1:1/api/query".into(),
            ..ClientConfig::default()
        };
        let interpreter = Interpreter::new(Arc::new(LocalStore::in_memory()));
        let dispatcher = Dispatcher::new(&config, interpreter).unwrap();

        let dispatched = dispatcher.execute_routed("SELECT * FROM posts", &[]).await;
        assert!(dispatched.rows.is_empty());
        assert_eq!(dispatched.route, Route::Local { shape: ShapeKind::Lookup });
        assert_eq!(dispatcher.mode().current(), Mode::Local);
    }
}
