//! Remote query endpoint
//!
//! `POST /api/query` with `{"query": "...", "params": [...]}`:
//!
//! - 200 `{"data": {"rows": [...], "meta": {"source": "PRIMARY"}}}`
//! - 400 `{"message": ...}` for a body that is not JSON or has no query
//! - 405 for any other method
//! - 500 `{"message": ..., "details": ...}` when every cluster failed

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use log::{error, info, warn};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;

use crate::cluster::ClusterStack;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::types::QueryRequest;

pub const QUERY_PATH: &str = "/api/query";

/// Router serving the query endpoint over `stack`
pub fn router(stack: ClusterStack) -> Router {
    Router::new()
        .route(QUERY_PATH, post(query_handler))
        .with_state(Arc::new(stack))
}

async fn query_handler(State(stack): State<Arc<ClusterStack>>, body: Bytes) -> Response {
    let request: QueryRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Rejected query request: {}", e);
            return bad_request(format!("Invalid JSON body: {}", e));
        }
    };
    let query = match request.query.as_deref().map(str::trim) {
        Some(query) if !query.is_empty() => query,
        _ => return bad_request("Missing query".to_string()),
    };

    match stack.execute(query, &request.params).await {
        Ok(result) => (
            StatusCode::OK,
            Json(json!({
                "data": {
                    "rows": result.rows,
                    "meta": {"source": result.source.to_string()}
                }
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Query failed on every cluster: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "message": "Database query failed",
                    "details": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response()
}

/// The remote endpoint process
pub struct Server {
    config: ServerConfig,
    stack: ClusterStack,
}

impl Server {
    /// Build the cluster stack from the configured URLs. Pools connect lazily.
    pub fn new(config: ServerConfig) -> Result<Self> {
        let stack = ClusterStack::from_urls(&config.database_urls, config.acquire_timeout)?;
        Ok(Self::with_stack(config, stack))
    }

    pub fn with_stack(config: ServerConfig, stack: ClusterStack) -> Self {
        Self { config, stack }
    }

    pub fn stack(&self) -> &ClusterStack {
        &self.stack
    }

    /// Bind the configured address and serve until Ctrl+C / SIGTERM
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("RelaySQL endpoint listening on http://{}{}", addr, QUERY_PATH);
        if self.stack.is_empty() {
            warn!("Cluster stack is empty; every query will fail with 500");
        } else {
            info!(
                "Cluster stack ({} clusters): [{}]",
                self.stack.len(),
                self.stack.names().join(", ")
            );
        }

        axum::serve(listener, router(self.stack))
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
