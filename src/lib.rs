//! RelaySQL - two-tier failover query execution
//!
//! Every query the application issues goes through one [`Dispatcher`]. It is
//! sent to a remote HTTP endpoint which runs it on the first healthy database
//! cluster of a stack; if the endpoint cannot answer, the same query runs
//! against a local embedded store through a query-shape interpreter.
//!
//! Architecture Overview:
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Application code                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  execute(query, params)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Client Query Dispatcher                    │
//! │        (remote first, local fallback, mode publishing)      │
//! └─────────────────────────────────────────────────────────────┘
//!                    │                         │ on failure
//!          POST /api/query                     ▼
//!                    ▼              ┌──────────────────────────┐
//! ┌──────────────────────────┐      │   Query-Shape Interpreter│
//! │     Remote endpoint      │      │  (classify -> handler)   │
//! │   (axum, JSON in/out)    │      └──────────────────────────┘
//! └──────────────────────────┘                   │
//!                    │                           ▼
//!                    ▼              ┌──────────────────────────┐
//! ┌──────────────────────────┐      │   Embedded Key-Space     │
//! │      Cluster Stack       │      │   Store (whole tables)   │
//! │ PRIMARY, SECONDARY_1, ...│      └──────────────────────────┘
//! └──────────────────────────┘                   │
//!                    │                           ▼
//!                    ▼              ┌──────────────────────────┐
//! ┌──────────────────────────┐      │  Key/value medium        │
//! │   MySQL clusters (sqlx)  │      │  (files or memory)       │
//! └──────────────────────────┘      └──────────────────────────┘

pub mod cluster;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod interpreter;
pub mod mode;
pub mod queries;
pub mod server;
pub mod store;
pub mod types;

pub use cluster::{execute_on_stack, ClusterConnection, ClusterLabel, ClusterStack, StackResult};
pub use config::{ClientConfig, ServerConfig};
pub use dispatcher::{Dispatched, Dispatcher, Route};
pub use error::{RelayError, Result};
pub use interpreter::{Execution, Interpreter, ShapeKind};
pub use mode::{ModePublisher, Subscription};
pub use server::{router, Server};
pub use store::{FileMedium, KeyValueMedium, LocalStore, MemoryMedium};
pub use types::{Mode, QueryRequest, Row};
