//! Debug JSON-RPC server for the Meridian node.
//!
//! Serves the operator debug API on `POST /debug` (JSON-RPC 2.0, optional
//! HTTP basic auth) and Prometheus metrics on `GET /metrics`. The node side
//! plugs in through [`DebugBackend`].

pub mod backend;
pub mod error;
pub mod handlers;
pub mod jsonrpc;
pub mod routes;
pub mod server;

pub use backend::{AuthorityInfo, DebugBackend, FilterState, NetworkInfo, ServerInfo};
pub use error::RpcError;
pub use jsonrpc::{JsonError, JsonRequest, JsonResponse};
pub use routes::{create_router, RpcState};
pub use server::{RpcServer, RpcServerConfig};
