//! RPC error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to bind RPC listener: {0}")]
    Bind(#[from] std::io::Error),
}
