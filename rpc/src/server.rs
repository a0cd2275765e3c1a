//! Axum-based debug RPC server.

use std::future::Future;
use std::net::SocketAddr;

use tokio::task::JoinHandle;

use crate::error::RpcError;
use crate::routes::{create_router, RpcState};

#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub listen_addr: SocketAddr,
}

impl RpcServerConfig {
    /// Listen on localhost at `port`.
    pub fn local(port: u16) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], port)),
        }
    }
}

pub struct RpcServer {
    config: RpcServerConfig,
    state: RpcState,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, state: RpcState) -> Self {
        Self { config, state }
    }

    /// Bind the listener and serve on a background task until `shutdown`
    /// resolves. Returns the bound address.
    pub async fn start<F>(self, shutdown: F) -> Result<(SocketAddr, JoinHandle<()>), RpcError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        let router = create_router(self.state);
        tracing::info!(addr = %addr, "debug RPC server listening");

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!(error = %e, "debug RPC server error");
            }
            tracing::debug!("debug RPC server stopped");
        });
        Ok((addr, task))
    }
}
