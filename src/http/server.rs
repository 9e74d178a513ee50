//! HTTP server implementation.

use std::net::SocketAddr;
use tracing::{error, info};

use crate::error::{FloodgateError, Result};

use super::routes::{router, AppState};

/// HTTP server for the rate limit decision API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Handler state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(addr = %self.addr, "Starting HTTP server for rate limit API");

        axum::serve(listener, router(self.state)).await.map_err(|e| {
            error!(error = %e, "HTTP server failed");
            FloodgateError::Io(e)
        })
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;

        info!(
            addr = %self.addr,
            "Starting HTTP server for rate limit API with graceful shutdown"
        );

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                FloodgateError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FloodgateConfig;
    use crate::limiter::{PolicySet, RateLimiter};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = FloodgateConfig::default();
        let limiter = Arc::new(RateLimiter::new(Arc::new(MemoryStore::new())));
        let policies =
            Arc::new(PolicySet::from_config(limiter.clone(), config.policies).unwrap());
        let _server = HttpServer::new(
            addr,
            AppState::new(limiter, policies, &config.rate_limiting),
        );
    }
}
