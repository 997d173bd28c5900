//! TCP listener
//!
//! Accepts connections and runs one independent handler task per
//! connection. Handler failures stay inside their task; only an accept
//! failure stops the listener.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::registry::Registry;

/// The relay server: a bound listener plus the channel registry
pub struct Server {
    listener: TcpListener,
    registry: Registry,
    config: Arc<Config>,
}

impl Server {
    /// Bind to the configured address with an empty registry
    pub async fn bind(config: Config) -> Result<Self, AppError> {
        let addr = config.socket_addr_string();
        let listener = TcpListener::bind(&addr).await?;
        info!("Chat relay listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            registry: Registry::new(),
            config: Arc::new(config),
        })
    }

    /// Address actually bound (useful when the configured port is 0)
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to the shared channel registry
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Accept connections until `shutdown` resolves or accepting fails
    ///
    /// On exit every live connection is signalled and then torn down, so
    /// no handler stays blocked on a read.
    pub async fn run<F>(self, shutdown: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break Ok(());
                }

                res = self.listener.accept() => match res {
                    Ok((stream, addr)) => {
                        info!("Accepted connection from {}", addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
                        }

                        let registry = self.registry.clone();
                        let config = Arc::clone(&self.config);
                        let shutdown_rx = shutdown_tx.subscribe();

                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, registry, config, shutdown_rx).await {
                                warn!("Connection handler error for {}: {}", addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        break Err(AppError::Accept(e));
                    }
                },

                Some(res) = connections.join_next() => {
                    if let Err(e) = res {
                        if e.is_panic() {
                            error!("A connection handler panicked: {:?}", e);
                        }
                    }
                }
            }
        };

        info!(
            "Closing {} live connections ({} channels)",
            connections.len(),
            self.registry.len()
        );
        // No live receivers is fine: there may be no connections
        let _ = shutdown_tx.send(());
        connections.shutdown().await;
        info!("Server shutdown complete");

        result
    }
}
