//! Connection acceptor loop.

use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{net::TcpListener, sync::watch, task::JoinSet};

use crate::{
    config::ServerConfig, error::ServerError, handler::handle_stream, registry::ConnectionRegistry,
    state::AppState,
};

/// Back-off after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of the acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Listening,
}

/// TCP chat server
///
/// # Example
///
/// ```no_run
/// # async fn example() -> Result<(), darkcomm_server::ServerError> {
/// use darkcomm_server::{ChatServer, ServerConfig, shutdown_signal};
///
/// let server = ChatServer::bind(&ServerConfig::new("127.0.0.1", 12345)).await?;
/// server.run(shutdown_signal()).await?;
/// # Ok(())
/// # }
/// ```
pub struct ChatServer {
    listener: TcpListener,
    app_state: Arc<AppState>,
    state_tx: watch::Sender<ServerState>,
}

impl ChatServer {
    /// Bind the listener. The server is `Listening` once this returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the address
    /// cannot be bound.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        tracing::info!("Server bound to {}", listener.local_addr()?);

        let (state_tx, _) = watch::channel(ServerState::Listening);
        Ok(Self {
            listener,
            app_state: Arc::new(AppState::new(config.max_line_bytes)),
            state_tx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Registry of this server's open connections.
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        self.app_state.registry.clone()
    }

    /// Watch the acceptor state; it turns `Stopped` once `run` has cleaned up.
    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Each connection gets its own task. On shutdown the listener is closed,
    /// every registered connection is closed, and this waits for every
    /// connection task to finish its cleanup.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let Self {
            listener,
            app_state,
            state_tx,
        } = self;

        tracing::info!(
            "Server listening for connections on {}",
            listener.local_addr()?
        );

        let mut handlers = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, closing listener");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let app_state = app_state.clone();
                        handlers.spawn(async move {
                            handle_stream(stream, addr, &app_state).await;
                        });
                    }
                    Err(e) => {
                        tracing::error!("Error accepting connection: {}", e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        drop(listener);

        let open = app_state.registry.drain().await;
        tracing::info!("Closing {} open connection(s)", open.len());
        futures_util::future::join_all(open.iter().map(|peer| peer.connection.close())).await;

        while let Some(finished) = handlers.join_next().await {
            if let Err(e) = finished {
                tracing::error!("Connection task failed: {}", e);
            }
        }

        state_tx.send_replace(ServerState::Stopped);
        tracing::info!("Server stopped");
        Ok(())
    }
}
