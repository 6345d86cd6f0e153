// src/server.rs
//! Connection listener that hands every accepted client to its own session

use crate::{
    config::ClientRegistry,
    error::{ProxyError, Result},
    publish::Publisher,
    session::{Session, SessionStats},
};
use log::{error, info, warn};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accepts GPS client connections and runs one task per connection
#[derive(Clone)]
pub struct ProxyServer {
    registry: Arc<ClientRegistry>,
    publisher: Arc<dyn Publisher>,
}

impl ProxyServer {
    pub fn new(registry: ClientRegistry, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            registry: Arc::new(registry),
            publisher,
        }
    }

    /// Bind the listening socket
    pub async fn bind(addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Connection(format!("Failed to listen on {}: {}", addr, e)))
    }

    /// Accept connections until the surrounding task is cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        info!("Listening on {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        server.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Run a session for one connection; unknown peers are closed right away
    pub async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Option<SessionStats> {
        let session = match Session::identify(peer.ip(), &self.registry, Arc::clone(&self.publisher)) {
            Some(session) => session,
            None => {
                warn!("Client name for {} is empty, closing connection", peer);
                let _ = stream.shutdown().await;
                return None;
            }
        };

        info!("[{}] Connected from {}", session.client(), peer);
        let stats = session.run(&mut stream).await;
        let _ = stream.shutdown().await;

        info!(
            "[{}] Disconnected: {} lines, {} rejected, {} published, {} failed",
            session.client(),
            stats.lines,
            stats.rejected_lines,
            stats.published,
            stats.publish_failures
        );
        Some(stats)
    }
}
