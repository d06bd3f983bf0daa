//! Listener and per-connection dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::forward::{self, ConnectionPool, Forwarder};
use crate::http;
use crate::logger::AccessLogger;

/// Accepts client connections and hands each to the forwarding engine.
pub struct ProxyServer {
    config: Config,
    forwarder: Arc<Forwarder>,
}

impl ProxyServer {
    pub fn new(config: Config, access_log: AccessLogger) -> Self {
        let pool = Arc::new(ConnectionPool::new());
        let forwarder = Arc::new(Forwarder::new(pool, config.forwarding.clone(), access_log));
        Self { config, forwarder }
    }

    /// Bind the configured address and run the accept loop.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.server.bind).await?;
        self.run_with_listener(listener).await
    }

    /// Run the accept loop on an already-bound listener. One task per
    /// client connection; client ids are only meaningful within log
    /// records.
    pub async fn run_with_listener(self, listener: TcpListener) -> anyhow::Result<()> {
        info!("viaduct listening on {}", listener.local_addr()?);

        let next_client_id = AtomicU64::new(1);
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let client_id = next_client_id.fetch_add(1, Ordering::Relaxed);
                    let forwarder = Arc::clone(&self.forwarder);
                    let max_header_bytes = self.config.forwarding.max_header_bytes;

                    tokio::spawn(async move {
                        debug!("client {} connected from {}", client_id, peer_addr);
                        handle_client(forwarder, stream, client_id, max_header_bytes).await;
                        debug!("client {} finished", client_id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Service one client connection: parse a request, dispatch by method.
///
/// The engine borrows the client socket and never closes it; the socket's
/// final disposition happens here, when `stream` drops.
async fn handle_client(
    forwarder: Arc<Forwarder>,
    mut stream: TcpStream,
    client_id: u64,
    max_header_bytes: usize,
) {
    let request = match http::read_request(&mut stream, max_header_bytes).await {
        Ok(Some(request)) => request,
        Ok(None) => return,
        Err(e) => {
            warn!("client {}: {}", client_id, e);
            forward::send_error_response(&mut stream, forward::BAD_REQUEST).await;
            return;
        }
    };

    match request.method.as_str() {
        "CONNECT" => forwarder.forward_connect(&request, &mut stream, client_id).await,
        "POST" | "PUT" | "PATCH" => forwarder.forward_post(&request, &mut stream, client_id).await,
        _ => forwarder.forward_get(&request, &mut stream, client_id).await,
    }
}
