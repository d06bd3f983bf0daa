//! The forwarding engine: origin dialing with keep-alive reuse, request
//! rewriting, response relay, and CONNECT tunnelling.
//!
//! Failures never propagate out of the engine; every public operation
//! returns `()` and the caller's client learns of problems only through
//! the bytes on its socket and the log records.

pub mod dialer;
pub mod pool;
pub mod relay;
pub mod rewrite;
pub mod tunnel;

pub use dialer::Dialer;
pub use pool::ConnectionPool;
pub use relay::RelayOutcome;

use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::ForwardingConfig;
use crate::http::HttpRequest;
use crate::logger::{AccessLogger, AccessRecord};

use relay::TerminatorScan;

pub(crate) const BAD_REQUEST: (u16, &str) = (400, "Bad Request");
pub(crate) const INTERNAL_SERVER_ERROR: (u16, &str) = (500, "Internal Server Error");
pub(crate) const BAD_GATEWAY: (u16, &str) = (502, "Bad Gateway");

const CONNECT_ESTABLISHED: &[u8] =
    b"HTTP/1.1 200 Connection Established\r\nProxy-Agent: MyProxy/1.0\r\n\r\n";

/// Forwards parsed client requests to their origins.
///
/// The client socket is always borrowed: the engine never closes it, and
/// every failure path hands it back open for the caller to manage. Origin
/// sockets are owned for the duration of one exchange and end up either
/// parked in the pool or closed by drop.
pub struct Forwarder {
    pool: Arc<ConnectionPool>,
    dialer: Dialer,
    config: ForwardingConfig,
    access_log: AccessLogger,
}

impl Forwarder {
    pub fn new(
        pool: Arc<ConnectionPool>,
        config: ForwardingConfig,
        access_log: AccessLogger,
    ) -> Self {
        let dialer = Dialer::new(Arc::clone(&pool), config.connect_timeout());
        Self {
            pool,
            dialer,
            config,
            access_log,
        }
    }

    /// Forward a bodyless request and relay the origin's response.
    pub async fn forward_get(&self, req: &HttpRequest, client: &mut TcpStream, client_id: u64) {
        let started = Instant::now();
        info!(
            "client {}: forwarding {} {} to {}",
            client_id,
            req.method,
            req.target,
            req.pool_key()
        );

        let mut origin = match self.dialer.dial(&req.host, &req.port).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("client {}: {}", client_id, e);
                self.reply_error(client, client_id, BAD_GATEWAY).await;
                self.record(req, client_id, "502", started).await;
                return;
            }
        };

        let head = rewrite::serialize_head(req);
        if let Err(e) = origin.write_all(&head).await {
            error!(
                "client {}: failed to send request upstream: {}",
                client_id, e
            );
            self.reply_error(client, client_id, INTERNAL_SERVER_ERROR).await;
            self.record(req, client_id, "500", started).await;
            return;
        }

        let outcome =
            relay::relay_response(&mut origin, client, self.config.buffer_size, client_id).await;
        self.finish_exchange(req, origin, &outcome);

        info!(
            "client {}: completed {} {} ({} body bytes)",
            client_id, req.method, req.target, outcome.body_bytes
        );
        self.record(req, client_id, "relayed", started).await;
    }

    /// Forward a body-carrying request, continuing a chunked upload from
    /// the client when the pre-read body is incomplete.
    pub async fn forward_post(&self, req: &HttpRequest, client: &mut TcpStream, client_id: u64) {
        let started = Instant::now();
        info!(
            "client {}: forwarding {} {} to {}",
            client_id,
            req.method,
            req.target,
            req.pool_key()
        );

        // Framing validation comes before any origin work: a rejected
        // request must not open a connection.
        let content_length = match req.header("content-length") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    error!(
                        "client {}: invalid Content-Length {:?}",
                        client_id, value
                    );
                    self.reply_error(client, client_id, BAD_REQUEST).await;
                    self.record(req, client_id, "400", started).await;
                    return;
                }
            },
            None => None,
        };
        let chunked = req.is_chunked();
        if content_length.is_none() && !chunked && !req.body.is_empty() {
            error!(
                "client {}: request body without Content-Length or chunked framing",
                client_id
            );
            self.reply_error(client, client_id, BAD_REQUEST).await;
            self.record(req, client_id, "400", started).await;
            return;
        }

        let mut origin = match self.dialer.dial(&req.host, &req.port).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("client {}: {}", client_id, e);
                self.reply_error(client, client_id, BAD_GATEWAY).await;
                self.record(req, client_id, "502", started).await;
                return;
            }
        };

        let mut upstream = rewrite::serialize_head(req);
        upstream.extend_from_slice(&req.body);
        if let Err(e) = origin.write_all(&upstream).await {
            error!(
                "client {}: failed to send request upstream: {}",
                client_id, e
            );
            self.reply_error(client, client_id, INTERNAL_SERVER_ERROR).await;
            self.record(req, client_id, "500", started).await;
            return;
        }

        if chunked {
            let mut scan = TerminatorScan::new();
            if !scan.feed(&req.body)
                && !self
                    .pump_chunked_upload(req, client, &mut origin, &mut scan, client_id)
                    .await
            {
                // The upload never completed; the origin socket drops here.
                self.record(req, client_id, "abandoned", started).await;
                return;
            }
        }

        let outcome =
            relay::relay_response(&mut origin, client, self.config.buffer_size, client_id).await;
        self.finish_exchange(req, origin, &outcome);

        info!(
            "client {}: completed {} {} ({} body bytes)",
            client_id, req.method, req.target, outcome.body_bytes
        );
        self.record(req, client_id, "relayed", started).await;
    }

    /// Establish an opaque tunnel for CONNECT.
    pub async fn forward_connect(&self, req: &HttpRequest, client: &mut TcpStream, client_id: u64) {
        let started = Instant::now();
        info!(
            "client {}: CONNECT to {}:{}",
            client_id, req.host, req.port
        );

        let origin = match self.dialer.dial(&req.host, &req.port).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("client {}: {}", client_id, e);
                self.reply_error(client, client_id, BAD_GATEWAY).await;
                self.record(req, client_id, "502", started).await;
                return;
            }
        };

        if let Err(e) = client.write_all(CONNECT_ESTABLISHED).await {
            error!(
                "client {}: failed to confirm tunnel establishment: {}",
                client_id, e
            );
            self.record(req, client_id, "abandoned", started).await;
            return;
        }

        info!(
            "client {}: tunnel established to {}:{}",
            client_id, req.host, req.port
        );
        tunnel::run_tunnel(
            client,
            origin,
            self.config.buffer_size,
            self.config.tunnel_idle_timeout(),
            self.config.write_stall_timeout(),
            client_id,
        )
        .await;

        info!(
            "client {}: tunnel to {}:{} closed",
            client_id, req.host, req.port
        );
        self.record(req, client_id, "tunnel", started).await;
    }

    /// Read the remainder of a chunked upload from the client and forward
    /// it upstream until the terminator arrives. True on completion.
    async fn pump_chunked_upload(
        &self,
        req: &HttpRequest,
        client: &mut TcpStream,
        origin: &mut TcpStream,
        scan: &mut TerminatorScan,
        client_id: u64,
    ) -> bool {
        debug!(
            "client {}: reading remaining chunked upload for {}",
            client_id,
            req.pool_key()
        );
        let mut buf = vec![0u8; self.config.buffer_size];
        loop {
            let read = match client.read(&mut buf).await {
                Ok(0) => {
                    error!(
                        "client {} closed while sending a chunked upload",
                        client_id
                    );
                    return false;
                }
                Ok(n) => n,
                Err(e) => {
                    error!(
                        "client {}: error reading chunked upload: {}",
                        client_id, e
                    );
                    return false;
                }
            };
            if let Err(e) = origin.write_all(&buf[..read]).await {
                error!(
                    "client {}: failed to forward chunked upload: {}",
                    client_id, e
                );
                return false;
            }
            if scan.feed(&buf[..read]) {
                return true;
            }
        }
    }

    /// Park the origin socket for reuse or let it close.
    fn finish_exchange(&self, req: &HttpRequest, origin: TcpStream, outcome: &RelayOutcome) {
        if outcome.origin_keep_alive {
            let key = req.pool_key();
            debug!("parking origin connection for {}", key);
            self.pool.deposit(&key, origin);
        }
        // Without keep-alive the socket drops here and closes.
    }

    /// Send the synthesised error response; the client socket stays open.
    async fn reply_error(&self, client: &mut TcpStream, client_id: u64, status: (u16, &str)) {
        let labels = [("status", status.0.to_string())];
        metrics::counter!("viaduct_error_replies_total", &labels).increment(1);
        if let Err(e) = client.write_all(&error_response_bytes(status)).await {
            debug!(
                "client {}: could not deliver {} reply: {}",
                client_id, status.0, e
            );
        }
    }

    async fn record(&self, req: &HttpRequest, client_id: u64, outcome: &str, started: Instant) {
        self.access_log
            .record(AccessRecord {
                id: Uuid::new_v4().to_string(),
                timestamp: chrono::Utc::now(),
                client_id,
                method: req.method.clone(),
                target: req.target.clone(),
                origin: req.pool_key(),
                outcome: outcome.to_string(),
                duration_ms: started.elapsed().as_millis() as i64,
            })
            .await;
    }
}

/// The synthesised error response, byte-exact.
pub(crate) fn error_response_bytes(status: (u16, &str)) -> Vec<u8> {
    let (code, text) = status;
    let body = format!("<html><body><h1>{} {}</h1></body></html>", code, text);
    format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/html\r\nConnection: close\r\nContent-Length: {}\r\n\r\n{}",
        code,
        text,
        body.len(),
        body
    )
    .into_bytes()
}

/// Send a synthesised error response outside an exchange (parse failures).
pub(crate) async fn send_error_response(client: &mut TcpStream, status: (u16, &str)) {
    let labels = [("status", status.0.to_string())];
    metrics::counter!("viaduct_error_replies_total", &labels).increment(1);
    let _ = client.write_all(&error_response_bytes(status)).await;
}
