use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::pool::ConnectionPool;
use crate::error::{ProxyError, ProxyResult};

/// Opens origin connections, reusing pooled ones when they are still alive.
pub struct Dialer {
    pool: Arc<ConnectionPool>,
    connect_timeout: Duration,
}

impl Dialer {
    pub fn new(pool: Arc<ConnectionPool>, connect_timeout: Duration) -> Self {
        Self {
            pool,
            connect_timeout,
        }
    }

    /// Open (or reuse) an origin connection for `host:port`.
    ///
    /// A pooled socket is probed before reuse; one whose peer already sent
    /// FIN is closed and replaced by a fresh dial. Connect attempts are
    /// bounded by the configured deadline.
    pub async fn dial(&self, host: &str, port: &str) -> ProxyResult<TcpStream> {
        let key = format!("{}:{}", host, port);

        if let Some(stream) = self.pool.checkout(&key) {
            if peer_still_open(&stream).await {
                debug!("reusing pooled origin connection for {}", key);
                metrics::counter!("viaduct_pool_hits_total").increment(1);
                return Ok(stream);
            }
            // Checkout already removed the entry; dropping closes it.
            debug!("pooled origin connection for {} was closed by peer", key);
            metrics::counter!("viaduct_pool_stale_total").increment(1);
        }

        let addr = resolve_ipv4(host, port).await?;
        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                ProxyError::connect_failed(
                    key.as_str(),
                    format!("connect timed out after {:?}", self.connect_timeout),
                )
            })?
            .map_err(|e| ProxyError::connect_failed(key.as_str(), e.to_string()))?;

        metrics::counter!("viaduct_origin_connects_total").increment(1);
        debug!("connected to origin {} ({})", key, addr);
        Ok(stream)
    }
}

/// IPv4 stream-socket resolution; the first A record wins.
async fn resolve_ipv4(host: &str, port: &str) -> ProxyResult<SocketAddr> {
    let endpoint = format!("{}:{}", host, port);
    let port: u16 = port
        .parse()
        .map_err(|_| ProxyError::resolve(endpoint.as_str(), "port is not a number"))?;

    let mut addrs = lookup_host((host, port))
        .await
        .map_err(|e| ProxyError::resolve(endpoint.as_str(), e.to_string()))?;

    addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| ProxyError::resolve(endpoint, "no IPv4 address found"))
}

/// Non-blocking liveness probe on an idle pooled socket.
///
/// The peek future is polled before the zero deadline is checked, so a
/// readable socket reports its state and an idle one times out: ready with
/// zero bytes is the peer's FIN, ready with data or a would-block both mean
/// the connection is usable.
async fn peer_still_open(stream: &TcpStream) -> bool {
    let mut probe = [0u8; 1];
    match timeout(Duration::ZERO, stream.peek(&mut probe)).await {
        Ok(Ok(0)) => false,
        Ok(Ok(_)) => true,
        Ok(Err(_)) => false,
        Err(_) => true,
    }
}
