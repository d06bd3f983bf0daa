use std::collections::HashMap;
use std::sync::Mutex;
use tokio::net::TcpStream;
use tracing::debug;

/// Idle origin connections keyed by `host:port`.
///
/// One socket per key, exact textual key match. The mutex guards map
/// operations only; no I/O ever happens under it. Liveness is the dialer's
/// checkout-time concern, so entries carry no timestamps and nothing sweeps
/// them in the background.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    idle: Mutex<HashMap<String, TcpStream>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return the idle socket for `key`, if any.
    ///
    /// Removal is atomic under the map lock: a checked-out socket is owned
    /// exclusively by the caller.
    pub fn checkout(&self, key: &str) -> Option<TcpStream> {
        self.idle.lock().ok().and_then(|mut idle| idle.remove(key))
    }

    /// Park `stream` as the idle connection for `key`.
    ///
    /// A socket already parked under the key is displaced and closed by
    /// drop.
    pub fn deposit(&self, key: &str, stream: TcpStream) {
        if let Ok(mut idle) = self.idle.lock() {
            if idle.insert(key.to_string(), stream).is_some() {
                debug!("displaced idle origin connection for {}", key);
            }
        }
    }

    /// Drop the idle connection for `key`, closing it.
    pub fn discard(&self, key: &str) {
        if let Ok(mut idle) = self.idle.lock() {
            idle.remove(key);
        }
    }

    /// Number of idle connections currently parked.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map(|idle| idle.len()).unwrap_or(0)
    }
}
