use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// Forwarding engine timeouts and buffer sizing.
///
/// The defaults are the engine's contractual constants: a 5 second origin
/// connect deadline, a 30 second tunnel idle interval, a 5 second deadline
/// per stalled tunnel write, and 8 KiB relay buffers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardingConfig {
    pub connect_timeout_secs: u64,
    pub tunnel_idle_timeout_secs: u64,
    pub write_stall_timeout_secs: u64,
    pub buffer_size: usize,
    pub max_header_bytes: usize,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            tunnel_idle_timeout_secs: 30,
            write_stall_timeout_secs: 5,
            buffer_size: 8192,
            max_header_bytes: 32 * 1024,
        }
    }
}

impl ForwardingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn tunnel_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.tunnel_idle_timeout_secs)
    }

    pub fn write_stall_timeout(&self) -> Duration {
        Duration::from_secs(self.write_stall_timeout_secs)
    }
}
