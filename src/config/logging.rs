use serde::{Deserialize, Serialize};

/// Access log configuration.
///
/// Diagnostic logging always goes through `tracing`; this controls the
/// optional JSON-lines access log written per completed exchange.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub directory: String,
    pub rotation: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: "logs".to_string(),
            rotation: true,
        }
    }
}
