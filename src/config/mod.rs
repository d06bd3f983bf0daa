//! Configuration for the viaduct proxy.
//!
//! TOML configuration with `${VAR}` / `${VAR:-default}` environment
//! expansion. Every field has a default equal to the proxy's built-in
//! behaviour, so the binary runs without a config file.

pub mod forwarding;
pub mod logging;
pub mod server;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use tracing::info;

pub use forwarding::ForwardingConfig;
pub use logging::LoggingConfig;
pub use server::ServerConfig;

/// Top-level proxy configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration
    pub server: ServerConfig,
    /// Forwarding engine timeouts and buffer sizing
    pub forwarding: ForwardingConfig,
    /// Access log configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file with environment variable expansion
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let expanded = expand_env_vars(&content);

        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;

        info!("Configuration loaded from {:?}", path.as_ref());
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.forwarding.connect_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "forwarding.connect_timeout_secs must be greater than 0"
            ));
        }
        if self.forwarding.tunnel_idle_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "forwarding.tunnel_idle_timeout_secs must be greater than 0"
            ));
        }
        if self.forwarding.write_stall_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "forwarding.write_stall_timeout_secs must be greater than 0"
            ));
        }
        if self.forwarding.buffer_size == 0 {
            return Err(anyhow::anyhow!(
                "forwarding.buffer_size must be greater than 0"
            ));
        }
        if self.logging.enabled && self.logging.directory.is_empty() {
            return Err(anyhow::anyhow!(
                "logging.directory must be set when access logging is enabled"
            ));
        }
        Ok(())
    }
}

/// Expand `${VAR}` and `${VAR:-default}` expressions in the config text
fn expand_env_vars(content: &str) -> String {
    let mut result = content.to_string();

    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_expr = &result[start + 2..start + end];
            let replacement = if let Some(default_pos) = var_expr.find(":-") {
                let var_name = &var_expr[..default_pos];
                let default_value = &var_expr[default_pos + 2..];
                env::var(var_name).unwrap_or_else(|_| default_value.to_string())
            } else {
                env::var(var_expr).unwrap_or_default()
            };
            result.replace_range(start..start + end + 1, &replacement);
        } else {
            break;
        }
    }

    result
}
