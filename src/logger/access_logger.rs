use std::sync::Arc;
use tracing::{info, warn};

use super::file_logger::FileLogger;
use super::models::AccessRecord;
use crate::config::LoggingConfig;
use crate::error::ProxyResult;

/// Coordinates per-exchange access logging.
///
/// Diagnostic lines always go through `tracing`; the optional file sink is
/// attached by `initialize` when enabled. A failed file write downgrades
/// to a warning rather than disturbing the exchange.
#[derive(Clone)]
pub struct AccessLogger {
    config: LoggingConfig,
    file_logger: Option<Arc<FileLogger>>,
}

impl AccessLogger {
    pub fn new(config: LoggingConfig) -> Self {
        Self {
            config,
            file_logger: None,
        }
    }

    /// A logger that records nothing to disk; handy for tests
    pub fn disabled() -> Self {
        Self::new(LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        })
    }

    /// Attach the file sink when access logging is enabled
    pub async fn initialize(&mut self) -> ProxyResult<()> {
        if !self.config.enabled {
            info!("Access logging is disabled");
            return Ok(());
        }
        let file_logger = Arc::new(FileLogger::new(self.config.clone()));
        file_logger.initialize().await?;
        self.file_logger = Some(file_logger);
        info!("Access logging initialized");
        Ok(())
    }

    /// Record one completed exchange
    pub async fn record(&self, record: AccessRecord) {
        if !self.config.enabled {
            return;
        }
        info!(
            "access: client {} {} {} via {} -> {} in {}ms",
            record.client_id,
            record.method,
            record.target,
            record.origin,
            record.outcome,
            record.duration_ms
        );
        if let Some(ref file_logger) = self.file_logger {
            if let Err(e) = file_logger.write_record(&record).await {
                warn!("Failed to write access record: {}", e);
            }
        }
    }
}
