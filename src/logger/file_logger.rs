use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::models::AccessRecord;
use crate::config::LoggingConfig;
use crate::error::ProxyResult;

/// File-based access logging: one JSON line per completed exchange.
pub struct FileLogger {
    config: LoggingConfig,
}

impl FileLogger {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Create the log directory
    pub async fn initialize(&self) -> ProxyResult<()> {
        tokio::fs::create_dir_all(&self.config.directory).await?;
        info!("Access log directory created: {}", self.config.directory);
        Ok(())
    }

    /// Append one record to the current log file
    pub async fn write_record(&self, record: &AccessRecord) -> ProxyResult<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| crate::error::ProxyError::io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }

    /// Daily file when rotation is on, a single file otherwise
    fn log_file_path(&self) -> String {
        let filename = if self.config.rotation {
            format!("access-{}.log", Utc::now().format("%Y-%m-%d"))
        } else {
            "access.log".to_string()
        };
        format!("{}/{}", self.config.directory, filename)
    }
}
