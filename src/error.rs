use thiserror::Error;
use tokio::time::Duration;

/// Main error type for the viaduct proxy
#[derive(Error, Debug, Clone)]
pub enum ProxyError {
    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Name resolution failed for an origin endpoint
    #[error("Failed to resolve {endpoint}: {message}")]
    Resolve { endpoint: String, message: String },

    /// TCP connect to an origin failed or timed out
    #[error("Failed to connect to {endpoint}: {message}")]
    ConnectFailed { endpoint: String, message: String },

    /// Timeout errors
    #[error("Operation timed out after {duration:?}: {operation}")]
    Timeout {
        duration: Duration,
        operation: String,
    },

    /// The client request cannot be forwarded as received
    #[error("Malformed request: {message}")]
    MalformedRequest { message: String },

    /// Sending the rewritten request upstream failed
    #[error("Upstream send failed: {message}")]
    UpstreamSend { message: String },

    /// IO related errors
    #[error("IO error: {message}")]
    Io { message: String },
}

impl ProxyError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a resolution error
    pub fn resolve<E: Into<String>, S: Into<String>>(endpoint: E, message: S) -> Self {
        Self::Resolve {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a connect error
    pub fn connect_failed<E: Into<String>, S: Into<String>>(endpoint: E, message: S) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(duration: Duration, operation: S) -> Self {
        Self::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Create a malformed request error
    pub fn malformed_request<S: Into<String>>(message: S) -> Self {
        Self::MalformedRequest {
            message: message.into(),
        }
    }

    /// Create an upstream send error
    pub fn upstream_send<S: Into<String>>(message: S) -> Self {
        Self::UpstreamSend {
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Whether this error means the origin was never reached
    pub fn is_dial_failure(&self) -> bool {
        matches!(
            self,
            ProxyError::Resolve { .. } | ProxyError::ConnectFailed { .. }
        )
    }

    /// The synthesised status this error maps to on the client side, if
    /// any. Mid-relay failures map to nothing: the client has already seen
    /// response bytes and gets no second status.
    pub fn client_status(&self) -> Option<(u16, &'static str)> {
        match self {
            ProxyError::Resolve { .. } | ProxyError::ConnectFailed { .. } => {
                Some((502, "Bad Gateway"))
            }
            ProxyError::MalformedRequest { .. } => Some((400, "Bad Request")),
            ProxyError::UpstreamSend { .. } => Some((500, "Internal Server Error")),
            _ => None,
        }
    }
}

/// Result type alias for viaduct operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Convert from std::io::Error to ProxyError
impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        ProxyError::io(err.to_string())
    }
}

/// Convert from tokio::time::Elapsed to ProxyError
impl From<tokio::time::error::Elapsed> for ProxyError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ProxyError::timeout(Duration::from_secs(5), "operation")
    }
}

/// Convert from toml::de::Error to ProxyError
impl From<toml::de::Error> for ProxyError {
    fn from(err: toml::de::Error) -> Self {
        ProxyError::config(format!("TOML parsing error: {}", err))
    }
}
