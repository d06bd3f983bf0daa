pub mod config;
pub mod error;
pub mod forward;
pub mod http;
pub mod logger;
pub mod server;

// Re-export commonly used types
pub use config::{Config, ForwardingConfig, LoggingConfig, ServerConfig};
pub use error::{ProxyError, ProxyResult};
pub use forward::{ConnectionPool, Forwarder};
pub use http::HttpRequest;
pub use logger::{AccessLogger, AccessRecord};
pub use server::ProxyServer;
