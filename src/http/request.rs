/// A parsed client request, as handed to the forwarding engine.
///
/// Headers keep their wire order; lookup is case-insensitive. `body` holds
/// whatever the parser already read past the head: the full body when
/// `Content-Length` was declared, or an arbitrary prefix for chunked
/// uploads (the engine reads the rest).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Origin-form path for regular requests, `host:port` for CONNECT
    pub target: String,
    pub version: String,
    pub host: String,
    /// Decimal port as text; defaults to `"80"` when the client named none
    pub port: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Case-insensitive header lookup; returns the first match in wire order
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The keep-alive pool key for this request's origin
    pub fn pool_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the client declared a chunked body
    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("chunked")))
            .unwrap_or(false)
    }
}
