//! Client-side HTTP/1.1 request parsing.

pub mod request;

pub use request::HttpRequest;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};

const HEAD_DELIMITER: &[u8] = b"\r\n\r\n";

/// Read and parse one request from the client socket.
///
/// Returns `Ok(None)` when the client closed the connection before sending
/// anything. A head larger than `max_header_bytes`, early EOF, or an
/// unparseable head is a `MalformedRequest`.
pub async fn read_request<S>(
    stream: &mut S,
    max_header_bytes: usize,
) -> ProxyResult<Option<HttpRequest>>
where
    S: AsyncRead + Unpin,
{
    let mut data: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(pos) = find_subsequence(&data, HEAD_DELIMITER) {
            break pos;
        }
        if data.len() > max_header_bytes {
            return Err(ProxyError::malformed_request(format!(
                "request head exceeded {} bytes",
                max_header_bytes
            )));
        }
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            if data.is_empty() {
                return Ok(None);
            }
            return Err(ProxyError::malformed_request(
                "client closed before the request head completed",
            ));
        }
        data.extend_from_slice(&chunk[..read]);
    };

    let mut request = parse_head(&data[..head_end])?;

    // Bytes past the delimiter are the body prefix
    let mut body = data[head_end + HEAD_DELIMITER.len()..].to_vec();

    // With a declared Content-Length the parser owns reading the full body;
    // chunked uploads stay partial and are continued by the engine.
    if let Some(declared) = request
        .header("content-length")
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        while body.len() < declared {
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                return Err(ProxyError::malformed_request(format!(
                    "client closed after {} of {} body bytes",
                    body.len(),
                    declared
                )));
            }
            let wanted = declared - body.len();
            body.extend_from_slice(&chunk[..read.min(wanted)]);
        }
        body.truncate(declared);
    }

    request.body = body;
    debug!(
        "parsed {} {} for {}:{} ({} header fields, {} body bytes)",
        request.method,
        request.target,
        request.host,
        request.port,
        request.headers.len(),
        request.body.len()
    );
    Ok(Some(request))
}

/// Parse the request line and header fields (everything before the blank line)
fn parse_head(raw: &[u8]) -> ProxyResult<HttpRequest> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ProxyError::malformed_request("request head is not valid UTF-8"))?;

    let mut lines = text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| ProxyError::malformed_request("request line is missing"))?;

    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| ProxyError::malformed_request("request method is missing"))?;
    let target = parts
        .next()
        .ok_or_else(|| ProxyError::malformed_request("request target is missing"))?;
    let version = parts
        .next()
        .ok_or_else(|| ProxyError::malformed_request("HTTP version is missing"))?;
    if parts.next().is_some() {
        return Err(ProxyError::malformed_request(
            "request line had too many fields",
        ));
    }
    if !version.starts_with("HTTP/") {
        return Err(ProxyError::malformed_request(format!(
            "unrecognised HTTP version {:?}",
            version
        )));
    }

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            ProxyError::malformed_request(format!("header field without a colon: {:?}", line))
        })?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    let mut request = HttpRequest {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        host: String::new(),
        port: String::new(),
        headers,
        body: Vec::new(),
    };
    derive_origin(&mut request)?;
    Ok(request)
}

/// Fill in `host`/`port` (and normalise the target) from the request form.
///
/// CONNECT carries `host:port` as its target. Absolute-form targets are
/// rewritten to origin-form with the authority pulled out. Origin-form
/// targets take their authority from the Host header.
fn derive_origin(request: &mut HttpRequest) -> ProxyResult<()> {
    if request.method.eq_ignore_ascii_case("CONNECT") {
        let (host, port) = request.target.rsplit_once(':').ok_or_else(|| {
            ProxyError::malformed_request("CONNECT target must be host:port")
        })?;
        if host.is_empty() || port.is_empty() {
            return Err(ProxyError::malformed_request(
                "CONNECT target must be host:port",
            ));
        }
        request.host = host.to_string();
        request.port = port.to_string();
        return Ok(());
    }

    let authority = if let Some(rest) = request.target.strip_prefix("http://") {
        // Absolute-form: pull the authority out and keep the origin-form rest
        let (authority, path) = match rest.find('/') {
            Some(slash) => (&rest[..slash], &rest[slash..]),
            None => (rest, "/"),
        };
        let authority = authority.to_string();
        request.target = path.to_string();
        authority
    } else {
        request
            .header("host")
            .ok_or_else(|| ProxyError::malformed_request("request has no Host header"))?
            .to_string()
    };

    match authority.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() => {
            request.host = host.to_string();
            request.port = port.to_string();
        }
        _ => {
            request.host = authority;
            request.port = "80".to_string();
        }
    }
    if request.host.is_empty() {
        return Err(ProxyError::malformed_request("request host is empty"));
    }
    Ok(())
}

/// First position of `needle` in `haystack`
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &[u8]) -> ProxyResult<Option<HttpRequest>> {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        tokio::io::AsyncWriteExt::write_all(&mut client, raw).await.unwrap();
        drop(client);
        read_request(&mut server, 32 * 1024).await
    }

    #[tokio::test]
    async fn test_parse_get_with_host_header() {
        let req = parse(b"GET /x HTTP/1.1\r\nHost: h\r\nConnection: keep-alive\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.target, "/x");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(req.host, "h");
        assert_eq!(req.port, "80");
        assert_eq!(
            req.headers,
            vec![
                ("Host".to_string(), "h".to_string()),
                ("Connection".to_string(), "keep-alive".to_string()),
            ]
        );
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn test_parse_absolute_form_target() {
        let req = parse(b"GET http://example.com:8080/a/b?q=1 HTTP/1.1\r\nHost: example.com:8080\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.target, "/a/b?q=1");
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, "8080");
    }

    #[tokio::test]
    async fn test_parse_absolute_form_without_path() {
        let req = parse(b"GET http://example.com HTTP/1.1\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.target, "/");
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, "80");
    }

    #[tokio::test]
    async fn test_parse_connect_target() {
        let req = parse(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.method, "CONNECT");
        assert_eq!(req.host, "example.com");
        assert_eq!(req.port, "443");
    }

    #[tokio::test]
    async fn test_connect_without_port_is_malformed() {
        let err = parse(b"CONNECT example.com HTTP/1.1\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest { .. }));
    }

    #[tokio::test]
    async fn test_parse_reads_declared_body() {
        let req = parse(
            b"POST /submit HTTP/1.1\r\nHost: h\r\nContent-Length: 11\r\n\r\nhello=world",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(req.body, b"hello=world");
    }

    #[tokio::test]
    async fn test_parse_body_split_across_reads() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client
                .write_all(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: 10\r\n\r\nhel")
                .await
                .unwrap();
            client.write_all(b"lo world").await.unwrap();
        });
        let req = read_request(&mut server, 32 * 1024).await.unwrap().unwrap();
        writer.await.unwrap();
        assert_eq!(req.body, b"hello worl");
    }

    #[tokio::test]
    async fn test_invalid_content_length_leaves_prefix_body() {
        // The engine, not the parser, rejects a bad Content-Length
        let req = parse(b"POST / HTTP/1.1\r\nHost: h\r\nContent-Length: abc\r\n\r\nx")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.body, b"x");
    }

    #[tokio::test]
    async fn test_missing_host_is_malformed() {
        let err = parse(b"GET / HTTP/1.1\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest { .. }));
    }

    #[tokio::test]
    async fn test_empty_connection_yields_none() {
        let req = parse(b"").await.unwrap();
        assert!(req.is_none());
    }

    #[tokio::test]
    async fn test_oversized_head_is_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\nHost: h\r\n".to_vec();
        raw.extend(std::iter::repeat(b'a').take(64 * 1024));
        let (mut client, mut server) = tokio::io::duplex(128 * 1024);
        tokio::io::AsyncWriteExt::write_all(&mut client, &raw).await.unwrap();
        let err = read_request(&mut server, 32 * 1024).await.unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest { .. }));
    }

    #[test]
    fn test_find_subsequence() {
        assert_eq!(find_subsequence(b"abcd", b"cd"), Some(2));
        assert_eq!(find_subsequence(b"abcd", b"xy"), None);
        assert_eq!(find_subsequence(b"abcd", b""), Some(0));
    }
}
