use crate::http::HttpRequest;

/// Whether a request header belongs to the client-to-proxy hop only
pub fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-connection"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

/// Serialise the request line and headers for the origin.
///
/// Surviving headers keep their wire order; hop-by-hop fields are dropped
/// and a single `Connection: keep-alive` is appended in their place. Body
/// bytes, when any, follow the returned head.
pub fn serialize_head(req: &HttpRequest) -> Vec<u8> {
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(req.method.as_bytes());
    head.push(b' ');
    head.extend_from_slice(req.target.as_bytes());
    head.push(b' ');
    head.extend_from_slice(req.version.as_bytes());
    head.extend_from_slice(b"\r\n");

    for (name, value) in &req.headers {
        if is_hop_by_hop_header(name) {
            continue;
        }
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }

    head.extend_from_slice(b"Connection: keep-alive\r\n\r\n");
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: Vec<(&str, &str)>) -> HttpRequest {
        HttpRequest {
            method: "GET".to_string(),
            target: "/x".to_string(),
            version: "HTTP/1.1".to_string(),
            host: "h".to_string(),
            port: "80".to_string(),
            headers: headers
                .into_iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            body: Vec::new(),
        }
    }

    #[test]
    fn test_hop_by_hop_detection() {
        assert!(is_hop_by_hop_header("Connection"));
        assert!(is_hop_by_hop_header("keep-alive"));
        assert!(is_hop_by_hop_header("Proxy-Connection"));
        assert!(is_hop_by_hop_header("Proxy-Authorization"));
        assert!(is_hop_by_hop_header("TE"));
        assert!(is_hop_by_hop_header("Trailer"));
        assert!(is_hop_by_hop_header("TRANSFER-ENCODING"));
        assert!(is_hop_by_hop_header("Upgrade"));
        assert!(!is_hop_by_hop_header("Content-Type"));
        assert!(!is_hop_by_hop_header("Authorization"));
        assert!(!is_hop_by_hop_header("Host"));
    }

    #[test]
    fn test_serialized_head_shape() {
        let req = request(vec![("Host", "h"), ("Connection", "close")]);
        let head = serialize_head(&req);
        assert_eq!(
            head,
            b"GET /x HTTP/1.1\r\nHost: h\r\nConnection: keep-alive\r\n\r\n"
        );
    }

    #[test]
    fn test_surviving_headers_keep_order() {
        let req = request(vec![
            ("Host", "h"),
            ("Keep-Alive", "timeout=5"),
            ("Accept", "*/*"),
            ("Transfer-Encoding", "chunked"),
            ("User-Agent", "curl/8"),
        ]);
        let head = String::from_utf8(serialize_head(&req)).unwrap();
        let lines: Vec<&str> = head.split("\r\n").collect();
        assert_eq!(
            lines,
            vec![
                "GET /x HTTP/1.1",
                "Host: h",
                "Accept: */*",
                "User-Agent: curl/8",
                "Connection: keep-alive",
                "",
                "",
            ]
        );
    }

    #[test]
    fn test_forwarded_set_is_input_minus_hop_by_hop() {
        // Property: forwarded headers = input \ HOP_BY_HOP + Connection: keep-alive
        let input = vec![
            ("Host", "h"),
            ("connection", "keep-alive"),
            ("proxy-authorization", "Basic xyz"),
            ("X-Custom", "1"),
            ("te", "trailers"),
            ("trailer", "Expires"),
            ("upgrade", "h2c"),
            ("Cookie", "a=b"),
        ];
        let req = request(input.clone());
        let head = String::from_utf8(serialize_head(&req)).unwrap();
        let forwarded: Vec<&str> = head
            .split("\r\n")
            .skip(1)
            .filter(|l| !l.is_empty())
            .collect();

        let mut expected: Vec<String> = input
            .iter()
            .filter(|(n, _)| !is_hop_by_hop_header(n))
            .map(|(n, v)| format!("{}: {}", n, v))
            .collect();
        expected.push("Connection: keep-alive".to_string());
        assert_eq!(forwarded, expected);
    }
}
