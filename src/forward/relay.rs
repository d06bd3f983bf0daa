use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

use crate::http::find_subsequence;

const HEAD_DELIMITER: &[u8] = b"\r\n\r\n";
const CHUNKED_TERMINATOR: &[u8] = b"0\r\n\r\n";

/// What the relay learned about the origin connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayOutcome {
    /// Whether the origin advertised keep-alive and the exchange ended in a
    /// state where the socket can be parked for reuse.
    pub origin_keep_alive: bool,
    /// Response body bytes forwarded to the client (excludes the head).
    pub body_bytes: u64,
}

/// Response framing extracted from the header section.
#[derive(Debug, Default, Clone, Copy)]
struct ResponseFraming {
    keep_alive: bool,
    content_length: Option<u64>,
    chunked: bool,
}

/// Field-by-field scan of the response head for the three tokens the relay
/// cares about. Names and values match case-insensitively; an unparseable
/// Content-Length is treated as absent.
fn parse_framing(header_section: &[u8]) -> ResponseFraming {
    let mut framing = ResponseFraming::default();
    let text = String::from_utf8_lossy(header_section);

    for line in text.split("\r\n").skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("connection") {
            if value.eq_ignore_ascii_case("keep-alive") {
                framing.keep_alive = true;
            }
        } else if name.eq_ignore_ascii_case("content-length") {
            match value.parse::<u64>() {
                Ok(n) => framing.content_length = Some(n),
                Err(_) => debug!("ignoring unparseable Content-Length {:?}", value),
            }
        } else if name.eq_ignore_ascii_case("transfer-encoding")
            && value
                .split(',')
                .any(|t| t.trim().eq_ignore_ascii_case("chunked"))
        {
            framing.chunked = true;
        }
    }
    framing
}

/// Detects the chunked stream terminator `0\r\n\r\n` across read
/// boundaries by carrying the last few bytes of every buffer.
#[derive(Debug, Default)]
pub(crate) struct TerminatorScan {
    carry: Vec<u8>,
}

impl TerminatorScan {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed the next buffer; true once the terminator has been seen.
    pub(crate) fn feed(&mut self, data: &[u8]) -> bool {
        if data.is_empty() {
            return false;
        }
        let mut window = Vec::with_capacity(self.carry.len() + data.len());
        window.extend_from_slice(&self.carry);
        window.extend_from_slice(data);
        let found = find_subsequence(&window, CHUNKED_TERMINATOR).is_some();

        let keep = window.len().min(CHUNKED_TERMINATOR.len() - 1);
        self.carry = window[window.len() - keep..].to_vec();
        found
    }
}

/// Relay one origin response to the client.
///
/// Reads into a fixed buffer, assembling the head until the blank line,
/// then forwards the head plus whatever body prefix arrived with it as a
/// single write and streams the rest verbatim. Termination follows the
/// declared framing: the Content-Length byte count, the chunked
/// terminator, implicit zero length when nothing is declared, or the
/// origin closing. Failures are logged here; the caller only learns
/// whether the socket is still fit for the pool.
pub async fn relay_response<O, C>(
    origin: &mut O,
    client: &mut C,
    buffer_size: usize,
    client_id: u64,
) -> RelayOutcome
where
    O: AsyncRead + Unpin,
    C: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut head = Vec::new();
    let mut framing: Option<ResponseFraming> = None;
    let mut scan = TerminatorScan::new();
    let mut outcome = RelayOutcome::default();

    loop {
        let read = match origin.read(&mut buf).await {
            Ok(0) => {
                debug!("client {}: origin closed the response stream", client_id);
                break;
            }
            Ok(n) => n,
            Err(e) => {
                error!(
                    "client {}: error reading response from origin: {}",
                    client_id, e
                );
                break;
            }
        };
        let received = &buf[..read];

        match framing {
            None => {
                head.extend_from_slice(received);
                let Some(head_end) = find_subsequence(&head, HEAD_DELIMITER) else {
                    continue;
                };

                let parsed = parse_framing(&head[..head_end]);
                outcome.origin_keep_alive = parsed.keep_alive;

                // One write covers the head and the body prefix that
                // arrived with it.
                if let Err(e) = client.write_all(&head).await {
                    error!(
                        "client {}: failed to send response headers: {}",
                        client_id, e
                    );
                    // The origin still holds unsent response bytes; never pool it.
                    outcome.origin_keep_alive = false;
                    return outcome;
                }

                let body_prefix = &head[head_end + HEAD_DELIMITER.len()..];
                outcome.body_bytes = body_prefix.len() as u64;

                let done = match (parsed.content_length, parsed.chunked) {
                    (Some(length), _) => outcome.body_bytes >= length,
                    (None, true) => scan.feed(body_prefix),
                    (None, false) => true,
                };
                framing = Some(parsed);
                if done {
                    break;
                }
            }
            Some(parsed) => {
                if let Err(e) = client.write_all(received).await {
                    error!(
                        "client {}: failed to send response body: {}",
                        client_id, e
                    );
                    outcome.origin_keep_alive = false;
                    return outcome;
                }
                outcome.body_bytes += read as u64;

                let done = match (parsed.content_length, parsed.chunked) {
                    (Some(length), _) => outcome.body_bytes >= length,
                    (None, true) => scan.feed(received),
                    (None, false) => false,
                };
                if done {
                    break;
                }
            }
        }
    }

    if framing.is_none() && !head.is_empty() {
        debug!(
            "client {}: origin closed before the response head completed ({} bytes discarded)",
            client_id,
            head.len()
        );
    }
    outcome
}
