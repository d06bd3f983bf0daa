use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info};

/// Opaque bidirectional byte relay between the client and the origin.
///
/// The loop waits for readability on either socket; the idle arm merely
/// re-arms after its interval with no activity probe. Reads are forwarded
/// in full to the peer, each write bounded by the stall deadline. A peer
/// closing, a read or write error, or a stalled write ends the tunnel. The
/// origin socket is consumed and closed on return; the client socket is
/// borrowed and handed back open.
pub async fn run_tunnel(
    client: &mut TcpStream,
    mut origin: TcpStream,
    buffer_size: usize,
    idle_timeout: Duration,
    write_stall_timeout: Duration,
    client_id: u64,
) {
    let (mut client_read, mut client_write) = client.split();
    let (mut origin_read, mut origin_write) = origin.split();
    let mut client_buf = vec![0u8; buffer_size];
    let mut origin_buf = vec![0u8; buffer_size];

    loop {
        tokio::select! {
            read = client_read.read(&mut client_buf) => {
                match read {
                    Ok(0) => {
                        info!("client {} closed the tunnel", client_id);
                        break;
                    }
                    Ok(n) => {
                        if !forward_bytes(
                            &mut origin_write,
                            &client_buf[..n],
                            write_stall_timeout,
                            "origin",
                            client_id,
                        )
                        .await
                        {
                            break;
                        }
                        metrics::counter!("viaduct_tunnel_bytes_total").increment(n as u64);
                    }
                    Err(e) => {
                        error!("client {}: tunnel read from client failed: {}", client_id, e);
                        break;
                    }
                }
            }
            read = origin_read.read(&mut origin_buf) => {
                match read {
                    Ok(0) => {
                        info!("client {}: origin closed the tunnel", client_id);
                        break;
                    }
                    Ok(n) => {
                        if !forward_bytes(
                            &mut client_write,
                            &origin_buf[..n],
                            write_stall_timeout,
                            "client",
                            client_id,
                        )
                        .await
                        {
                            break;
                        }
                        metrics::counter!("viaduct_tunnel_bytes_total").increment(n as u64);
                    }
                    Err(e) => {
                        error!("client {}: tunnel read from origin failed: {}", client_id, e);
                        break;
                    }
                }
            }
            _ = sleep(idle_timeout) => {
                debug!("client {}: tunnel idle, re-arming", client_id);
            }
        }
    }
    // origin drops here; the client half stays open for the caller
}

/// Forward one buffer to a tunnel peer, bounded by the stall deadline.
async fn forward_bytes<W>(
    dst: &mut W,
    bytes: &[u8],
    deadline: Duration,
    peer: &str,
    client_id: u64,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    match timeout(deadline, dst.write_all(bytes)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!(
                "client {}: tunnel write to {} failed: {}",
                client_id, peer, e
            );
            false
        }
        Err(_) => {
            error!(
                "client {}: tunnel write to {} stalled past {:?}",
                client_id, peer, deadline
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (connected.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_tunnel_relays_both_directions() {
        let (mut proxy_client, mut remote_client) = socket_pair().await;
        let (proxy_origin, mut remote_origin) = socket_pair().await;

        let tunnel = tokio::spawn(async move {
            run_tunnel(
                &mut proxy_client,
                proxy_origin,
                8192,
                Duration::from_secs(30),
                Duration::from_secs(5),
                7,
            )
            .await;
        });

        remote_client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        remote_origin.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        remote_origin.write_all(b"pong").await.unwrap();
        remote_client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        // Closing the client side ends the tunnel and closes the origin
        drop(remote_client);
        tunnel.await.unwrap();

        let mut end = [0u8; 1];
        assert_eq!(remote_origin.read(&mut end).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tunnel_survives_idle_intervals() {
        let (mut proxy_client, mut remote_client) = socket_pair().await;
        let (proxy_origin, mut remote_origin) = socket_pair().await;

        let tunnel = tokio::spawn(async move {
            run_tunnel(
                &mut proxy_client,
                proxy_origin,
                8192,
                Duration::from_millis(20),
                Duration::from_secs(5),
                7,
            )
            .await;
        });

        // Several idle periods pass with no traffic; the tunnel must still relay
        tokio::time::sleep(Duration::from_millis(100)).await;
        remote_client.write_all(b"late").await.unwrap();
        let mut buf = [0u8; 4];
        remote_origin.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"late");

        drop(remote_client);
        tunnel.await.unwrap();
    }

    #[tokio::test]
    async fn test_tunnel_ends_when_origin_closes() {
        let (mut proxy_client, mut remote_client) = socket_pair().await;
        let (proxy_origin, remote_origin) = socket_pair().await;

        let tunnel = tokio::spawn(async move {
            run_tunnel(
                &mut proxy_client,
                proxy_origin,
                8192,
                Duration::from_secs(30),
                Duration::from_secs(5),
                7,
            )
            .await;
            proxy_client
        });

        drop(remote_origin);
        let _client_sock = tunnel.await.unwrap();

        // The client socket is handed back open; its peer can still write
        remote_client.write_all(b"x").await.unwrap();
    }
}
