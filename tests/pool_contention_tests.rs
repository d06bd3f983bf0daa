//! Keep-alive pool behaviour under concurrent checkout and deposit.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

use viaduct::forward::ConnectionPool;

/// Open `count` connected sockets; the accepted halves are kept alive so
/// no FIN interferes with pool bookkeeping.
async fn connected_sockets(count: usize) -> (Vec<TcpStream>, Vec<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut sockets = Vec::with_capacity(count);
    let mut held = Vec::with_capacity(count);
    for _ in 0..count {
        let (connected, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        sockets.push(connected.unwrap());
        held.push(accepted.unwrap().0);
    }
    (sockets, held)
}

// Checkout is linearisable: with many workers depositing unique sockets
// under one key and checking out concurrently, no socket is ever handed to
// two workers.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn checkout_is_exclusive_under_contention() {
    const WORKERS: usize = 8;
    const SOCKETS_PER_WORKER: usize = 16;

    let pool = Arc::new(ConnectionPool::new());
    let (sockets, _held) = connected_sockets(WORKERS * SOCKETS_PER_WORKER).await;

    let mut batches: Vec<Vec<TcpStream>> = Vec::new();
    let mut iter = sockets.into_iter();
    for _ in 0..WORKERS {
        batches.push(iter.by_ref().take(SOCKETS_PER_WORKER).collect());
    }

    let mut handles = Vec::new();
    for batch in batches {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            let mut owned: Vec<SocketAddr> = Vec::new();
            for socket in batch {
                pool.deposit("origin:80", socket);
                if let Some(stream) = pool.checkout("origin:80") {
                    owned.push(stream.local_addr().unwrap());
                }
                tokio::task::yield_now().await;
            }
            owned
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0usize;
    for handle in handles {
        for addr in handle.await.unwrap() {
            total += 1;
            assert!(
                seen.insert(addr),
                "socket {} was returned to two workers",
                addr
            );
        }
    }
    assert!(total > 0);

    // At most the final deposit survives in the pool
    assert!(pool.idle_count() <= 1);
}

// Deposit keeps exactly one socket per key, whatever the interleaving.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_socket_per_key_after_concurrent_deposits() {
    const WORKERS: usize = 8;

    let pool = Arc::new(ConnectionPool::new());
    let (sockets, _held) = connected_sockets(WORKERS).await;

    let mut handles = Vec::new();
    for socket in sockets {
        let pool = Arc::clone(&pool);
        handles.push(tokio::spawn(async move {
            pool.deposit("origin:80", socket);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(pool.idle_count(), 1);
    assert!(pool.checkout("origin:80").is_some());
    assert!(pool.checkout("origin:80").is_none());
}
