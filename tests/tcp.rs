#![cfg(not(loom))]
//! [`MeteredListener`] over real sockets.

use std::{io, sync::Arc, time::Duration};

use rstest::rstest;

use metered_listener::{AcceptError, ListenerOptions, MeteredListener};
use metered_listener_testing::RecordingClient;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::timeout,
};

#[tokio::test]
async fn tcp_connections_are_counted_and_usable() {
    let client = Arc::new(RecordingClient::default());
    let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let listener = MeteredListener::with_options(
        tcp,
        Arc::clone(&client),
        [ListenerOptions::default().flush_interval(Duration::from_secs(3600))],
    )
    .expect("wrap listener");
    let addr = listener.local_addr().expect("local addr");

    let mut peer = TcpStream::connect(addr).await.expect("connect");
    let (mut conn, remote) = listener.accept().await.expect("accept");
    assert_eq!(remote, peer.local_addr().expect("peer addr"));
    assert_eq!(listener.open_connections(), 1);

    peer.write_all(b"ping").await.expect("write");
    let mut buf = [0_u8; 4];
    conn.read_exact(&mut buf).await.expect("read");
    assert_eq!(&buf, b"ping");

    conn.close().await.expect("shutdown");
    assert_eq!(listener.open_connections(), 0);
    let read = peer.read(&mut buf).await.expect("read eof");
    assert_eq!(read, 0);

    listener.close().await.expect("close");
    assert_eq!(client.count_total("status:success"), 1);
    assert!((client.gauge_max() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn close_releases_the_socket() {
    let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let listener = MeteredListener::new(tcp, RecordingClient::default()).expect("wrap listener");
    let addr = listener.local_addr().expect("local addr");

    listener.close().await.expect("close");
    assert!(listener.local_addr().is_err());

    let attempt = timeout(Duration::from_secs(1), TcpStream::connect(addr)).await;
    assert!(
        matches!(attempt, Ok(Err(_))),
        "closed listener still completes handshakes: {attempt:?}"
    );
    TcpListener::bind(addr).await.expect("address is free again");
}

#[rstest]
#[case(1)]
#[case(4)]
#[tokio::test]
async fn pending_accepts_give_up_the_socket_on_close(#[case] waiters: usize) {
    let tcp = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let listener =
        Arc::new(MeteredListener::new(tcp, RecordingClient::default()).expect("wrap listener"));
    let addr = listener.local_addr().expect("local addr");

    let tasks: Vec<_> = (0..waiters)
        .map(|_| {
            let listener = Arc::clone(&listener);
            tokio::spawn(async move { listener.accept().await.map(|_| ()) })
        })
        .collect();
    tokio::task::yield_now().await;
    listener.close().await.expect("close");

    for task in tasks {
        let err = task
            .await
            .expect("accept task panicked")
            .expect_err("accept must fail after close");
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
    let attempt = timeout(Duration::from_secs(1), TcpStream::connect(addr)).await;
    assert!(matches!(attempt, Ok(Err(_))), "socket still open: {attempt:?}");
}

#[test]
fn io_timeouts_are_timeouts() {
    let err = io::Error::new(io::ErrorKind::TimedOut, "accept timed out");
    assert!(err.is_timeout());
    assert!(!err.is_temporary());
    assert!(io::Error::new(io::ErrorKind::Interrupted, "again").is_temporary());
}
