//! Integration tests for [`BusSession`] against a local TCP peer.
//!
//! Each test binds a listener on an ephemeral loopback port, plays the bus
//! side, and decodes whatever frames the session writes.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use mvp_bus::codec::{decode, frame_len};
use mvp_bus::{BusSession, Frame, SendError, SessionConfig};
use tokio::io::AsyncReadExt as _;
use tokio::net::{TcpListener, TcpStream};

async fn read_frame(stream: &mut TcpStream) -> Frame {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await.unwrap();
    let total = frame_len(&prefix).unwrap();
    let mut frame = prefix.to_vec();
    frame.resize(total, 0);
    stream.read_exact(frame.get_mut(4..).unwrap()).await.unwrap();
    decode(&frame).unwrap()
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

#[tokio::test]
async fn connect_sends_hello_handshake() {
    let (listener, addr) = bind().await;
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_frame(&mut stream).await
    });

    let session = BusSession::connect(&addr, &SessionConfig::default())
        .await
        .unwrap();
    assert_eq!(session.peer(), addr);

    let hello = peer.await.unwrap();
    assert_eq!(hello.message_id, "HELLO");
    assert_eq!(hello.args, vec![("name".to_owned(), "MVPTracker".to_owned())]);
}

#[tokio::test]
async fn handshake_uses_configured_client_name() {
    let (listener, addr) = bind().await;
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_frame(&mut stream).await
    });

    let config = SessionConfig {
        client_name: "Watcher".to_owned(),
        ..SessionConfig::default()
    };
    let _session = BusSession::connect(&addr, &config).await.unwrap();

    let hello = peer.await.unwrap();
    assert_eq!(hello.get("name"), Some("Watcher"));
}

#[tokio::test]
async fn notification_is_a_bus_comm_party_message() {
    let (listener, addr) = bind().await;
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let hello = read_frame(&mut stream).await;
        let comm = read_frame(&mut stream).await;
        (hello, comm)
    });

    let mut session = BusSession::connect(&addr, &SessionConfig::default())
        .await
        .unwrap();
    session
        .send_notification("UP: Eddga is up at pay_fild11")
        .await
        .unwrap();

    let (hello, comm) = peer.await.unwrap();
    assert_eq!(hello.message_id, "HELLO");
    assert_eq!(comm.message_id, "busComm");
    assert_eq!(
        comm.args,
        vec![
            ("player".to_owned(), "all".to_owned()),
            ("comm".to_owned(), "p UP: Eddga is up at pay_fild11".to_owned()),
        ]
    );
}

#[tokio::test]
async fn oversized_key_fails_the_send_only() {
    let (listener, addr) = bind().await;
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _hello = read_frame(&mut stream).await;
        read_frame(&mut stream).await
    });

    let mut session = BusSession::connect(&addr, &SessionConfig::default())
        .await
        .unwrap();
    let key = "k".repeat(300);
    let err = session.send("busComm", &[(&key, "v")]).await.unwrap_err();
    assert!(matches!(err, SendError::Encoding(_)));

    // The session is still usable after an encoding failure.
    session.send_notification("still here").await.unwrap();
    let frame = peer.await.unwrap();
    assert_eq!(frame.get("comm"), Some("p still here"));
}

#[tokio::test]
async fn writes_to_a_closed_peer_eventually_fail() {
    let (listener, addr) = bind().await;
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _hello = read_frame(&mut stream).await;
        drop(stream);
    });

    let mut session = BusSession::connect(&addr, &SessionConfig::default())
        .await
        .unwrap();
    peer.await.unwrap();

    let mut failure = None;
    for _ in 0..50 {
        if let Err(e) = session.send_notification("DEAD: Maya died at 10:00:00").await {
            failure = Some(e);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(matches!(failure, Some(SendError::Io(_))));
}
