use std::time::{Duration, Instant};

use tokio::net::TcpListener;

use super::{Consumer, Producer, SendStatus};
use crate::broker::{Properties, Record};
use crate::config::ClientSettings;
use crate::utils::ClientError;

fn settings_for(addr: std::net::SocketAddr, ack_timeout_ms: u64) -> ClientSettings {
    ClientSettings {
        broker_host: addr.ip().to_string(),
        broker_port: addr.port(),
        connect_timeout_ms: 1000,
        ack_timeout_ms,
        ..ClientSettings::default()
    }
}

/// Accepts connections and holds them open without ever answering.
async fn silent_broker() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// Accepts connections and closes each one shortly afterwards.
async fn closing_broker() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                drop(stream);
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_producer_connect_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = Producer::connect(&settings_for(addr, 500)).await.unwrap_err();
    assert!(matches!(err, ClientError::Connect { .. }));
}

#[tokio::test]
async fn test_producer_send_times_out_and_forgets_waiter() {
    let addr = silent_broker().await;
    let producer = Producer::connect(&settings_for(addr, 200)).await.unwrap();

    let started = Instant::now();
    let result = producer.send("orders", "x", Properties::new()).await;
    assert_eq!(result.status, SendStatus::Fail);
    assert_eq!(result.msg_id, None);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(producer.in_flight(), 0);
}

#[tokio::test]
async fn test_producer_fails_fast_when_broker_closes() {
    let addr = closing_broker().await;
    let producer = Producer::connect(&settings_for(addr, 10_000)).await.unwrap();

    let started = Instant::now();
    let result = producer.send("orders", "x", Properties::new()).await;
    assert_eq!(result.status, SendStatus::Fail);
    assert!(started.elapsed() < Duration::from_secs(5));

    // the connection is known dead now; later sends fail without waiting
    let started = Instant::now();
    assert!(!producer.send("orders", "y", Properties::new()).await.is_success());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(!producer.is_connected());
}

#[tokio::test]
async fn test_producer_refuses_oversize_payload() {
    let addr = silent_broker().await;
    let settings = ClientSettings {
        max_frame_len: 64,
        ..settings_for(addr, 5_000)
    };
    let producer = Producer::connect(&settings).await.unwrap();

    let started = Instant::now();
    let result = producer.send("orders", vec![0u8; 1024], Properties::new()).await;
    assert_eq!(result.status, SendStatus::Fail);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_send_async_invokes_callback_once_on_failure() {
    let addr = silent_broker().await;
    let producer = Producer::connect(&settings_for(addr, 100)).await.unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    producer.send_async("orders", "x", Properties::new(), move |result| {
        let _ = tx.send(result);
    });

    let result = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("callback not invoked")
        .expect("callback dropped");
    assert_eq!(result.status, SendStatus::Fail);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_consumer_rejects_invalid_filter() {
    let addr = silent_broker().await;
    let err = Consumer::subscribe(&settings_for(addr, 200), "orders", "region", |_: Record| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidFilter(_)));
}

#[tokio::test]
async fn test_consumer_handshake_times_out() {
    let addr = silent_broker().await;
    let err = Consumer::subscribe(&settings_for(addr, 200), "orders", "", |_: Record| {})
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::HandshakeTimeout { timeout_ms: 200 }));
}

#[tokio::test]
async fn test_producer_stop_fails_outstanding_sends() {
    let addr = silent_broker().await;
    let producer = Producer::connect(&settings_for(addr, 10_000)).await.unwrap();
    let other = producer.clone();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    producer.send_async("orders", "x", Properties::new(), move |result| {
        let _ = tx.send(result);
    });
    assert_eq!(producer.in_flight(), 1);

    let started = Instant::now();
    producer.stop();

    let result = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("callback not invoked after stop")
        .expect("callback dropped");
    assert_eq!(result.status, SendStatus::Fail);
    assert!(started.elapsed() < Duration::from_secs(1));

    // clones share the stopped connection
    assert!(!other.is_connected());
    assert_eq!(other.in_flight(), 0);
    let started = Instant::now();
    assert!(!other.send("orders", "y", Properties::new()).await.is_success());
    assert!(started.elapsed() < Duration::from_secs(1));
}
