//! Integration coverage for the listener, registry, and connection
//! lifecycle over real sockets.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chat_relay::{
    connection::Disconnect,
    listener::{Listener, ServerEvent},
    registry::ConnectionRegistry,
    wire,
};
use tokio::{io::BufReader, net::TcpStream, sync::mpsc, time::timeout};

const WAIT: Duration = Duration::from_secs(2);

async fn next_event(events: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for a server event")
        .expect("event channel closed")
}

fn fresh_listener() -> (
    Arc<ConnectionRegistry>,
    Listener,
    mpsc::UnboundedReceiver<ServerEvent>,
) {
    let registry = Arc::new(ConnectionRegistry::new());
    let (events_tx, events) = mpsc::unbounded_channel();
    let listener = Listener::new(Arc::clone(&registry), events_tx);
    (registry, listener, events)
}

#[tokio::test]
async fn accepts_clients_and_reports_lifecycle() -> Result<()> {
    let (registry, mut listener, mut events) = fresh_listener();
    let addr = listener.start(0).await?;

    let mut stream = TcpStream::connect(addr).await?;
    match next_event(&mut events).await {
        ServerEvent::Connected(_) => {}
        other => panic!("expected Connected, got {other:?}"),
    }
    assert_eq!(registry.len().await, 1);

    wire::write_line(&mut stream, "hi there").await?;
    match next_event(&mut events).await {
        ServerEvent::Message { text, .. } => assert_eq!(text, "hi there"),
        other => panic!("expected Message, got {other:?}"),
    }

    let delivered = registry.broadcast("hi there", None).await;
    assert_eq!(delivered, 1);
    let mut reader = BufReader::new(stream);
    let echoed = wire::read_line(&mut reader).await?;
    assert_eq!(echoed.as_deref(), Some("hi there"));

    drop(reader);
    match next_event(&mut events).await {
        ServerEvent::Disconnected { cause, .. } => {
            assert!(matches!(cause, Disconnect::PeerClosed), "got {cause:?}");
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
    assert!(registry.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn stop_keeps_existing_connections_open() -> Result<()> {
    let (registry, mut listener, mut events) = fresh_listener();
    let addr = listener.start(0).await?;

    let mut stream = TcpStream::connect(addr).await?;
    match next_event(&mut events).await {
        ServerEvent::Connected(_) => {}
        other => panic!("expected Connected, got {other:?}"),
    }

    listener.stop();
    assert!(!listener.is_listening());

    // Give the accept task a moment to release the listening socket;
    // fresh connections are then refused.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(TcpStream::connect(addr).await.is_err());

    // The open connection keeps chatting in both directions.
    wire::write_line(&mut stream, "still chatting").await?;
    match next_event(&mut events).await {
        ServerEvent::Message { text, .. } => assert_eq!(text, "still chatting"),
        other => panic!("expected Message, got {other:?}"),
    }
    assert_eq!(registry.broadcast("welcome back", None).await, 1);
    let mut reader = BufReader::new(stream);
    let line = wire::read_line(&mut reader).await?;
    assert_eq!(line.as_deref(), Some("welcome back"));
    Ok(())
}

#[tokio::test]
async fn close_all_disconnects_every_client_exactly_once() -> Result<()> {
    let (registry, mut listener, mut events) = fresh_listener();
    let addr = listener.start(0).await?;

    let first = TcpStream::connect(addr).await?;
    match next_event(&mut events).await {
        ServerEvent::Connected(_) => {}
        other => panic!("expected Connected, got {other:?}"),
    }
    let second = TcpStream::connect(addr).await?;
    match next_event(&mut events).await {
        ServerEvent::Connected(_) => {}
        other => panic!("expected Connected, got {other:?}"),
    }
    assert_eq!(registry.len().await, 2);

    registry.close_all().await;

    // Both clients observe an orderly end of stream.
    for stream in [first, second] {
        let mut reader = BufReader::new(stream);
        let eof = timeout(WAIT, wire::read_line(&mut reader)).await.expect("read")?;
        assert!(eof.is_none());
    }

    // Exactly one Disconnected per connection, and none after that.
    for _ in 0..2 {
        match next_event(&mut events).await {
            ServerEvent::Disconnected { cause, .. } => {
                assert!(matches!(cause, Disconnect::Closed), "got {cause:?}");
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }
    assert!(timeout(Duration::from_millis(300), events.recv()).await.is_err());
    assert!(registry.is_empty().await);
    Ok(())
}
