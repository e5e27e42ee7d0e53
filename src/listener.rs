//! Accept loop and per-connection receive tasks.
//!
//! The listener owns only the accept lifecycle: each accepted socket is
//! registered, announced, and handed to a dedicated receive task, so
//! stopping the listener never touches open connections. Lifecycle and
//! message notifications flow to the owning server over a channel rather
//! than through inheritance hooks.

use std::{
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use tokio::{
    net::{TcpListener, TcpStream},
    select,
    sync::{mpsc, watch},
};
use tracing::{debug, info, warn};

use crate::{
    connection::{receive_loop, Connection, Disconnect},
    error::{ChatError, Result},
    registry::ConnectionRegistry,
};

/// Notifications the listener and its receive tasks deliver to the server.
#[derive(Debug)]
pub enum ServerEvent {
    /// A new connection was accepted and registered.
    Connected(Arc<Connection>),
    /// One inbound message line from a connection.
    Message { conn: Arc<Connection>, text: String },
    /// A connection's receive loop terminated; sent exactly once per
    /// connection, after it has been removed from the registry.
    Disconnected { conn: Arc<Connection>, cause: Disconnect },
    /// The accept loop faulted and the listener is back to Stopped.
    AcceptFailed(io::Error),
}

/// Accepts inbound connections while Listening.
///
/// State machine: Stopped --start--> Listening --stop--> Stopped, with an
/// accept fault also landing in Stopped. Stopping only interrupts the
/// accept loop; open connections and their receive loops are independent.
pub struct Listener {
    registry: Arc<ConnectionRegistry>,
    events: mpsc::UnboundedSender<ServerEvent>,
    listening: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
    stop_tx: Option<watch::Sender<bool>>,
}

impl Listener {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        events: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            registry,
            events,
            listening: Arc::new(AtomicBool::new(false)),
            next_id: Arc::new(AtomicU64::new(1)),
            stop_tx: None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Binds the port and spawns the accept loop. Returns the bound
    /// address, which carries the actual port when `port` is 0.
    pub async fn start(&mut self, port: u16) -> Result<SocketAddr> {
        if self.is_listening() {
            return Err(ChatError::InvalidState(
                "server is already listening for clients".into(),
            ));
        }

        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        self.stop_tx = Some(stop_tx);
        self.listening.store(true, Ordering::SeqCst);

        tokio::spawn(accept_loop(
            listener,
            stop_rx,
            Arc::clone(&self.registry),
            self.events.clone(),
            Arc::clone(&self.listening),
            Arc::clone(&self.next_id),
        ));
        Ok(addr)
    }

    /// Interrupts the accept loop without terminating open connections.
    /// Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
            info!("stopped listening");
        }
        self.listening.store(false, Ordering::SeqCst);
    }
}

async fn accept_loop(
    listener: TcpListener,
    mut stop_rx: watch::Receiver<bool>,
    registry: Arc<ConnectionRegistry>,
    events: mpsc::UnboundedSender<ServerEvent>,
    listening: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
) {
    loop {
        select! {
            _ = stop_rx.wait_for(|stop| *stop) => {
                debug!("accept loop interrupted");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let id = next_id.fetch_add(1, Ordering::Relaxed);
                    admit(id, stream, peer, &registry, &events).await;
                }
                Err(error) => {
                    warn!(?error, "accept failed; listener stopping");
                    listening.store(false, Ordering::SeqCst);
                    let _ = events.send(ServerEvent::AcceptFailed(error));
                    break;
                }
            },
        }
    }
}

/// Registers an accepted socket and spawns its receive task. The task
/// removes the connection from the registry and raises `Disconnected`
/// when the receive loop ends, whatever the cause.
async fn admit(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    registry: &Arc<ConnectionRegistry>,
    events: &mpsc::UnboundedSender<ServerEvent>,
) {
    let (conn, reader) = match Connection::accepted(id, stream) {
        Ok(pair) => pair,
        Err(error) => {
            warn!(%peer, ?error, "dropping connection that failed during setup");
            return;
        }
    };

    registry.add(Arc::clone(&conn)).await;
    let _ = events.send(ServerEvent::Connected(Arc::clone(&conn)));

    let registry = Arc::clone(registry);
    let events = events.clone();
    tokio::spawn(async move {
        let message_conn = Arc::clone(&conn);
        let message_events = events.clone();
        let cause = receive_loop(&conn, reader, move |text| {
            let _ = message_events.send(ServerEvent::Message {
                conn: Arc::clone(&message_conn),
                text,
            });
        })
        .await;

        conn.close().await;
        registry.remove(conn.id()).await;
        let _ = events.send(ServerEvent::Disconnected { conn, cause });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_and_stop_track_state() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut listener = Listener::new(registry, events_tx);

        assert!(!listener.is_listening());
        listener.start(0).await.expect("start");
        assert!(listener.is_listening());

        let err = listener.start(0).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidState(_)));

        listener.stop();
        assert!(!listener.is_listening());
        listener.stop();
        assert!(!listener.is_listening());
    }

    #[tokio::test]
    async fn restart_after_stop_rebinds() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let mut listener = Listener::new(registry, events_tx);

        let first = listener.start(0).await.expect("first start");
        listener.stop();
        let second = listener.start(0).await.expect("second start");
        assert!(listener.is_listening());
        assert_ne!(first.port(), 0);
        assert_ne!(second.port(), 0);
    }
}
