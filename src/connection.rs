//! One established chat connection and its receive loop.
//!
//! A [`Connection`] exclusively owns the write half of its socket; the
//! read half is handed to [`receive_loop`], which runs on the dedicated
//! task its owner spawns per connection. Closing is idempotent and safe
//! from any task, including the receive loop's own termination path.

use std::{
    fmt, io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, OnceLock,
    },
};

use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    select,
    sync::{watch, Mutex},
};
use tracing::debug;

use crate::{
    error::{ChatError, Result},
    wire,
};

/// Identifier the listener assigns for registry membership.
pub type ConnectionId = u64;

/// Reader half of a socket, consumed by [`receive_loop`].
pub type ConnectionReader = BufReader<OwnedReadHalf>;

const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Why a receive loop terminated. Reported to the owner exactly once.
#[derive(Debug)]
pub enum Disconnect {
    /// The remote side closed the connection in an orderly fashion.
    PeerClosed,
    /// [`Connection::close`] was called on this side.
    Closed,
    /// The transport failed.
    Fault(io::Error),
}

impl Disconnect {
    /// The terminal condition as an error, or `None` for a local close.
    pub fn into_error(self) -> Option<ChatError> {
        match self {
            Disconnect::PeerClosed => Some(ChatError::PeerClosed),
            Disconnect::Fault(error) => Some(ChatError::Io(error)),
            Disconnect::Closed => None,
        }
    }
}

/// One established bidirectional text-message channel.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    login: OnceLock<String>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    state: AtomicU8,
    close_tx: watch::Sender<bool>,
}

impl Connection {
    /// Wraps a socket accepted by the listener.
    pub fn accepted(
        id: ConnectionId,
        stream: TcpStream,
    ) -> io::Result<(Arc<Self>, ConnectionReader)> {
        Self::from_stream(id, stream)
    }

    /// Dials a server and wraps the resulting socket.
    pub async fn connect(host: &str, port: u16) -> io::Result<(Arc<Self>, ConnectionReader)> {
        let stream = TcpStream::connect((host, port)).await?;
        Self::from_stream(0, stream)
    }

    fn from_stream(
        id: ConnectionId,
        stream: TcpStream,
    ) -> io::Result<(Arc<Self>, ConnectionReader)> {
        let peer = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        let (close_tx, _) = watch::channel(false);
        let conn = Arc::new(Self {
            id,
            peer,
            login: OnceLock::new(),
            writer: Mutex::new(Some(write_half)),
            state: AtomicU8::new(STATE_OPEN),
            close_tx,
        });
        Ok((conn, BufReader::new(read_half)))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_OPEN
    }

    /// Binds the login id announced by the peer. The id can only be set
    /// once; returns false when one is already bound.
    pub fn bind_login(&self, id: &str) -> bool {
        self.login.set(id.to_string()).is_ok()
    }

    pub fn login(&self) -> Option<&str> {
        self.login.get().map(String::as_str)
    }

    /// Sends one message. Send-call order is preserved by the writer
    /// lock; callers are assumed to be a single logical sender at a time,
    /// concurrent only with the receive path.
    pub async fn send(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(w) if self.is_open() => Ok(wire::write_line(w, line).await?),
            _ => Err(ChatError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is not open",
            ))),
        }
    }

    /// Closes the transport. Idempotent: only the first call shuts the
    /// write half down and signals the receive loop to drop the read
    /// half; later calls are no-ops.
    pub async fn close(&self) {
        if self
            .state
            .compare_exchange(STATE_OPEN, STATE_CLOSING, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(error) = writer.shutdown().await {
                debug!(?error, "error shutting down connection writer");
            }
        }
        self.state.store(STATE_CLOSED, Ordering::SeqCst);
        let _ = self.close_tx.send(true);
    }

    fn close_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }
}

/// Connections are named by their login id once bound, otherwise by the
/// peer address. Used in every console notice naming a connection.
impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.login.get() {
            Some(login) => write!(f, "{login}"),
            None => write!(f, "{}", self.peer),
        }
    }
}

/// Drives a connection's read half until the peer closes, the transport
/// faults, or a local close drops the loop. Each inbound line goes to
/// `on_message`; the terminal cause is the return value, so the owner
/// observes it exactly once.
pub async fn receive_loop<F>(conn: &Connection, mut reader: ConnectionReader, on_message: F) -> Disconnect
where
    F: Fn(String),
{
    let mut closed = conn.close_signal();
    loop {
        select! {
            read = wire::read_line(&mut reader) => match read {
                Ok(Some(text)) => on_message(text),
                Ok(None) => return Disconnect::PeerClosed,
                Err(error) => return Disconnect::Fault(error),
            },
            _ = closed.wait_for(|closed| *closed) => return Disconnect::Closed,
        }
    }
}
