//! Client mode: console command interpreter and chat relay.

use std::{io, sync::Arc};

use anyhow::Result;
use tokio::{select, sync::mpsc};
use tracing::{debug, info};

use crate::{
    command::{self, ClientCommand},
    connection::{receive_loop, Connection, Disconnect},
    console,
    error::ChatError,
};

/// Notifications from the current connection's receive task.
#[derive(Debug)]
enum ClientEvent {
    Message(String),
    Ended { conn: Arc<Connection>, cause: Disconnect },
}

/// Owns at most one connection to a server, plus the mutable target
/// configuration. Host and port can only change while disconnected.
pub struct Client {
    host: String,
    port: u16,
    login_id: String,
    connection: Option<Arc<Connection>>,
    events_tx: mpsc::UnboundedSender<ClientEvent>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Client {
    pub fn new(host: String, port: u16, login_id: String) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            host,
            port,
            login_id,
            connection: None,
            events_tx,
            events,
        }
    }

    /// Connects immediately, then serves the console until `#quit`. A
    /// failed initial connection leaves the client up and disconnected;
    /// so does losing the connection later. Only `#quit` and a chat send
    /// failure end the process.
    pub async fn run(mut self) -> Result<()> {
        if self.connect().await.is_err() {
            console::display("Cannot open connection. Awaiting command.").await?;
        }

        let mut console_rx = console::stdin_lines();
        loop {
            select! {
                line = console_rx.recv() => match line {
                    Some(line) => {
                        if !self.handle_console_line(&line).await? {
                            break;
                        }
                    }
                    None => break,
                },
                event = self.events.recv() => {
                    if let Some(event) = event {
                        self.handle_event(event).await?;
                    }
                }
            }
        }

        self.quit().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|conn| conn.is_open())
    }

    /// Dials the configured server, spawns the receive task, and sends
    /// the login handshake as the first message.
    async fn connect(&mut self) -> Result<(), ChatError> {
        let (conn, reader) = Connection::connect(&self.host, self.port).await?;

        let events_tx = self.events_tx.clone();
        let loop_conn = Arc::clone(&conn);
        tokio::spawn(async move {
            let message_tx = events_tx.clone();
            let cause = receive_loop(&loop_conn, reader, move |text| {
                let _ = message_tx.send(ClientEvent::Message(text));
            })
            .await;
            loop_conn.close().await;
            let _ = events_tx.send(ClientEvent::Ended {
                conn: Arc::clone(&loop_conn),
                cause,
            });
        });

        conn.send(&format!("#login {}", self.login_id)).await?;
        info!(host = %self.host, port = self.port, login = %self.login_id, "connected");
        self.connection = Some(conn);
        Ok(())
    }

    /// Interprets one console line. Returns false when the client should
    /// terminate; every directive error becomes a display notice.
    async fn handle_console_line(&mut self, line: &str) -> Result<bool> {
        if line.trim().is_empty() {
            return Ok(true);
        }
        if !command::is_directive(line) {
            return self.forward_chat(line).await;
        }
        match ClientCommand::parse(line) {
            Ok(cmd) => match self.apply(cmd).await {
                Ok(keep_running) => Ok(keep_running),
                Err(error) => {
                    console::display(&error.to_string()).await?;
                    Ok(true)
                }
            },
            Err(error) => {
                console::display(&error.to_string()).await?;
                Ok(true)
            }
        }
    }

    /// Forwards chat verbatim. A send failure here is the one fail-fast
    /// path: the client reports it and performs the quit sequence.
    async fn forward_chat(&mut self, text: &str) -> Result<bool> {
        let sent = match self.connection.as_ref() {
            Some(conn) => conn.send(text).await,
            None => Err(ChatError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "not connected",
            ))),
        };
        if let Err(error) = sent {
            debug!(?error, "chat forward failed");
            console::display("Could not send message to server. Terminating client.").await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Applies one directive. State checks come before argument checks,
    /// mirroring the server interpreter.
    async fn apply(&mut self, cmd: ClientCommand) -> Result<bool, ChatError> {
        match cmd {
            ClientCommand::Quit => {
                console::display("Client is about to quit.").await?;
                Ok(false)
            }
            ClientCommand::Logoff => {
                if !self.is_connected() {
                    return Err(ChatError::InvalidState("client is not connected".into()));
                }
                if let Some(conn) = self.connection.as_ref() {
                    conn.close().await;
                }
                Ok(true)
            }
            ClientCommand::SetHost(arg) => {
                if self.is_connected() {
                    return Err(ChatError::InvalidState(
                        "cannot change the host while connected".into(),
                    ));
                }
                self.host = arg
                    .ok_or_else(|| ChatError::InvalidArgument("missing host name".into()))?;
                console::display(&format!("Host set to {}", self.host)).await?;
                Ok(true)
            }
            ClientCommand::SetPort(arg) => {
                if self.is_connected() {
                    return Err(ChatError::InvalidState(
                        "cannot change the port while connected".into(),
                    ));
                }
                self.port = command::parse_port(arg.as_deref())?;
                console::display(&format!("Port set to {}", self.port)).await?;
                Ok(true)
            }
            ClientCommand::Login => {
                if self.is_connected() {
                    return Err(ChatError::InvalidState(
                        "already connected to the server".into(),
                    ));
                }
                if let Err(error) = self.connect().await {
                    debug!(?error, "connect failed");
                    console::display("Cannot open connection. Awaiting command.").await?;
                }
                Ok(true)
            }
            ClientCommand::GetHost => {
                console::display(&format!("Current host: {}", self.host)).await?;
                Ok(true)
            }
            ClientCommand::GetPort => {
                console::display(&format!("Current port: {}", self.port)).await?;
                Ok(true)
            }
        }
    }

    async fn handle_event(&mut self, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::Message(text) => console::display(&text).await?,
            ClientEvent::Ended { conn, cause } => {
                // An Ended notice from a connection that has already been
                // replaced must not clear the current one.
                let is_current = self
                    .connection
                    .as_ref()
                    .is_some_and(|current| Arc::ptr_eq(current, &conn));
                if !is_current {
                    return Ok(());
                }
                self.connection = None;
                match cause.into_error() {
                    None => console::display("Connection closed").await?,
                    Some(error) => {
                        debug!(%error, "connection ended abnormally");
                        console::display("Abnormal termination of connection.").await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn quit(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close().await;
        }
        info!("client exiting");
    }
}
