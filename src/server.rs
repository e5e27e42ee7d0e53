//! Server mode: operator command interpreter and broadcast routing.

use std::sync::Arc;

use anyhow::Result;
use tokio::{select, sync::mpsc};
use tracing::{debug, info, warn};

use crate::{
    command::{self, ServerCommand},
    connection::Connection,
    console,
    error::ChatError,
    listener::{Listener, ServerEvent},
    registry::ConnectionRegistry,
};

/// Marker prepended to operator chat so clients can tell it apart from
/// relayed client messages.
const SERVER_MESSAGE_PREFIX: &str = "SERVER MSG> ";

/// Directive a client sends as its first message to bind a login id.
const LOGIN_DIRECTIVE: &str = "#login";

/// Owns the listener, the registry, and the routing policy: every client
/// message is echoed to all connections, the sender included.
pub struct Server {
    port: u16,
    registry: Arc<ConnectionRegistry>,
    listener: Listener,
    events: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Server {
    pub fn new(port: u16) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let (events_tx, events) = mpsc::unbounded_channel();
        let listener = Listener::new(Arc::clone(&registry), events_tx);
        Self {
            port,
            registry,
            listener,
            events,
        }
    }

    /// Starts listening immediately, then serves the operator console and
    /// connection events until `#quit` or console close.
    pub async fn run(mut self) -> Result<()> {
        if let Err(error) = self.start_listening().await {
            console::display(&format!("ERROR - could not listen for clients: {error}")).await?;
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
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await?,
                    None => break,
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn start_listening(&mut self) -> Result<(), ChatError> {
        let addr = self.listener.start(self.port).await?;
        console::display(&format!(
            "Server listening for connections on port {}",
            addr.port()
        ))
        .await?;
        Ok(())
    }

    /// Interprets one operator console line. Returns false only for the
    /// `#quit` path; every directive error becomes a display notice.
    async fn handle_console_line(&mut self, line: &str) -> Result<bool> {
        if line.trim().is_empty() {
            return Ok(true);
        }
        if !command::is_directive(line) {
            self.send_operator_message(line).await?;
            return Ok(true);
        }
        match ServerCommand::parse(line) {
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

    /// Operator chat is displayed locally and broadcast with the server
    /// marker, even when nobody is connected.
    async fn send_operator_message(&mut self, text: &str) -> Result<()> {
        let message = format!("{SERVER_MESSAGE_PREFIX}{text}");
        console::display(&message).await?;
        let delivered = self.registry.broadcast(&message, None).await;
        debug!(delivered, "operator message broadcast");
        Ok(())
    }

    /// Applies one directive. State checks come before argument checks,
    /// so `#setport` while listening reports the state error regardless
    /// of the argument.
    async fn apply(&mut self, cmd: ServerCommand) -> Result<bool, ChatError> {
        match cmd {
            ServerCommand::Quit => Ok(false),
            ServerCommand::Stop => {
                self.listener.stop();
                console::display("Server has stopped listening for connections.").await?;
                Ok(true)
            }
            ServerCommand::Close => {
                self.listener.stop();
                self.registry.close_all().await;
                console::display("Server has stopped listening for connections.").await?;
                Ok(true)
            }
            ServerCommand::SetPort(arg) => {
                if self.listener.is_listening() {
                    return Err(ChatError::InvalidState(
                        "cannot change the port while the server is listening".into(),
                    ));
                }
                self.port = command::parse_port(arg.as_deref())?;
                console::display(&format!("Port set to {}", self.port)).await?;
                Ok(true)
            }
            ServerCommand::Start => {
                if self.listener.is_listening() {
                    return Err(ChatError::InvalidState(
                        "server is already listening for clients".into(),
                    ));
                }
                self.start_listening().await?;
                Ok(true)
            }
            ServerCommand::GetPort => {
                console::display(&format!("Current port: {}", self.port)).await?;
                Ok(true)
            }
        }
    }

    async fn handle_event(&mut self, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::Connected(conn) => {
                console::display(&format!("Client {conn} connected to the server")).await?;
            }
            ServerEvent::Disconnected { conn, cause } => {
                debug!(?cause, "connection ended");
                console::display(&format!("Client {conn} disconnected from the server")).await?;
            }
            ServerEvent::Message { conn, text } => {
                self.route_client_message(conn, text).await?;
            }
            ServerEvent::AcceptFailed(error) => {
                console::display(&format!("ERROR - stopped listening for clients: {error}"))
                    .await?;
            }
        }
        Ok(())
    }

    /// Routing policy: display, then echo to every connection including
    /// the sender. The `#login` handshake is the one exception; it binds
    /// the sender's id instead of being broadcast.
    async fn route_client_message(&mut self, conn: Arc<Connection>, text: String) -> Result<()> {
        console::display(&format!("Message received: {text} from {conn}")).await?;
        if let Some(login_id) = login_argument(&text) {
            self.bind_login(&conn, login_id).await?;
            return Ok(());
        }
        self.registry.broadcast(&text, None).await;
        Ok(())
    }

    async fn bind_login(&mut self, conn: &Arc<Connection>, login_id: &str) -> Result<()> {
        if login_id.is_empty() {
            warn!(%conn, "login handshake without an id");
            if let Err(error) = conn.send("ERROR - login id missing.").await {
                debug!(?error, "could not notify client about missing login id");
            }
            return Ok(());
        }
        if conn.bind_login(login_id) {
            console::display(&format!("{login_id} has logged on.")).await?;
        } else {
            warn!(%conn, "rejected repeat login");
            if let Err(error) = conn.send("ERROR - login can only be set once.").await {
                debug!(?error, "could not notify client about rejected login");
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        info!("server shutting down");
        self.listener.stop();
        self.registry.close_all().await;
    }
}

/// Extracts the id from a `#login <id>` handshake line, or `None` when
/// the line is ordinary chat.
fn login_argument(text: &str) -> Option<&str> {
    let rest = text.strip_prefix(LOGIN_DIRECTIVE)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.starts_with(char::is_whitespace).then(|| rest.trim())
}
