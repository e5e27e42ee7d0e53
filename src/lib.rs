//! Console-driven broadcast chat: a server that relays every client
//! message to all connected clients, and the matching console client.
//!
//! The classic one-thread-per-socket design maps onto Tokio tasks: one
//! task reads the console, the server's listener runs an accept task,
//! and every open connection drives its own receive loop. The pieces:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`command`] recognizes `#`-prefixed console directives.
//! - [`connection`] owns one socket, its send path, and its receive loop.
//! - [`registry`] tracks live connections and fans broadcasts out to a
//!   snapshot, isolating per-member send failures.
//! - [`listener`] accepts sockets and raises lifecycle events to the server.
//! - [`server`] applies operator directives and the echo-broadcast routing
//!   policy (a sender receives its own message back).
//! - [`client`] relays console input and displays inbound chat.
//! - [`console`] is the shared display path and console input task.
//! - [`wire`] frames messages as newline-delimited UTF-8 text.
//!
//! Integration tests exercise the listener and registry over real
//! sockets; an end-to-end test drives the compiled binary.

pub mod cli;
pub mod client;
pub mod command;
pub mod connection;
pub mod console;
pub mod error;
pub mod listener;
pub mod registry;
pub mod server;
pub mod wire;
