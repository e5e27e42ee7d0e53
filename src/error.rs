//! Error types shared by the server and client command interpreters.

use thiserror::Error;

/// Errors raised by console directives and connection I/O.
///
/// Every variant renders to a one-line notice suitable for the console
/// display path. The interpreters catch all of them; none escapes a
/// command loop.
#[derive(Debug, Error)]
pub enum ChatError {
    /// A directive argument failed to parse, such as a port number.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A directive was issued in a state that forbids it.
    #[error("{0}")]
    InvalidState(String),

    /// A `#`-prefixed line that matches no known directive.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The remote side closed the connection in an orderly fashion.
    #[error("connection closed by peer")]
    PeerClosed,

    /// Transport failure on open, send, receive, or close.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias used throughout the library.
pub type Result<T> = std::result::Result<T, ChatError>;
