//! Console input and display path shared by both interpreters.
//!
//! User-facing output is deliberately separate from tracing: notices land
//! on stdout behind the `> ` marker, diagnostics go to stderr. Input is
//! read on its own task so the interpreter loops can select over console
//! lines and connection events without cancelling a partial read.

use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing::warn;

/// Displays one notice on the operator/user console.
pub async fn display(text: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(b"> ").await?;
    stdout.write_all(text.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

/// Spawns the console input loop. Each line arrives with its trailing
/// newline trimmed; the channel closes when the console does.
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut stdin = BufReader::new(io::stdin());
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim_end_matches(['\r', '\n']).to_string();
                    if tx.send(trimmed).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    warn!(?error, "error reading from console");
                    break;
                }
            }
        }
    });
    rx
}
