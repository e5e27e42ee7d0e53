use clap::{Args, Parser, Subcommand};

/// Default port shared by the server and client.
pub const DEFAULT_PORT: u16 = 5555;

/// Default host the client dials.
pub const DEFAULT_HOST: &str = "localhost";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the chat server, rebroadcasting every client message.
    Server(ServerArgs),
    /// Connect to a server and relay console input as chat.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Port to listen on. Missing or malformed values fall back to 5555.
    pub port: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Port to connect on. Missing or malformed values fall back to 5555.
    pub port: Option<String>,

    /// Host the server runs on.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Login id announced to the server on connect.
    #[arg(long, default_value = "guest")]
    pub login: String,
}

/// Resolves the optional console port argument, falling back to the
/// shared default when it is absent or unparseable.
pub fn resolve_port(arg: Option<&str>) -> u16 {
    arg.and_then(|raw| raw.parse().ok()).unwrap_or(DEFAULT_PORT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_when_absent() {
        assert_eq!(resolve_port(None), DEFAULT_PORT);
    }

    #[test]
    fn port_defaults_when_malformed() {
        assert_eq!(resolve_port(Some("not-a-port")), DEFAULT_PORT);
        assert_eq!(resolve_port(Some("99999")), DEFAULT_PORT);
    }

    #[test]
    fn port_parses_when_valid() {
        assert_eq!(resolve_port(Some("6000")), 6000);
    }

    #[test]
    fn cli_parses_both_modes() {
        let cli = Cli::try_parse_from(["chat-relay", "server", "6000"]).expect("server mode");
        match cli.command {
            Command::Server(args) => assert_eq!(args.port.as_deref(), Some("6000")),
            Command::Client(_) => panic!("expected server mode"),
        }

        let cli = Cli::try_parse_from(["chat-relay", "client", "--login", "alice"])
            .expect("client mode");
        match cli.command {
            Command::Client(args) => {
                assert_eq!(args.port, None);
                assert_eq!(args.host, DEFAULT_HOST);
                assert_eq!(args.login, "alice");
            }
            Command::Server(_) => panic!("expected client mode"),
        }
    }
}
