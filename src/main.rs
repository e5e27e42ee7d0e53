use anyhow::Result;
use clap::Parser;
use tracing::info;

use chat_relay::{
    cli::{self, Cli, Command},
    client::Client,
    server::Server,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Server(args) => {
            let port = cli::resolve_port(args.port.as_deref());
            info!(port, "starting server");
            Server::new(port).run().await
        }
        Command::Client(args) => {
            let port = cli::resolve_port(args.port.as_deref());
            info!(host = %args.host, port, login = %args.login, "starting client");
            Client::new(args.host, port, args.login).run().await
        }
    }
}
