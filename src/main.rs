//! Tic-Tac-Toe Relay
//!
//! Pairs two players per room and forwards their messages.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use pico_args::Arguments;
use tracing::{error, info};

use tictactoe::{config::RelayConfig, logging, network::server::RelayServer, VERSION};

const HELP: &str = "\
Run the tic-tac-toe room relay

USAGE:
  tictactoe-relay [OPTIONS]

OPTIONS:
  --bind             IP:PORT   Listen address  [default: env TICTACTOE_BIND, 0.0.0.0:$PORT or 0.0.0.0:8080]
  --max-connections  N         Concurrent connection cap  [default: env TICTACTOE_MAX_CONNECTIONS or 1000]

FLAGS:
  -h, --help                   Print help information

ENVIRONMENT:
  RUST_LOG                     Log filter (e.g. debug, tictactoe=trace)
  (A .env file in the working directory is loaded if present)
";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    let mut config = RelayConfig::from_env()?;
    if let Some(bind) = pargs.opt_value_from_str::<_, SocketAddr>("--bind")? {
        config.bind_addr = bind;
    }
    if let Some(max) = pargs.opt_value_from_str::<_, usize>("--max-connections")? {
        config.max_connections = max;
    }

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        anyhow::bail!("unexpected arguments: {:?}", remaining);
    }

    logging::init("info");
    info!("Tic-Tac-Toe relay v{}", VERSION);

    let server = Arc::new(RelayServer::bind(config).await?);

    let signal_server = server.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_server.shutdown(),
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
    });

    server.run().await?;
    info!("Relay stopped");
    Ok(())
}
