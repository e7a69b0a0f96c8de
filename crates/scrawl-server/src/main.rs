mod connection;
mod handler;
mod registry;
mod room;
mod round;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use scrawl_common::words::WordBank;

/// Scrawl server - multiplayer drawing-and-guessing game server
#[derive(Parser, Debug)]
#[command(name = "scrawl-server", version, about)]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:4000")]
    bind: String,

    /// Maximum simultaneous connections allowed
    #[arg(short, long, default_value_t = 100)]
    max_connections: usize,

    /// Word-list file: one candidate word per line
    #[arg(short, long, default_value = "words.txt")]
    words: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scrawl_server=debug,scrawl_common=debug".into()),
        )
        .init();

    let args = Args::parse();

    let addr: SocketAddr = args.bind.parse()?;

    let words = WordBank::load(&args.words)
        .with_context(|| format!("loading word list from {}", args.words.display()))?;
    tracing::info!("Loaded {} words from {}", words.len(), args.words.display());

    tracing::info!(
        "Starting scrawl server on {} (max {} connections)",
        addr,
        args.max_connections
    );
    server::run(addr, args.max_connections, words).await
}
