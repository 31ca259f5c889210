use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use tictactoe_sync::config::{Privacy, Settings};
use tictactoe_sync::opponent::Difficulty;
use tictactoe_sync::remote::RemoteStore;
use tictactoe_sync::session::{Mode, SessionOptions};
use tictactoe_sync::store::MemoryStore;
use tictactoe_sync::{server, term};

#[derive(Parser)]
#[command(name = "tictactoe-sync", about = "Tic-tac-toe against the computer or a friend")]
struct Cli {
    /// Path to a RON settings file
    #[arg(short, long, env = "TICTACTOE_CONFIG")]
    config: Option<PathBuf>,

    /// Board width and height, overriding the settings file
    #[arg(short, long)]
    grid_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play against the computer
    Offline {
        #[arg(short, long, value_parser = parse_difficulty)]
        difficulty: Option<Difficulty>,
    },
    /// Host the shared game store
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "TICTACTOE_SERVER")]
        addr: Option<String>,
    },
    /// Play another person through a game store
    Online {
        /// Game store address
        #[arg(short, long, env = "TICTACTOE_SERVER")]
        server: Option<String>,

        /// `mode=queue`, `mode=private` or `mode=code&gameId=<code>`
        params: String,
    },
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    s.parse()
        .map_err(|_| format!("unknown difficulty `{s}`, expected easy or hard"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Command::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = match cli.config {
        Some(ref path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(grid_size) = cli.grid_size {
        settings.grid_size = grid_size;
    }
    tracing::debug!(?settings, "loaded settings");

    match cli.command {
        Command::Offline { difficulty } => {
            let difficulty = difficulty.unwrap_or(settings.difficulty);
            term::play_offline(&settings, difficulty).await
        }
        Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| settings.server_addr.clone());
            let listener = TcpListener::bind(&addr).await?;
            server::run(listener, Arc::new(MemoryStore::new())).await
        }
        Command::Online { server, params } => {
            let mode = Mode::from_query(&params)?;
            let addr = server.unwrap_or_else(|| settings.server_addr.clone());
            let config = settings.game_config(Privacy::Public)?;
            let store = Arc::new(RemoteStore::new(addr));
            term::play_online(store, mode, config, SessionOptions::from(&settings)).await
        }
    }
}
