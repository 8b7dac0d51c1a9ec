//! Weir CLI - collect logs and serve them over HTTP.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Weir - a small log-collection server.
#[derive(Parser)]
#[command(name = "weir")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the weir API server
    Serve {
        /// Listen address
        #[arg(short = 'l', long)]
        listen_addr: Option<String>,

        /// Listen port
        #[arg(short, long)]
        port: Option<u16>,

        /// Config file path
        #[arg(short = 'C', long)]
        config: Option<PathBuf>,

        /// Read logs from stdin. If this flag is specified, --config is
        /// ignored
        #[arg(short, long)]
        stdin: bool,
    },

    /// Collect a collection and dump its records in the terminal
    Collect {
        /// Collection name
        name: String,

        /// Follow output
        #[arg(short, long)]
        follow: bool,

        /// Read history from this RFC3339 instant (default: one hour ago)
        #[arg(short = 'S', long)]
        since: Option<String>,

        /// Config file path
        #[arg(short = 'C', long)]
        config: Option<PathBuf>,
    },
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Respect RUST_LOG if set
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| filter.to_string());
    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        builder.pretty().with_writer(std::io::stderr).init();
    } else {
        builder.compact().with_writer(std::io::stderr).init();
    }
}

fn default_listen_addr() -> String {
    std::env::var("WEIR_LISTEN_ADDR").unwrap_or_else(|_| "localhost".to_string())
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080)
}

fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("WEIR_CONFIG") {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("weir")
        .join("config.toml")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Serve {
            listen_addr,
            port,
            config,
            stdin,
        } => {
            commands::serve::run(
                &listen_addr.unwrap_or_else(default_listen_addr),
                port.unwrap_or_else(default_port),
                &config.unwrap_or_else(default_config_path),
                stdin,
            )
            .await
        }
        Commands::Collect {
            name,
            follow,
            since,
            config,
        } => {
            commands::collect::run(
                &name,
                follow,
                since.as_deref(),
                &config.unwrap_or_else(default_config_path),
            )
            .await
        }
    }
}
