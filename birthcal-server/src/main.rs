mod commands;
mod render;
mod routes;
mod server;
mod state;

use std::path::PathBuf;

use anyhow::Result;
use birthcal_core::{AppConfig, SortColumn};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "birthcal", version)]
#[command(about = "Publish your contacts' birthdays as a subscribable iCalendar feed")]
struct Cli {
    /// Config file (default: ~/.config/birthcal/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the feed on localhost and refresh it periodically (default)
    Serve,
    /// Sync once and print upcoming birthdays
    List {
        #[arg(long, value_enum, default_value_t = SortArg::Date)]
        sort: SortArg,

        /// Reverse the order
        #[arg(long)]
        desc: bool,
    },
    /// Sync once and write the feed to stdout
    Sync,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Date,
    Name,
    Age,
}

impl From<SortArg> for SortColumn {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Date => SortColumn::Date,
            SortArg::Name => SortColumn::Name,
            SortArg::Age => SortColumn::Age,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config = AppConfig::load(cli.config.as_deref())?;
    tracing::debug!(config = ?config, "Configuration loaded");

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => commands::serve::run(config).await,
        Commands::List { sort, desc } => commands::list::run(config, sort.into(), desc).await,
        Commands::Sync => commands::sync::run(config).await,
    }
}

/// Logs go to stderr so `birthcal sync` output stays a clean feed.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
