//! tilesync CLI
//!
//! Offline tools for a tilesync storage root. The storage root must not be
//! in use by a running server.
//!
//! # Commands
//!
//! - `inspect` - Display tile counts and age range
//! - `tile` - Show the stored header of one tile
//! - `delete` - Delete one tile
//! - `verify` - Scan for unreadable records and leftovers
//! - `reindex` - Rebuild the index, removing interrupted writes
//! - `config` - Print the effective server configuration

mod commands;

use clap::{Parser, Subcommand};
use commands::{OutputFormat, TileArgs};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// tilesync storage maintenance tools.
#[derive(Parser)]
#[command(name = "tilesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the storage root
    #[arg(global = true, short, long)]
    root: Option<PathBuf>,

    /// Server configuration file (JSON)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display tile counts per dimension and the age range
    Inspect,

    /// Show the stored header of one tile
    #[command(allow_negative_numbers = true)]
    Tile(TileArgs),

    /// Delete one tile from storage
    #[command(allow_negative_numbers = true)]
    Delete(TileArgs),

    /// Verify that every stored record is readable
    Verify,

    /// Rebuild the index and remove leftovers of interrupted writes
    Reindex,

    /// Print the effective server configuration
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect => {
            let root = cli.root.ok_or("Storage root required for inspect")?;
            commands::inspect::run(&root, config, cli.format)?;
        }
        Commands::Tile(args) => {
            let root = cli.root.ok_or("Storage root required for tile")?;
            commands::tile::run(&root, config, &args, cli.format)?;
        }
        Commands::Delete(args) => {
            let root = cli.root.ok_or("Storage root required for delete")?;
            commands::tile::delete(&root, config, &args, cli.format)?;
        }
        Commands::Verify => {
            let root = cli.root.ok_or("Storage root required for verify")?;
            commands::verify::run(&root, cli.format)?;
        }
        Commands::Reindex => {
            let root = cli.root.ok_or("Storage root required for reindex")?;
            commands::verify::reindex(&root, cli.format)?;
        }
        Commands::Config => {
            commands::print_json(&config)?;
        }
    }

    Ok(())
}
