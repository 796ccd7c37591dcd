//! CLI command implementations.

pub mod inspect;
pub mod tile;
pub mod verify;

use clap::{Args, ValueEnum};
use serde::Serialize;
use std::error::Error;
use std::path::Path;
use tilesync_core::{DimensionId, TileCoord};
use tilesync_server::{ServerConfig, SyncServer};

/// Result type of every command.
pub type CommandResult<T> = Result<T, Box<dyn Error>>;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// A tile addressed on the command line.
#[derive(Debug, Clone, Args)]
pub struct TileArgs {
    /// Dimension identifier (`namespace:path`; namespace defaults to minecraft)
    pub dimension: String,
    /// Tile x coordinate
    pub x: i32,
    /// Tile z coordinate
    pub z: i32,
}

impl TileArgs {
    /// Parses the addressed coordinate.
    pub fn coord(&self) -> CommandResult<TileCoord> {
        let dimension = DimensionId::parse(&self.dimension)?;
        Ok(TileCoord::new(dimension, self.x, self.z))
    }
}

/// Loads a JSON configuration file, or the defaults.
pub fn load_config(path: Option<&Path>) -> CommandResult<ServerConfig> {
    let Some(path) = path else {
        return Ok(ServerConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read config {}: {e}", path.display()))?;
    let config: ServerConfig = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

/// Opens a server over an existing storage root.
///
/// Refuses to create a missing root.
pub fn open_server(root: &Path, config: ServerConfig) -> CommandResult<SyncServer> {
    if !root.is_dir() {
        return Err(format!("No storage root found at {}", root.display()).into());
    }
    Ok(SyncServer::open(config, root)?)
}

/// Prints a value as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) -> CommandResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_args_default_namespace() {
        let args = TileArgs {
            dimension: "the_end".into(),
            x: -1,
            z: 4,
        };
        let coord = args.coord().unwrap();
        assert_eq!(coord.dimension.to_string(), "minecraft:the_end");
        assert_eq!((coord.x, coord.z), (-1, 4));
    }

    #[test]
    fn bad_dimension_is_an_error() {
        let args = TileArgs {
            dimension: "Bad Name".into(),
            x: 0,
            z: 0,
        };
        assert!(args.coord().is_err());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"max_upload_per_sec": 3}"#).unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.max_upload_per_sec, 3);
        assert_eq!(config.max_download_per_sec, 20);
        assert_eq!(load_config(None).unwrap(), ServerConfig::default());
    }

    #[test]
    fn invalid_config_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.json");
        std::fs::write(&path, r#"{"registry_batch_size": 0}"#).unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn missing_root_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("absent");
        assert!(open_server(&root, ServerConfig::default()).is_err());
        assert!(!root.exists());
    }
}
