//! Tile and delete command implementations.

use super::{open_server, print_json, CommandResult, OutputFormat, TileArgs};
use serde::Serialize;
use std::path::Path;
use tilesync_server::{ServerConfig, TileInfo};
use tracing::info;

/// Runs the tile command.
pub fn run(
    root: &Path,
    config: ServerConfig,
    args: &TileArgs,
    format: OutputFormat,
) -> CommandResult<()> {
    let coord = args.coord()?;
    let server = open_server(root, config)?;
    let Some(tile) = server.tile_info(&coord)? else {
        return Err(format!("No tile stored at {coord}").into());
    };

    match format {
        OutputFormat::Json => print_json(&tile)?,
        OutputFormat::Text => print_tile(&tile),
    }
    Ok(())
}

fn print_tile(tile: &TileInfo) {
    println!("Tile: {}", tile.coord);
    println!("Timestamp: {}", tile.timestamp);
    println!("Contributor: {}", tile.contributor);
    println!("Payload: {} bytes", tile.payload_size);
    match tile.registry_timestamp {
        Some(ts) if ts == tile.timestamp => println!("Indexed: yes"),
        Some(ts) => println!("Indexed: at {ts} (differs from header)"),
        None => println!("Indexed: no"),
    }
}

/// Delete command result.
#[derive(Debug, Serialize)]
struct DeleteResult {
    tile: String,
    deleted: bool,
}

/// Runs the delete command.
pub fn delete(
    root: &Path,
    config: ServerConfig,
    args: &TileArgs,
    format: OutputFormat,
) -> CommandResult<()> {
    let coord = args.coord()?;
    let server = open_server(root, config)?;
    let deleted = server.delete_tile(&coord)?;
    if deleted {
        info!(%coord, "deleted from {}", root.display());
    }

    match format {
        OutputFormat::Json => print_json(&DeleteResult {
            tile: coord.to_string(),
            deleted,
        })?,
        OutputFormat::Text if deleted => println!("Deleted {coord}"),
        OutputFormat::Text => println!("Nothing stored at {coord}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilesync_storage::{FileTileStore, TileStore};
    use tilesync_testkit::tile;
    use uuid::Uuid;

    fn args(x: i32, z: i32) -> TileArgs {
        TileArgs {
            dimension: "minecraft:overworld".into(),
            x,
            z,
        }
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileTileStore::open(dir.path()).unwrap();
            store.write(&tile(2, -2), Uuid::nil(), 1_400_000_000_000, b"x").unwrap();
        }

        delete(dir.path(), ServerConfig::default(), &args(2, -2), OutputFormat::Json).unwrap();

        let store = FileTileStore::open(dir.path()).unwrap();
        assert!(!store.exists(&tile(2, -2)));
    }

    #[test]
    fn missing_tile_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(dir.path(), ServerConfig::default(), &args(0, 0), OutputFormat::Text).is_err());
    }
}
