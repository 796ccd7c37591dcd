//! Inspect command implementation.

use super::{open_server, print_json, CommandResult, OutputFormat};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tilesync_server::{ServerConfig, SyncServer};

/// Storage inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Storage root.
    pub root: String,
    /// Number of indexed tiles.
    pub tiles: usize,
    /// Tiles per dimension.
    pub tiles_by_dimension: BTreeMap<String, usize>,
    /// Oldest stored timestamp (ms since epoch).
    pub oldest: Option<i64>,
    /// Newest stored timestamp (ms since epoch).
    pub newest: Option<i64>,
}

/// Runs the inspect command.
pub fn run(root: &Path, config: ServerConfig, format: OutputFormat) -> CommandResult<()> {
    let server = open_server(root, config)?;
    let result = collect(root, &server);

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

fn collect(root: &Path, server: &SyncServer) -> InspectResult {
    let status = server.status();
    let stats = server.registry_stats();
    InspectResult {
        root: root.display().to_string(),
        tiles: stats.size,
        tiles_by_dimension: status.tiles_by_dimension,
        oldest: stats.oldest,
        newest: stats.newest,
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Storage root: {}", result.root);
    println!("Tiles: {}", result.tiles);
    for (dimension, count) in &result.tiles_by_dimension {
        println!("  {dimension:<32} {count}");
    }
    if let (Some(oldest), Some(newest)) = (result.oldest, result.newest) {
        println!("Oldest: {oldest}");
        println!("Newest: {newest}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilesync_storage::TileStore;
    use tilesync_testkit::{nether_tile, tile};
    use uuid::Uuid;

    #[test]
    fn counts_per_dimension() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = tilesync_storage::FileTileStore::open(dir.path()).unwrap();
            store.write(&tile(0, 0), Uuid::nil(), 1_400_000_000_000, b"a").unwrap();
            store.write(&tile(0, 1), Uuid::nil(), 1_500_000_000_000, b"b").unwrap();
            store.write(&nether_tile(0, 0), Uuid::nil(), 1_450_000_000_000, b"c").unwrap();
        }

        let server = open_server(dir.path(), ServerConfig::default()).unwrap();
        let result = collect(dir.path(), &server);
        assert_eq!(result.tiles, 3);
        assert_eq!(result.tiles_by_dimension["minecraft:overworld"], 2);
        assert_eq!(result.tiles_by_dimension["minecraft:the_nether"], 1);
        assert_eq!(result.oldest, Some(1_400_000_000_000));
        assert_eq!(result.newest, Some(1_500_000_000_000));
    }
}
