//! Verify and reindex command implementations.

use super::{print_json, CommandResult, OutputFormat};
use serde::Serialize;
use std::path::Path;
use tilesync_storage::{FileTileStore, TileStore, VerifyReport};

/// Verification result.
#[derive(Debug, Serialize)]
pub struct VerifyResult {
    /// Number of readable tile records.
    pub tiles: usize,
    /// Leftovers of interrupted writes.
    pub temp_files: usize,
    /// Entries an index rebuild would skip, with the reason.
    pub problems: Vec<String>,
}

impl From<VerifyReport> for VerifyResult {
    fn from(report: VerifyReport) -> Self {
        Self {
            tiles: report.tiles,
            temp_files: report.temp_files,
            problems: report
                .problems
                .into_iter()
                .map(|p| format!("{}: {}", p.path.display(), p.reason))
                .collect(),
        }
    }
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.problems.is_empty() && self.temp_files == 0
    }
}

fn open_store(root: &Path) -> CommandResult<FileTileStore> {
    if !root.is_dir() {
        return Err(format!("No storage root found at {}", root.display()).into());
    }
    Ok(FileTileStore::open(root)?)
}

/// Runs the verify command.
pub fn run(root: &Path, format: OutputFormat) -> CommandResult<()> {
    let store = open_store(root)?;
    let result = VerifyResult::from(store.verify()?);

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            println!("Verifying storage at {}", root.display());
            println!();
            println!("Readable tiles: {}", result.tiles);
            println!("Interrupted writes: {}", result.temp_files);
            for problem in &result.problems {
                println!("  {problem}");
            }
            println!();
        }
    }

    if result.is_ok() {
        if format == OutputFormat::Text {
            println!("✓ Storage verification passed");
        }
        Ok(())
    } else {
        if format == OutputFormat::Text {
            println!("✗ Storage verification failed");
        }
        Err("Verification failed".into())
    }
}

/// Reindex command result.
#[derive(Debug, Serialize)]
struct ReindexResult {
    tiles: usize,
    temp_files_removed: usize,
    skipped: usize,
}

/// Runs the reindex command.
pub fn reindex(root: &Path, format: OutputFormat) -> CommandResult<()> {
    let store = open_store(root)?;
    let before = store.verify()?;
    let index = store.rebuild_index()?;
    let result = ReindexResult {
        tiles: index.len(),
        temp_files_removed: before.temp_files,
        skipped: before.problems.len(),
    };

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => {
            println!("Indexed tiles: {}", result.tiles);
            println!("Removed interrupted writes: {}", result.temp_files_removed);
            println!("Skipped entries: {}", result.skipped);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilesync_testkit::tile;
    use uuid::Uuid;

    #[test]
    fn clean_store_passes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileTileStore::open(dir.path()).unwrap();
            store.write(&tile(0, 0), Uuid::nil(), 1_400_000_000_000, b"x").unwrap();
        }
        run(dir.path(), OutputFormat::Json).unwrap();
    }

    #[test]
    fn leftovers_fail_until_reindexed() {
        let dir = tempfile::tempdir().unwrap();
        let tmp = {
            let store = FileTileStore::open(dir.path()).unwrap();
            store.write(&tile(0, 0), Uuid::nil(), 1_400_000_000_000, b"x").unwrap();
            store.dimension_dir(&tile(0, 0).dimension).join(".1_1.bin.tmp")
        };
        std::fs::write(&tmp, b"partial").unwrap();

        assert!(run(dir.path(), OutputFormat::Json).is_err());
        reindex(dir.path(), OutputFormat::Json).unwrap();
        assert!(!tmp.exists());
        run(dir.path(), OutputFormat::Json).unwrap();
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&dir.path().join("absent"), OutputFormat::Text).is_err());
    }
}
