//! File-based tile store.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/
//!   .lock
//!   minecraft$overworld/
//!     0_0.bin
//!     -3_12.bin
//!   mymod$sky+islands/
//!     ...
//! ```
//!
//! Each `.bin` file is a [`TileMetadata`] header followed by the payload.

use crate::backend::TileStore;
use crate::error::{StorageError, StorageResult};
use crate::record::TileRecord;
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tilesync_core::{DimensionId, TileCoord, TileMetadata};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name of the advisory lock file inside the storage root.
pub const LOCK_FILE_NAME: &str = ".lock";

const TEMP_SUFFIX: &str = ".tmp";

/// A problem found while scanning the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProblem {
    /// File or folder the problem was found at.
    pub path: PathBuf,
    /// Human-readable description.
    pub reason: String,
}

/// Result of [`FileTileStore::verify`].
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Number of readable tile records.
    pub tiles: usize,
    /// Leftover temporary files from interrupted writes.
    pub temp_files: usize,
    /// Entries that would be skipped by an index rebuild.
    pub problems: Vec<ScanProblem>,
}

impl VerifyReport {
    /// Returns true if nothing but readable records was found.
    pub fn is_clean(&self) -> bool {
        self.problems.is_empty() && self.temp_files == 0
    }
}

#[derive(Default)]
struct ScanOutcome {
    index: HashMap<TileCoord, i64>,
    temp_files: usize,
    problems: Vec<ScanProblem>,
}

/// A tile store backed by one file per tile.
///
/// # Durability
///
/// Writes go to a hidden temporary file in the dimension folder, which is
/// synced and then renamed over the target. The folder is synced after the
/// rename on Unix. A crash leaves either the old or the new file, plus at
/// worst a stray temporary file that the next [`TileStore::rebuild_index`]
/// removes.
///
/// # Thread Safety
///
/// Reads share a lock; writes and deletes take it exclusively. Across
/// processes, the root is guarded by an exclusive advisory lock on
/// [`LOCK_FILE_NAME`] held for the lifetime of the store.
///
/// # Example
///
/// ```no_run
/// use tilesync_core::{DimensionId, TileCoord};
/// use tilesync_storage::{FileTileStore, TileStore};
/// use std::path::Path;
/// use uuid::Uuid;
///
/// let store = FileTileStore::open(Path::new("tiles")).unwrap();
/// let coord = TileCoord::new(DimensionId::minecraft("overworld").unwrap(), 0, 0);
/// store.write(&coord, Uuid::new_v4(), 1_700_000_000_000, b"tile").unwrap();
/// ```
#[derive(Debug)]
pub struct FileTileStore {
    root: PathBuf,
    lock: RwLock<()>,
    lock_file: File,
}

impl FileTileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another process has the root open,
    /// or an I/O error if the directory or lock file cannot be created.
    pub fn open(root: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(root.join(LOCK_FILE_NAME))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StorageError::Locked(root.to_path_buf()))?;

        info!(root = %root.display(), "opened tile store");
        Ok(Self {
            root: root.to_path_buf(),
            lock: RwLock::new(()),
            lock_file,
        })
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the folder holding tiles of `dimension`.
    pub fn dimension_dir(&self, dimension: &DimensionId) -> PathBuf {
        self.root.join(dimension.to_fs_name())
    }

    /// Returns the file path of a tile.
    pub fn tile_path(&self, coord: &TileCoord) -> PathBuf {
        self.dimension_dir(&coord.dimension).join(coord.file_name())
    }

    fn temp_path(&self, coord: &TileCoord) -> PathBuf {
        self.dimension_dir(&coord.dimension)
            .join(format!(".{}{TEMP_SUFFIX}", coord.file_name()))
    }

    /// Scans the store without modifying it.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be listed.
    pub fn verify(&self) -> StorageResult<VerifyReport> {
        let _guard = self.lock.read();
        let outcome = self.scan(false)?;
        Ok(VerifyReport {
            tiles: outcome.index.len(),
            temp_files: outcome.temp_files,
            problems: outcome.problems,
        })
    }

    fn scan(&self, remove_temp: bool) -> StorageResult<ScanOutcome> {
        let mut outcome = ScanOutcome::default();

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(outcome),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let path = entry.path();
            let Some(dimension) = entry
                .file_name()
                .to_str()
                .and_then(DimensionId::from_fs_name)
            else {
                outcome.problems.push(ScanProblem {
                    path,
                    reason: "folder name is not a dimension".into(),
                });
                continue;
            };

            if let Err(e) = self.scan_dimension(&path, &dimension, remove_temp, &mut outcome) {
                outcome.problems.push(ScanProblem {
                    path,
                    reason: e.to_string(),
                });
            }
        }

        Ok(outcome)
    }

    fn scan_dimension(
        &self,
        dir: &Path,
        dimension: &DimensionId,
        remove_temp: bool,
        outcome: &mut ScanOutcome,
    ) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                outcome.problems.push(ScanProblem {
                    path,
                    reason: "file name is not UTF-8".into(),
                });
                continue;
            };

            if name.starts_with('.') && name.ends_with(TEMP_SUFFIX) {
                outcome.temp_files += 1;
                if remove_temp {
                    match fs::remove_file(&path) {
                        Ok(()) => debug!(path = %path.display(), "removed stale temp file"),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "failed to remove temp file")
                        }
                    }
                }
                continue;
            }

            let Some(coord) = TileCoord::from_file_name(dimension.clone(), name) else {
                outcome.problems.push(ScanProblem {
                    path,
                    reason: "file name is not a tile coordinate".into(),
                });
                continue;
            };
            // Only the canonical spelling is readable through `tile_path`.
            if self.tile_path(&coord) != path {
                outcome.problems.push(ScanProblem {
                    path,
                    reason: format!("not at the canonical path for {coord}"),
                });
                continue;
            }

            match read_header(&path) {
                Ok(metadata) => {
                    outcome.index.insert(coord, metadata.timestamp);
                }
                Err(e) => outcome.problems.push(ScanProblem {
                    path,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(())
    }
}

fn read_header(path: &Path) -> StorageResult<TileMetadata> {
    let mut file = File::open(path)?;
    TileMetadata::read_from(&mut file).map_err(|source| StorageError::Corrupted {
        path: path.to_path_buf(),
        source,
    })
}

fn write_atomically(
    dir: &Path,
    temp: &Path,
    target: &Path,
    header: &[u8],
    payload: &[u8],
) -> io::Result<()> {
    let mut file = File::create(temp)?;
    file.write_all(header)?;
    file.write_all(payload)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp, target)?;
    sync_dir(dir)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

impl TileStore for FileTileStore {
    fn exists(&self, coord: &TileCoord) -> bool {
        let _guard = self.lock.read();
        self.tile_path(coord).is_file()
    }

    fn read_metadata(&self, coord: &TileCoord) -> StorageResult<Option<TileMetadata>> {
        let _guard = self.lock.read();
        let path = self.tile_path(coord);
        match read_header(&path) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(StorageError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                warn!(%coord, error = %e, "failed to read tile metadata");
                Err(e)
            }
        }
    }

    fn read_record(&self, coord: &TileCoord) -> StorageResult<Option<TileRecord>> {
        let _guard = self.lock.read();
        let path = self.tile_path(coord);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(%coord, error = %e, "failed to read tile");
                return Err(e.into());
            }
        };
        TileRecord::decode(&data)
            .map(Some)
            .map_err(|source| StorageError::Corrupted { path, source })
    }

    fn write(
        &self,
        coord: &TileCoord,
        contributor: Uuid,
        timestamp: i64,
        payload: &[u8],
    ) -> StorageResult<()> {
        let _guard = self.lock.write();
        let dir = self.dimension_dir(&coord.dimension);
        let temp = self.temp_path(coord);
        let target = self.tile_path(coord);

        fs::create_dir_all(&dir)?;

        let header = TileMetadata::new(contributor, timestamp).encode();
        if let Err(e) = write_atomically(&dir, &temp, &target, &header, payload) {
            let _ = fs::remove_file(&temp);
            warn!(%coord, error = %e, "failed to write tile");
            return Err(e.into());
        }

        debug!(%coord, timestamp, bytes = payload.len(), "wrote tile");
        Ok(())
    }

    fn delete(&self, coord: &TileCoord) -> StorageResult<bool> {
        let _guard = self.lock.write();
        match fs::remove_file(self.tile_path(coord)) {
            Ok(()) => {
                debug!(%coord, "deleted tile");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn rebuild_index(&self) -> StorageResult<HashMap<TileCoord, i64>> {
        let _guard = self.lock.write();
        let outcome = self.scan(true)?;
        for problem in &outcome.problems {
            warn!(path = %problem.path.display(), reason = %problem.reason, "skipped entry");
        }
        info!(
            tiles = outcome.index.len(),
            skipped = outcome.problems.len(),
            "rebuilt tile index"
        );
        Ok(outcome.index)
    }
}

impl Drop for FileTileStore {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn overworld(x: i32, z: i32) -> TileCoord {
        TileCoord::new(DimensionId::minecraft("overworld").unwrap(), x, z)
    }

    #[test]
    fn write_then_read() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(dir.path()).unwrap();
        let contributor = Uuid::new_v4();
        let coord = overworld(3, -4);

        store.write(&coord, contributor, 1_700_000_000_000, b"tile bytes").unwrap();

        assert!(store.exists(&coord));
        let record = store.read_record(&coord).unwrap().unwrap();
        assert_eq!(record.metadata.contributor, contributor);
        assert_eq!(record.metadata.timestamp, 1_700_000_000_000);
        assert_eq!(record.payload, b"tile bytes");

        let meta = store.read_metadata(&coord).unwrap().unwrap();
        assert_eq!(meta, record.metadata);
    }

    #[test]
    fn file_layout() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(dir.path()).unwrap();
        let coord = TileCoord::new(DimensionId::new("mymod", "sky/islands").unwrap(), -1, 2);
        store.write(&coord, Uuid::nil(), 5, b"").unwrap();

        let expected = dir.path().join("mymod$sky+islands").join("-1_2.bin");
        assert!(expected.is_file());
        assert_eq!(fs::read(expected).unwrap().len(), tilesync_core::HEADER_SIZE);
    }

    #[test]
    fn missing_tile_is_none() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(dir.path()).unwrap();
        let coord = overworld(0, 0);

        assert!(!store.exists(&coord));
        assert!(store.read_metadata(&coord).unwrap().is_none());
        assert!(store.read_record(&coord).unwrap().is_none());
        assert!(!store.delete(&coord).unwrap());
    }

    #[test]
    fn overwrite_replaces_record() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(dir.path()).unwrap();
        let coord = overworld(1, 1);

        store.write(&coord, Uuid::nil(), 1, b"old payload").unwrap();
        store.write(&coord, Uuid::nil(), 2, b"new").unwrap();

        let record = store.read_record(&coord).unwrap().unwrap();
        assert_eq!(record.metadata.timestamp, 2);
        assert_eq!(record.payload, b"new");
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(dir.path()).unwrap();
        let coord = overworld(7, 7);
        store.write(&coord, Uuid::nil(), 1, b"x").unwrap();

        assert!(store.delete(&coord).unwrap());
        assert!(!store.exists(&coord));
        assert!(!store.tile_path(&coord).exists());
    }

    #[test]
    fn rebuild_index_reads_headers() {
        let dir = tempdir().unwrap();
        let nether = DimensionId::minecraft("the_nether").unwrap();
        {
            let store = FileTileStore::open(dir.path()).unwrap();
            store.write(&overworld(0, 0), Uuid::nil(), 100, b"a").unwrap();
            store.write(&overworld(-5, 9), Uuid::nil(), 200, b"b").unwrap();
            store
                .write(&TileCoord::new(nether.clone(), 1, 1), Uuid::nil(), 300, b"c")
                .unwrap();
        }

        let store = FileTileStore::open(dir.path()).unwrap();
        let index = store.rebuild_index().unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index[&overworld(0, 0)], 100);
        assert_eq!(index[&overworld(-5, 9)], 200);
        assert_eq!(index[&TileCoord::new(nether, 1, 1)], 300);
    }

    #[test]
    fn rebuild_index_skips_bad_entries() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(dir.path()).unwrap();
        store.write(&overworld(0, 0), Uuid::nil(), 100, b"a").unwrap();

        let dim_dir = dir.path().join("minecraft$overworld");
        fs::write(dim_dir.join("1_1.bin"), [0u8, 0, 0]).unwrap();
        fs::write(dim_dir.join("notes.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("Bad:Name")).unwrap();
        fs::write(dir.path().join("stray.bin"), b"ignored").unwrap();

        let mut bad_version = TileMetadata::new(Uuid::nil(), 1).encode();
        bad_version[3] = 9;
        fs::write(dim_dir.join("2_2.bin"), bad_version).unwrap();

        let index = store.rebuild_index().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[&overworld(0, 0)], 100);

        let report = store.verify().unwrap();
        assert_eq!(report.tiles, 1);
        assert_eq!(report.problems.len(), 4);
        assert!(!report.is_clean());
    }

    fn record_bytes(timestamp: i64) -> Vec<u8> {
        let mut data = TileMetadata::new(Uuid::nil(), timestamp).encode().to_vec();
        data.extend_from_slice(b"p");
        data
    }

    #[test]
    fn legacy_folder_is_reported_not_indexed() {
        let dir = tempdir().unwrap();
        let legacy = dir.path().join("overworld");
        fs::create_dir(&legacy).unwrap();
        fs::write(legacy.join("4_5.bin"), record_bytes(42)).unwrap();

        let store = FileTileStore::open(dir.path()).unwrap();
        let index = store.rebuild_index().unwrap();
        assert!(!index.contains_key(&overworld(4, 5)));
        assert!(store.read_record(&overworld(4, 5)).unwrap().is_none());

        let report = store.verify().unwrap();
        assert_eq!(report.tiles, 0);
        assert_eq!(report.problems.len(), 1);
        assert_eq!(report.problems[0].path, legacy.join("4_5.bin"));
    }

    #[test]
    fn non_canonical_file_names_are_not_indexed() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(dir.path()).unwrap();
        store.write(&overworld(7, 5), Uuid::nil(), 10, b"a").unwrap();

        let dim_dir = dir.path().join("minecraft$overworld");
        fs::write(dim_dir.join("+7_05.bin"), record_bytes(99)).unwrap();
        fs::write(dim_dir.join("007_5.bin"), record_bytes(99)).unwrap();

        let index = store.rebuild_index().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index[&overworld(7, 5)], 10);

        let report = store.verify().unwrap();
        assert_eq!(report.problems.len(), 2);
        assert!(report.problems.iter().all(|p| p.reason.contains("canonical path")));
    }

    #[test]
    fn rebuild_removes_stale_temp_files() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(dir.path()).unwrap();
        store.write(&overworld(0, 0), Uuid::nil(), 1, b"a").unwrap();

        let temp = dir.path().join("minecraft$overworld").join(".3_3.bin.tmp");
        fs::write(&temp, b"partial").unwrap();

        let report = store.verify().unwrap();
        assert_eq!(report.temp_files, 1);
        assert!(temp.exists());

        let index = store.rebuild_index().unwrap();
        assert_eq!(index.len(), 1);
        assert!(!temp.exists());
        assert!(store.verify().unwrap().is_clean());
    }

    #[test]
    fn corrupt_record_reports_corruption() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(dir.path()).unwrap();
        let coord = overworld(0, 0);
        fs::create_dir_all(store.dimension_dir(&coord.dimension)).unwrap();
        fs::write(store.tile_path(&coord), b"short").unwrap();

        assert!(store.read_metadata(&coord).unwrap_err().is_corruption());
        assert!(store.read_record(&coord).unwrap_err().is_corruption());
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _store = FileTileStore::open(dir.path()).unwrap();

        let err = FileTileStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Locked(_)));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        drop(FileTileStore::open(dir.path()).unwrap());
        assert!(FileTileStore::open(dir.path()).is_ok());
    }

    #[test]
    fn empty_root_rebuilds_empty() {
        let dir = tempdir().unwrap();
        let store = FileTileStore::open(&dir.path().join("nested/root")).unwrap();
        assert!(store.rebuild_index().unwrap().is_empty());
    }
}
