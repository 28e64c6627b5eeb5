//! Local persistence under the data directory.
//!
//! ```text
//! <data>/
//! ├── schema             (SCHEMA_VERSION)
//! ├── config.json        (the contest, without image bytes)
//! ├── blobs/{uuid}       (image bytes)
//! ├── versions/{id}.json
//! └── branches/{id}.json
//! ```
//!
//! A schema mismatch on open recreates the config, version and branch
//! stores. Blobs survive; orphaned ones are tolerated.

pub mod autosave;
pub mod export;
pub mod history;

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::contest::{Contest, DocumentStore, ImageBlobs};
use crate::utils::fs::write_atomic;

pub use history::{Branch, History, Version};

/// Bumped whenever the persisted layout changes incompatibly.
pub const SCHEMA_VERSION: u32 = 3;

const SCHEMA_FILE: &str = "schema";
const CONFIG_FILE: &str = "config.json";
const BLOBS_DIR: &str = "blobs";
pub(crate) const VERSIONS_DIR: &str = "versions";
pub(crate) const BRANCHES_DIR: &str = "branches";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no branch `{0}`")]
    UnknownBranch(String),

    #[error("no version `{0}`")]
    UnknownVersion(String),

    #[error("cannot delete the last branch")]
    LastBranch,

    #[error("invalid export: {0}")]
    InvalidExport(String),

    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Durable store rooted at the data directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open (creating if needed) the store at `dir`, enforcing the schema.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = Self { dir: dir.into() };
        fs::create_dir_all(&store.dir).map_err(|err| StorageError::io(&store.dir, err))?;

        let schema_path = store.dir.join(SCHEMA_FILE);
        let found = fs::read_to_string(&schema_path)
            .ok()
            .and_then(|text| text.trim().parse::<u32>().ok());

        match found {
            Some(SCHEMA_VERSION) => {}
            Some(old) => {
                crate::log!("storage"; "schema {} is outdated (now {}), recreating stores", old, SCHEMA_VERSION);
                store.recreate()?;
            }
            None if store.dir.join(CONFIG_FILE).exists() => {
                crate::log!("storage"; "schema marker missing, recreating stores");
                store.recreate()?;
            }
            None => {}
        }

        for sub in [BLOBS_DIR, VERSIONS_DIR, BRANCHES_DIR] {
            let path = store.dir.join(sub);
            fs::create_dir_all(&path).map_err(|err| StorageError::io(&path, err))?;
        }
        fs::write(&schema_path, SCHEMA_VERSION.to_string())
            .map_err(|err| StorageError::io(&schema_path, err))?;
        Ok(store)
    }

    /// Drop config, versions and branches. Blobs are kept.
    fn recreate(&self) -> Result<(), StorageError> {
        let config = self.dir.join(CONFIG_FILE);
        if config.exists() {
            fs::remove_file(&config).map_err(|err| StorageError::io(&config, err))?;
        }
        for sub in [VERSIONS_DIR, BRANCHES_DIR] {
            let path = self.dir.join(sub);
            if path.exists() {
                fs::remove_dir_all(&path).map_err(|err| StorageError::io(&path, err))?;
            }
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn history(&self) -> History {
        History::new(self.dir.join(VERSIONS_DIR), self.dir.join(BRANCHES_DIR))
    }

    // =========================================================================
    // Document
    // =========================================================================

    /// The persisted contest with byte handles read from the blob store.
    ///
    /// `None` when nothing was saved yet. Images whose blob is missing are
    /// left without bytes (the lint reports them).
    pub fn load_document(&self) -> Result<Option<(Contest, ImageBlobs)>, StorageError> {
        let path = self.dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contest: Contest = read_json(&path)?;
        let blobs = self.blobs_for(&contest);
        Ok(Some((contest, blobs)))
    }

    /// Blobs of every image `contest` lists, skipping missing ones.
    pub fn blobs_for(&self, contest: &Contest) -> ImageBlobs {
        contest
            .images
            .iter()
            .filter_map(|image| match self.blob(&image.uuid) {
                Ok(Some(bytes)) => Some((image.uuid.clone(), bytes)),
                Ok(None) => {
                    crate::log!("storage"; "missing blob for image `{}`", image.name);
                    None
                }
                Err(err) => {
                    crate::log!("storage"; "{:#}", anyhow::Error::from(err));
                    None
                }
            })
            .collect()
    }

    /// Persisted document, or the example contest when there is none or it
    /// cannot be read.
    pub fn restore_or_example(&self) -> DocumentStore {
        match self.load_document() {
            Ok(Some((contest, blobs))) => {
                crate::debug!("storage"; "restored `{}`", contest.meta.title);
                DocumentStore::new(contest, blobs)
            }
            Ok(None) => DocumentStore::example(),
            Err(err) => {
                crate::log!("storage"; "{:#}, starting from the example contest", anyhow::Error::from(err));
                DocumentStore::example()
            }
        }
    }

    /// Persist the contest (stripped of bytes) and any blob not stored yet.
    ///
    /// Returns `false` when nothing changed on disk.
    pub fn save_document(&self, contest: &Contest, blobs: &ImageBlobs) -> Result<bool, StorageError> {
        let mut changed = false;
        for image in &contest.images {
            if let Some(bytes) = blobs.get(&image.uuid) {
                changed |= self.put_blob(&image.uuid, bytes)?;
            }
        }
        changed |= write_json(&self.dir.join(CONFIG_FILE), contest)?;
        Ok(changed)
    }

    // =========================================================================
    // Blobs
    // =========================================================================

    fn blob_path(&self, uuid: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_key(uuid) {
            return Err(StorageError::InvalidKey(uuid.to_string()));
        }
        Ok(self.dir.join(BLOBS_DIR).join(uuid))
    }

    pub fn blob(&self, uuid: &str) -> Result<Option<Arc<[u8]>>, StorageError> {
        let path = self.blob_path(uuid)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(Arc::from(bytes))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(&path, err)),
        }
    }

    /// Store a blob unless it exists. Blobs are immutable per uuid.
    pub fn put_blob(&self, uuid: &str, bytes: &[u8]) -> Result<bool, StorageError> {
        let path = self.blob_path(uuid)?;
        if path.exists() {
            return Ok(false);
        }
        write_atomic(&path, bytes).map_err(|err| StorageError::io(&path, err))?;
        Ok(true)
    }
}

/// Keys become file names: ASCII alphanumerics, `-` and `_` only.
pub(crate) fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Check if file content is the same as new content
fn file_content_matches(path: &Path, content: &str) -> bool {
    path.exists() && fs::read_to_string(path).is_ok_and(|existing| existing == content)
}

/// Write `value` as pretty JSON, skipping identical content.
///
/// Returns whether the file was written.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<bool, StorageError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    if file_content_matches(path, &json) {
        crate::debug!("persist"; "{} unchanged, skipping write", path.display());
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
    }
    write_atomic(path, json.as_bytes()).map_err(|err| StorageError::io(path, err))?;
    Ok(true)
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let json = fs::read_to_string(path).map_err(|err| StorageError::io(path, err))?;
    serde_json::from_str(&json).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contest::example_contest;
    use tempfile::TempDir;

    #[test]
    fn test_fresh_store_has_no_document() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        assert!(store.load_document().unwrap().is_none());
        assert_eq!(
            fs::read_to_string(dir.path().join(SCHEMA_FILE)).unwrap(),
            SCHEMA_VERSION.to_string()
        );
    }

    #[test]
    fn test_save_and_load_derives_bytes_from_blobs() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let (contest, blobs) = example_contest();

        assert!(store.save_document(&contest, &blobs).unwrap());
        let (loaded, loaded_blobs) = store.load_document().unwrap().unwrap();

        assert_eq!(loaded, contest);
        assert_eq!(loaded_blobs, blobs);

        // persisted config carries no bytes
        let config = fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(!config.contains("<svg"));
    }

    #[test]
    fn test_identical_save_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let (contest, blobs) = example_contest();

        assert!(store.save_document(&contest, &blobs).unwrap());
        assert!(!store.save_document(&contest, &blobs).unwrap());
    }

    #[test]
    fn test_schema_mismatch_recreates_stores_but_keeps_blobs() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let (contest, blobs) = example_contest();
        store.save_document(&contest, &blobs).unwrap();
        store.history().ensure_branch().unwrap();

        fs::write(dir.path().join(SCHEMA_FILE), "1").unwrap();
        let reopened = LocalStore::open(dir.path()).unwrap();

        assert!(reopened.load_document().unwrap().is_none());
        assert!(reopened.history().branches().unwrap().is_empty());
        for uuid in blobs.keys() {
            assert!(reopened.blob(uuid).unwrap().is_some());
        }
    }

    #[test]
    fn test_missing_blob_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let (contest, _) = example_contest();

        store.save_document(&contest, &ImageBlobs::default()).unwrap();
        let (_, blobs) = store.load_document().unwrap().unwrap();
        assert!(blobs.is_empty());
    }

    #[test]
    fn test_saves_leave_no_temporary_files() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        let (mut contest, blobs) = example_contest();

        store.save_document(&contest, &blobs).unwrap();
        contest.meta.title = "Renamed".into();
        store.save_document(&contest, &blobs).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
        let (loaded, _) = store.load_document().unwrap().unwrap();
        assert_eq!(loaded.meta.title, "Renamed");
    }

    #[test]
    fn test_corrupt_config_falls_back_to_example() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();

        assert!(matches!(store.load_document(), Err(StorageError::Json { .. })));
        let document = store.restore_or_example();
        assert_eq!(document.contest().meta.title, example_contest().0.meta.title);
    }

    #[test]
    fn test_blob_keys_are_checked() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(dir.path()).unwrap();

        assert!(matches!(
            store.put_blob("../escape", b"x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(store.put_blob("abc-123", b"x").unwrap());
        assert!(!store.put_blob("abc-123", b"y").unwrap());
        assert_eq!(&*store.blob("abc-123").unwrap().unwrap(), b"x");
    }
}
