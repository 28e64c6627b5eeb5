//! On-disk response cache keyed by URL.
//!
//! Each entry lives at `{dir}/{blake3(url)}`. Writes go through a temporary
//! file and a rename, so concurrent writers of the same URL leave one
//! complete entry behind (last write wins).

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use crate::utils::{fs::write_atomic, hash::ContentHash};

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(ContentHash::of(url).to_hex())
    }

    /// Cached body for `url`, if any.
    ///
    /// Unreadable entries are treated as misses.
    pub fn get(&self, url: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(url);
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                crate::debug!("cache"; "ignoring unreadable entry {}: {}", path.display(), err);
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, url: &str) -> bool {
        self.entry_path(url).is_file()
    }

    pub fn put(&self, url: &str, bytes: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        write_atomic(&self.entry_path(url), bytes)?;

        crate::debug!("cache"; "stored {} ({})", url, crate::utils::fmt::bytes(bytes.len() as u64));
        Ok(())
    }
}
