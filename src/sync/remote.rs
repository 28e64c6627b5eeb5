//! Remote object storage behind the [`Remote`] capability.
//!
//! Keys are `/`-separated relative paths such as `xcpc/finals/contest.json`.
//! [`DirRemote`] maps them onto a shared directory; object-store backends
//! plug in through the same trait.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use async_trait::async_trait;

use super::SyncError;
use crate::utils::hash::ContentHash;

/// What a metadata probe reports about one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub size: u64,
    /// Opaque content tag; equal tags mean equal content.
    pub etag: String,
}

#[async_trait]
pub trait Remote: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncError>;

    /// Create or overwrite `key`.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), SyncError>;

    /// Metadata of `key` without transferring the body.
    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, SyncError>;
}

/// A remote backed by a (possibly shared or mounted) directory.
#[derive(Debug, Clone)]
pub struct DirRemote {
    root: PathBuf,
}

impl DirRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf, SyncError> {
        let valid = !key.is_empty()
            && key
                .split('/')
                .all(|segment| !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\'));
        if !valid {
            return Err(SyncError::InvalidKey(key.to_string()));
        }
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn remote_err(key: &str, source: io::Error) -> SyncError {
        SyncError::Remote {
            key: key.to_string(),
            source,
        }
    }
}

#[async_trait]
impl Remote for DirRemote {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncError> {
        let path = self.path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::remote_err(key, err)),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), SyncError> {
        let path = self.path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| Self::remote_err(key, err))?;
        }

        // readers never see a half-written object
        let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        let written = match tokio::fs::write(&tmp, bytes).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(err) => Err(err),
        };
        if written.is_err() {
            tokio::fs::remove_file(&tmp).await.ok();
        }
        written.map_err(|err| Self::remote_err(key, err))?;

        crate::debug!("sync"; "put {} ({})", key, crate::utils::fmt::bytes(bytes.len() as u64));
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMeta>, SyncError> {
        // a directory has no cheaper content tag than hashing the file
        Ok(self.get(key).await?.map(|bytes| ObjectMeta {
            size: bytes.len() as u64,
            etag: ContentHash::of(&bytes).to_hex(),
        }))
    }
}
