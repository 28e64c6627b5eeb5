//! Push and pull the contest and its history to a [`Remote`].
//!
//! ```text
//! {prefix}/{slug(title)}/
//! ├── contest.json    (the contest, without image bytes)
//! ├── images/{uuid}
//! └── versions.json   ({versions, branches})
//! ```
//!
//! `contest.json` is written last and doubles as the conflict probe: a push
//! is refused while its tag differs from the one recorded at the last sync.
//! A pull gathers everything into a [`Pulled`] before any local state is
//! touched; [`SyncConnector::apply`] commits it.

pub mod merge;
pub mod remote;


use std::{
    collections::BTreeMap,
    io,
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contest::{Contest, DocumentStore, ImageBlobs};
use crate::storage::{Branch, History, StorageError, Version, read_json, write_json};
use crate::utils::slug::slugify;

pub use merge::{Conflict, Decision, MergeReport, MergeSession, ProblemDiff, Resolution};
pub use remote::{DirRemote, Remote};

const CONTEST_OBJECT: &str = "contest.json";
const VERSIONS_OBJECT: &str = "versions.json";
const IMAGES_PREFIX: &str = "images";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote object `{key}` is not accessible")]
    Remote {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("remote object `{key}` is malformed")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid remote key `{0}`")]
    InvalidKey(String),

    #[error("`{0}` changed on the remote since the last sync, pull first")]
    RemoteChanged(String),

    #[error("nothing to pull at `{0}`")]
    NothingToPull(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Body of `versions.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RemoteHistory {
    #[serde(default)]
    versions: Vec<Version>,
    #[serde(default)]
    branches: Vec<Branch>,
}

/// Probe tags seen at the last push or pull, by remote root.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SyncState {
    seen: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub root: String,
    pub images_uploaded: usize,
    pub versions: usize,
}

/// Everything a pull gathered, not yet applied.
#[derive(Debug)]
pub struct Pulled {
    pub root: String,
    pub contest: Contest,
    pub blobs: ImageBlobs,
    /// Remote branches and versions unknown locally.
    pub branches: Vec<Branch>,
    pub versions: Vec<Version>,
    pub report: MergeReport,
    etag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub root: String,
    /// `None` when nothing was pushed to this root yet.
    pub remote: Option<RemoteStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub changed_since_sync: bool,
    pub problems: ProblemDiff,
}

pub struct SyncConnector {
    remote: Arc<dyn Remote>,
    prefix: String,
    state_path: PathBuf,
    session: Mutex<MergeSession>,
}

impl SyncConnector {
    /// `state_path` records what was last seen on the remote.
    pub fn new(remote: Arc<dyn Remote>, prefix: impl Into<String>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            remote,
            prefix: prefix.into(),
            state_path: state_path.into(),
            session: Mutex::new(MergeSession::default()),
        }
    }

    /// Remote root of `contest`: the prefix plus the slug of its title.
    pub fn root_for(&self, contest: &Contest) -> String {
        let slug = slugify(&contest.meta.title);
        match self.prefix.trim_matches('/') {
            "" => slug,
            prefix => format!("{prefix}/{slug}"),
        }
    }

    /// Conflict choice remembered for the rest of this session.
    pub fn remembered(&self) -> Option<Resolution> {
        self.session.lock().remembered()
    }

    /// Upload images, history and finally the contest.
    ///
    /// Refused with [`SyncError::RemoteChanged`] when the remote contest
    /// moved since the last sync, unless `force` is set.
    pub async fn push(
        &self,
        contest: &Contest,
        blobs: &ImageBlobs,
        history: &History,
        force: bool,
    ) -> Result<PushReport, SyncError> {
        let root = self.root_for(contest);
        let contest_key = object_key(&root, CONTEST_OBJECT);
        let mut state = self.load_state()?;

        if let Some(probe) = self.remote.head(&contest_key).await?
            && state.seen.get(&root) != Some(&probe.etag)
        {
            if !force {
                return Err(SyncError::RemoteChanged(root));
            }
            crate::log!("sync"; "overwriting remote changes at {}", root);
        }

        let mut images_uploaded = 0;
        for image in &contest.images {
            let Some(bytes) = blobs.get(&image.uuid) else {
                crate::debug!("sync"; "image `{}` has no data, not pushed", image.name);
                continue;
            };
            // image objects never change under the same uuid
            let key = object_key(&root, &format!("{IMAGES_PREFIX}/{}", image.uuid));
            if self.remote.head(&key).await?.is_none() {
                self.remote.put(&key, bytes).await?;
                images_uploaded += 1;
            }
        }

        let records = RemoteHistory {
            versions: history.versions(None)?,
            branches: history.branches()?,
        };
        let versions_key = object_key(&root, VERSIONS_OBJECT);
        self.remote.put(&versions_key, &to_json(&versions_key, &records)?).await?;

        self.remote.put(&contest_key, &to_json(&contest_key, contest)?).await?;
        if let Some(probe) = self.remote.head(&contest_key).await? {
            state.seen.insert(root.clone(), probe.etag);
            self.save_state(&state)?;
        }

        crate::log!("sync"; "pushed {} ({} new images, {} versions)", root, images_uploaded, records.versions.len());
        Ok(PushReport {
            root,
            images_uploaded,
            versions: records.versions.len(),
        })
    }

    /// Fetch and merge the remote state without applying it.
    ///
    /// `ask` is consulted for each conflicting problem unless a choice
    /// was remembered earlier in this session.
    pub async fn pull(
        &self,
        local: &Contest,
        local_blobs: &ImageBlobs,
        history: &History,
        ask: &mut (dyn FnMut(&Conflict<'_>) -> Decision + Send),
    ) -> Result<Pulled, SyncError> {
        let root = self.root_for(local);
        let contest_key = object_key(&root, CONTEST_OBJECT);

        let Some(body) = self.remote.get(&contest_key).await? else {
            return Err(SyncError::NothingToPull(root));
        };
        let Some(probe) = self.remote.head(&contest_key).await? else {
            return Err(SyncError::NothingToPull(root));
        };
        let remote: Contest = from_json(&contest_key, &body)?;

        let (contest, report) = {
            let mut session = self.session.lock();
            merge::merge(local, &remote, &mut session, ask)
        };

        let mut blobs = ImageBlobs::default();
        for image in &contest.images {
            if let Some(bytes) = local_blobs.get(&image.uuid) {
                blobs.insert(image.uuid.clone(), bytes.clone());
                continue;
            }
            let key = object_key(&root, &format!("{IMAGES_PREFIX}/{}", image.uuid));
            match self.remote.get(&key).await? {
                Some(bytes) => {
                    blobs.insert(image.uuid.clone(), bytes.into());
                }
                None => crate::log!("sync"; "remote image `{}` is missing", image.name),
            }
        }

        let versions_key = object_key(&root, VERSIONS_OBJECT);
        let records: RemoteHistory = match self.remote.get(&versions_key).await? {
            Some(body) => from_json(&versions_key, &body)?,
            None => RemoteHistory::default(),
        };
        let known_branches: FxHashSet<String> = history.branches()?.into_iter().map(|b| b.id).collect();
        let known_versions: FxHashSet<String> = history.versions(None)?.into_iter().map(|v| v.id).collect();

        Ok(Pulled {
            root,
            contest,
            blobs,
            branches: records
                .branches
                .into_iter()
                .filter(|b| !known_branches.contains(&b.id))
                .collect(),
            versions: records
                .versions
                .into_iter()
                .filter(|v| !known_versions.contains(&v.id))
                .collect(),
            report,
            etag: probe.etag,
        })
    }

    /// Commit a pull: history first, then the document, then the probe tag.
    pub fn apply(&self, pulled: Pulled, document: &mut DocumentStore, history: &History) -> Result<(), SyncError> {
        history.insert(&pulled.branches, &pulled.versions)?;
        document.replace(pulled.contest, pulled.blobs);

        let mut state = self.load_state()?;
        state.seen.insert(pulled.root.clone(), pulled.etag);
        self.save_state(&state)?;

        crate::log!(
            "sync";
            "pulled {} ({} added, {} conflicts, {} new versions)",
            pulled.root, pulled.report.added, pulled.report.conflicts(), pulled.versions.len()
        );
        Ok(())
    }

    pub async fn status(&self, local: &Contest) -> Result<SyncStatus, SyncError> {
        let root = self.root_for(local);
        let contest_key = object_key(&root, CONTEST_OBJECT);

        let Some(probe) = self.remote.head(&contest_key).await? else {
            return Ok(SyncStatus { root, remote: None });
        };
        let Some(body) = self.remote.get(&contest_key).await? else {
            return Ok(SyncStatus { root, remote: None });
        };
        let remote: Contest = from_json(&contest_key, &body)?;
        let state = self.load_state()?;

        Ok(SyncStatus {
            remote: Some(RemoteStatus {
                changed_since_sync: state.seen.get(&root) != Some(&probe.etag),
                problems: ProblemDiff::between(local, &remote),
            }),
            root,
        })
    }

    fn load_state(&self) -> Result<SyncState, SyncError> {
        if !self.state_path.exists() {
            return Ok(SyncState::default());
        }
        Ok(read_json(&self.state_path)?)
    }

    fn save_state(&self, state: &SyncState) -> Result<(), SyncError> {
        write_json(&self.state_path, state)?;
        Ok(())
    }
}

fn object_key(root: &str, name: &str) -> String {
    format!("{root}/{name}")
}

fn to_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>, SyncError> {
    serde_json::to_vec_pretty(value).map_err(|source| SyncError::Json {
        key: key.to_string(),
        source,
    })
}

fn from_json<T: serde::de::DeserializeOwned>(key: &str, body: &[u8]) -> Result<T, SyncError> {
    serde_json::from_slice(body).map_err(|source| SyncError::Json {
        key: key.to_string(),
        source,
    })
}
