//! Named snapshots of the contest, organised into branches.
//!
//! Versions are immutable once saved. Each branch points at its latest
//! version through `current_version_id`. There is always at least one
//! branch once [`History::ensure_branch`] ran; deleting the last one fails.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::{StorageError, is_safe_key, read_json, write_json};
use crate::contest::Contest;

/// Name of the branch created when none exists.
pub const DEFAULT_BRANCH: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub branch_id: String,
    /// Meta, problems, template and image metadata. Image bytes stay in the
    /// blob store.
    pub contest: Contest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version_id: Option<String>,
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Version and branch records, one JSON file each.
#[derive(Debug, Clone)]
pub struct History {
    versions: PathBuf,
    branches: PathBuf,
}

impl History {
    pub(super) fn new(versions: PathBuf, branches: PathBuf) -> Self {
        Self { versions, branches }
    }

    fn record_path(dir: &Path, id: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_key(id) {
            return Err(StorageError::InvalidKey(id.to_string()));
        }
        Ok(dir.join(format!("{id}.json")))
    }

    fn read_all<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StorageError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::io(dir, err)),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| StorageError::io(dir, err))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                records.push(read_json(&path)?);
            }
        }
        Ok(records)
    }

    fn remove(path: &Path) -> Result<(), StorageError> {
        fs::remove_file(path).map_err(|err| StorageError::io(path, err))
    }

    // =========================================================================
    // Branches
    // =========================================================================

    /// All branches, oldest first.
    pub fn branches(&self) -> Result<Vec<Branch>, StorageError> {
        let mut branches: Vec<Branch> = Self::read_all(&self.branches)?;
        branches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(branches)
    }

    pub fn branch(&self, id: &str) -> Result<Branch, StorageError> {
        let path = Self::record_path(&self.branches, id)?;
        if !path.exists() {
            return Err(StorageError::UnknownBranch(id.to_string()));
        }
        read_json(&path)
    }

    /// Look a branch up by id, then by name.
    pub fn find_branch(&self, id_or_name: &str) -> Result<Branch, StorageError> {
        let branches = self.branches()?;
        branches
            .iter()
            .find(|branch| branch.id == id_or_name)
            .or_else(|| branches.iter().find(|branch| branch.name == id_or_name))
            .cloned()
            .ok_or_else(|| StorageError::UnknownBranch(id_or_name.to_string()))
    }

    /// The oldest branch, creating [`DEFAULT_BRANCH`] if there is none.
    pub fn ensure_branch(&self) -> Result<Branch, StorageError> {
        match self.branches()?.into_iter().next() {
            Some(branch) => Ok(branch),
            None => self.create_branch(DEFAULT_BRANCH, None),
        }
    }

    /// Create a branch, optionally starting at an existing version.
    pub fn create_branch(&self, name: &str, from: Option<&str>) -> Result<Branch, StorageError> {
        if let Some(version) = from {
            self.version(version)?;
        }
        let branch = Branch {
            id: new_id(),
            name: name.to_string(),
            created_at: self.next_timestamp(self.branches()?.iter().map(|b| b.created_at)),
            current_version_id: from.map(str::to_string),
        };
        self.put_branch(&branch)?;
        crate::debug!("history"; "created branch `{}`", name);
        Ok(branch)
    }

    pub fn rename_branch(&self, id: &str, name: &str) -> Result<Branch, StorageError> {
        let mut branch = self.branch(id)?;
        branch.name = name.to_string();
        self.put_branch(&branch)?;
        Ok(branch)
    }

    /// Delete a branch and every version on it. Returns the number of
    /// versions removed.
    pub fn delete_branch(&self, id: &str) -> Result<usize, StorageError> {
        let branch = self.branch(id)?;
        if self.branches()?.len() <= 1 {
            return Err(StorageError::LastBranch);
        }

        let versions = self.versions(Some(&branch.id))?;
        for version in &versions {
            Self::remove(&Self::record_path(&self.versions, &version.id)?)?;
        }
        Self::remove(&Self::record_path(&self.branches, &branch.id)?)?;
        crate::debug!(
            "history";
            "deleted branch `{}` and {}",
            branch.name,
            crate::utils::fmt::plural_count(versions.len(), "version")
        );
        Ok(versions.len())
    }

    pub(crate) fn put_branch(&self, branch: &Branch) -> Result<(), StorageError> {
        write_json(&Self::record_path(&self.branches, &branch.id)?, branch)?;
        Ok(())
    }

    // =========================================================================
    // Versions
    // =========================================================================

    /// Versions, oldest first; only those on `branch` when given.
    pub fn versions(&self, branch: Option<&str>) -> Result<Vec<Version>, StorageError> {
        let mut versions: Vec<Version> = Self::read_all(&self.versions)?;
        if let Some(branch) = branch {
            versions.retain(|version| version.branch_id == branch);
        }
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(versions)
    }

    pub fn version(&self, id: &str) -> Result<Version, StorageError> {
        let path = Self::record_path(&self.versions, id)?;
        if !path.exists() {
            return Err(StorageError::UnknownVersion(id.to_string()));
        }
        read_json(&path)
    }

    /// Snapshot `contest` as a new version on `branch_id` and advance the
    /// branch to it.
    pub fn save_version(
        &self,
        branch_id: &str,
        name: &str,
        description: &str,
        contest: &Contest,
    ) -> Result<Version, StorageError> {
        let mut branch = self.branch(branch_id)?;
        let existing = self.versions(None)?;

        let version = Version {
            id: new_id(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: self.next_timestamp(existing.iter().map(|v| v.created_at)),
            branch_id: branch.id.clone(),
            contest: contest.clone(),
        };
        self.put_version(&version)?;

        branch.current_version_id = Some(version.id.clone());
        self.put_branch(&branch)?;
        Ok(version)
    }

    /// Delete one version. A branch pointing at it falls back to its latest
    /// remaining version.
    pub fn delete_version(&self, id: &str) -> Result<Version, StorageError> {
        let version = self.version(id)?;
        Self::remove(&Self::record_path(&self.versions, id)?)?;

        let mut branch = self.branch(&version.branch_id)?;
        if branch.current_version_id.as_deref() == Some(id) {
            branch.current_version_id = self
                .versions(Some(&branch.id))?
                .last()
                .map(|latest| latest.id.clone());
            self.put_branch(&branch)?;
        }
        Ok(version)
    }

    pub(crate) fn put_version(&self, version: &Version) -> Result<(), StorageError> {
        write_json(&Self::record_path(&self.versions, &version.id)?, version)?;
        Ok(())
    }

    /// Replace every record with `branches` and `versions`.
    pub fn replace(&self, branches: &[Branch], versions: &[Version]) -> Result<(), StorageError> {
        for dir in [&self.branches, &self.versions] {
            if dir.exists() {
                fs::remove_dir_all(dir).map_err(|err| StorageError::io(dir, err))?;
            }
            fs::create_dir_all(dir).map_err(|err| StorageError::io(dir, err))?;
        }
        self.insert(branches, versions)
    }

    /// Add records, overwriting any with the same id.
    pub fn insert(&self, branches: &[Branch], versions: &[Version]) -> Result<(), StorageError> {
        for branch in branches {
            self.put_branch(branch)?;
        }
        for version in versions {
            self.put_version(version)?;
        }
        Ok(())
    }

    /// Strictly increasing creation times keep listings stable within one
    /// millisecond.
    fn next_timestamp(&self, existing: impl Iterator<Item = i64>) -> i64 {
        let now = now_millis();
        existing.max().map_or(now, |latest| now.max(latest + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contest::example_contest;
    use crate::storage::LocalStore;
    use tempfile::TempDir;

    fn history() -> (TempDir, History) {
        let dir = TempDir::new().unwrap();
        let history = LocalStore::open(dir.path()).unwrap().history();
        (dir, history)
    }

    #[test]
    fn test_ensure_branch_creates_default_once() {
        let (_dir, history) = history();

        let first = history.ensure_branch().unwrap();
        let second = history.ensure_branch().unwrap();

        assert_eq!(first.name, DEFAULT_BRANCH);
        assert_eq!(first, second);
        assert_eq!(history.branches().unwrap().len(), 1);
    }

    #[test]
    fn test_save_version_advances_branch() {
        let (_dir, history) = history();
        let branch = history.ensure_branch().unwrap();
        let (contest, _) = example_contest();

        let v1 = history.save_version(&branch.id, "draft", "", &contest).unwrap();
        let v2 = history.save_version(&branch.id, "final", "ready", &contest).unwrap();

        assert!(v2.created_at > v1.created_at);
        let branch = history.branch(&branch.id).unwrap();
        assert_eq!(branch.current_version_id.as_deref(), Some(v2.id.as_str()));

        let names: Vec<_> = history
            .versions(Some(&branch.id))
            .unwrap()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["draft", "final"]);
        assert_eq!(history.version(&v1.id).unwrap().contest, contest);
    }

    #[test]
    fn test_delete_branch_cascades_to_versions() {
        let (_dir, history) = history();
        let main = history.ensure_branch().unwrap();
        let side = history.create_branch("side", None).unwrap();
        let (contest, _) = example_contest();

        history.save_version(&main.id, "m", "", &contest).unwrap();
        history.save_version(&side.id, "s1", "", &contest).unwrap();
        history.save_version(&side.id, "s2", "", &contest).unwrap();

        assert_eq!(history.delete_branch(&side.id).unwrap(), 2);
        assert_eq!(history.versions(None).unwrap().len(), 1);
        assert!(matches!(
            history.branch(&side.id),
            Err(StorageError::UnknownBranch(_))
        ));
    }

    #[test]
    fn test_last_branch_cannot_be_deleted() {
        let (_dir, history) = history();
        let main = history.ensure_branch().unwrap();
        let (contest, _) = example_contest();
        history.save_version(&main.id, "keep", "", &contest).unwrap();

        assert!(matches!(
            history.delete_branch(&main.id),
            Err(StorageError::LastBranch)
        ));
        assert_eq!(history.branches().unwrap().len(), 1);
        assert_eq!(history.versions(None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_current_version_moves_pointer_back() {
        let (_dir, history) = history();
        let main = history.ensure_branch().unwrap();
        let (contest, _) = example_contest();
        let v1 = history.save_version(&main.id, "one", "", &contest).unwrap();
        let v2 = history.save_version(&main.id, "two", "", &contest).unwrap();

        history.delete_version(&v2.id).unwrap();
        let main = history.branch(&main.id).unwrap();
        assert_eq!(main.current_version_id, Some(v1.id.clone()));

        history.delete_version(&v1.id).unwrap();
        assert_eq!(history.branch(&main.id).unwrap().current_version_id, None);
    }

    #[test]
    fn test_branch_from_version_and_rename() {
        let (_dir, history) = history();
        let main = history.ensure_branch().unwrap();
        let (contest, _) = example_contest();
        let v1 = history.save_version(&main.id, "one", "", &contest).unwrap();

        let fork = history.create_branch("fork", Some(&v1.id)).unwrap();
        assert_eq!(fork.current_version_id, Some(v1.id));
        assert!(history.create_branch("bad", Some("missing")).is_err());

        let renamed = history.rename_branch(&fork.id, "feature").unwrap();
        assert_eq!(history.find_branch("feature").unwrap(), renamed);
        assert_eq!(history.find_branch(&fork.id).unwrap().name, "feature");
    }
}
