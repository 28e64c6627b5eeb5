//! Portable JSON forms of the contest and of the version history.
//!
//! - [`ContestExport`]: the contest with images inlined as base64
//! - [`HistoryExport`]: every branch and version, re-keyed on import

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{Branch, History, StorageError, Version};
use super::history::{new_id, now_millis};
use crate::contest::{Contest, ContestMeta, DocumentStore, ImageBlobs, ImageData, ImageMeta, Problem};
use crate::utils::mime;

/// `type` tag of a history export.
pub const HISTORY_KIND: &str = "xcpc-versions";
/// Format version of a history export.
pub const HISTORY_FORMAT: &str = "1.0";

const IMPORTED_SUFFIX: &str = " (imported)";

// ============================================================================
// Contest
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedImage {
    pub uuid: String,
    pub name: String,
    pub base64: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContestExport {
    #[serde(default)]
    pub meta: ContestMeta,
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub images: Vec<ExportedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl From<ImageData> for ExportedImage {
    fn from(image: ImageData) -> Self {
        Self {
            mime_type: mime::detect(&image.name, &image.bytes).to_string(),
            base64: STANDARD.encode(&image.bytes),
            uuid: image.uuid,
            name: image.name,
        }
    }
}

impl ContestExport {
    /// Inline every live image. Images without bytes are dropped from the
    /// export.
    pub fn new(document: &DocumentStore) -> Self {
        let contest = document.contest();
        let images: Vec<ExportedImage> = document.images().into_iter().map(ExportedImage::from).collect();
        for image in &contest.images {
            if !images.iter().any(|exported| exported.uuid == image.uuid) {
                crate::log!("export"; "skipping image `{}` without data", image.name);
            }
        }

        Self {
            meta: contest.meta.clone(),
            problems: contest.problems.clone(),
            images,
            template: contest.template.clone(),
        }
    }

    /// Split back into the contest and its blobs.
    pub fn into_document(self) -> Result<(Contest, ImageBlobs), StorageError> {
        let mut blobs = ImageBlobs::default();
        let mut images = Vec::with_capacity(self.images.len());

        for image in self.images {
            if !super::is_safe_key(&image.uuid) {
                return Err(StorageError::InvalidKey(image.uuid));
            }
            let bytes = STANDARD.decode(image.base64.trim()).map_err(|err| {
                StorageError::InvalidExport(format!("image `{}`: {err}", image.name))
            })?;
            blobs.insert(image.uuid.clone(), bytes.into());
            images.push(ImageMeta {
                uuid: image.uuid,
                name: image.name,
            });
        }

        let contest = Contest {
            meta: self.meta,
            problems: self.problems,
            images,
            template: self.template,
        };
        Ok((contest, blobs))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        serde_json::from_str(json).map_err(|err| StorageError::InvalidExport(err.to_string()))
    }
}

// ============================================================================
// History
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExport {
    #[serde(rename = "type")]
    pub kind: String,
    pub version: String,
    /// Milliseconds since the Unix epoch.
    pub exported_at: i64,
    pub branches: Vec<Branch>,
    pub versions: Vec<Version>,
}

impl HistoryExport {
    pub fn collect(history: &History) -> Result<Self, StorageError> {
        Ok(Self {
            kind: HISTORY_KIND.to_string(),
            version: HISTORY_FORMAT.to_string(),
            exported_at: now_millis(),
            branches: history.branches()?,
            versions: history.versions(None)?,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let export: Self =
            serde_json::from_str(json).map_err(|err| StorageError::InvalidExport(err.to_string()))?;
        if export.kind != HISTORY_KIND {
            return Err(StorageError::InvalidExport(format!(
                "expected type `{HISTORY_KIND}`, found `{}`",
                export.kind
            )));
        }
        if export.version != HISTORY_FORMAT {
            return Err(StorageError::InvalidExport(format!(
                "unsupported version `{}`",
                export.version
            )));
        }
        Ok(export)
    }

    /// Fresh ids for every branch and version, names suffixed with
    /// ` (imported)`. Versions of branches missing from the export are
    /// dropped.
    pub fn rekey(self) -> (Vec<Branch>, Vec<Version>) {
        let branch_ids: FxHashMap<String, String> = self
            .branches
            .iter()
            .map(|branch| (branch.id.clone(), new_id()))
            .collect();
        let version_ids: FxHashMap<String, String> = self
            .versions
            .iter()
            .map(|version| (version.id.clone(), new_id()))
            .collect();

        let versions: Vec<Version> = self
            .versions
            .into_iter()
            .filter_map(|version| {
                let Some(branch_id) = branch_ids.get(&version.branch_id) else {
                    crate::log!("import"; "dropping version `{}` of unknown branch", version.name);
                    return None;
                };
                Some(Version {
                    id: version_ids[&version.id].clone(),
                    name: format!("{}{IMPORTED_SUFFIX}", version.name),
                    branch_id: branch_id.clone(),
                    ..version
                })
            })
            .collect();

        let branches = self
            .branches
            .into_iter()
            .map(|branch| Branch {
                id: branch_ids[&branch.id].clone(),
                name: format!("{}{IMPORTED_SUFFIX}", branch.name),
                current_version_id: branch
                    .current_version_id
                    .and_then(|id| version_ids.get(&id).cloned()),
                ..branch
            })
            .collect();

        (branches, versions)
    }

    /// Add the re-keyed records to `history`. Returns the imported counts.
    pub fn import_into(self, history: &History) -> Result<(usize, usize), StorageError> {
        let (branches, versions) = self.rekey();
        history.insert(&branches, &versions)?;
        Ok((branches.len(), versions.len()))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contest::example_contest;
    use crate::storage::LocalStore;
    use tempfile::TempDir;

    #[test]
    fn test_contest_export_round_trip() {
        let (contest, blobs) = example_contest();
        let document = DocumentStore::new(contest.clone(), blobs.clone());

        let json = ContestExport::new(&document).to_json().unwrap();
        let (restored, restored_blobs) = ContestExport::from_json(&json)
            .unwrap()
            .into_document()
            .unwrap();

        assert_eq!(restored.meta, contest.meta);
        assert_eq!(restored.problems, contest.problems);
        assert_eq!(restored.images, contest.images);
        assert_eq!(restored_blobs, blobs);
    }

    #[test]
    fn test_contest_export_shape() {
        let document = DocumentStore::example();
        let value = serde_json::to_value(ContestExport::new(&document)).unwrap();

        let image = &value["images"][0];
        assert_eq!(image["mimeType"], "image/svg+xml");
        assert!(image["base64"].as_str().is_some());
        assert!(value.get("template").is_none());
    }

    #[test]
    fn test_images_without_bytes_are_left_out() {
        let (contest, mut blobs) = example_contest();
        let missing = contest.images[0].uuid.clone();
        blobs.remove(&missing);

        let export = ContestExport::new(&DocumentStore::new(contest.clone(), blobs));
        assert_eq!(export.images.len(), contest.images.len() - 1);
        assert!(export.images.iter().all(|image| image.uuid != missing));
    }

    #[test]
    fn test_bad_base64_is_rejected() {
        let json = r#"{"images": [{"uuid": "x", "name": "a.png", "base64": "!!", "mimeType": "image/png"}]}"#;
        let err = ContestExport::from_json(json).unwrap().into_document().unwrap_err();
        assert!(matches!(err, StorageError::InvalidExport(_)));
    }

    fn seeded() -> (TempDir, History) {
        let dir = TempDir::new().unwrap();
        let history = LocalStore::open(dir.path()).unwrap().history();
        let main = history.ensure_branch().unwrap();
        let (contest, _) = example_contest();
        history.save_version(&main.id, "v1", "", &contest).unwrap();
        history.save_version(&main.id, "v2", "", &contest).unwrap();
        (dir, history)
    }

    #[test]
    fn test_history_import_rekeys_and_suffixes() {
        let (_dir, history) = seeded();
        let export = HistoryExport::collect(&history).unwrap();
        let old_ids: Vec<String> = export.versions.iter().map(|v| v.id.clone()).collect();

        let json = export.to_json().unwrap();
        let (branches, versions) = HistoryExport::from_json(&json).unwrap().import_into(&history).unwrap();
        assert_eq!((branches, versions), (1, 2));

        let all = history.versions(None).unwrap();
        assert_eq!(all.len(), 4);
        let imported: Vec<_> = all.iter().filter(|v| v.name.ends_with(" (imported)")).collect();
        assert_eq!(imported.len(), 2);
        assert!(imported.iter().all(|v| !old_ids.contains(&v.id)));

        let branch = history.find_branch("main (imported)").unwrap();
        let current = branch.current_version_id.unwrap();
        assert!(imported.iter().any(|v| v.id == current && v.branch_id == branch.id));
    }

    #[test]
    fn test_history_import_rejects_foreign_files() {
        let (_dir, history) = seeded();
        let mut export = HistoryExport::collect(&history).unwrap();

        export.kind = "something-else".into();
        let err = HistoryExport::from_json(&export.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidExport(_)));

        export.kind = HISTORY_KIND.into();
        export.version = "2.0".into();
        assert!(HistoryExport::from_json(&export.to_json().unwrap()).is_err());
    }
}
