//! The live, mutable contest document.
//!
//! [`DocumentStore`] is owned by exactly one editing session. Every mutation
//! bumps a revision and publishes an immutable [`DocumentSnapshot`] on a
//! `watch` channel; the autosave actor and the watch-mode compiler subscribe
//! to it instead of aliasing the live document.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::watch;

use super::{Contest, ContestMeta, ImageData, ImageMeta, Problem};

/// Image uuid -> bytes.
pub type ImageBlobs = FxHashMap<String, Arc<[u8]>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no problem with key `{0}`")]
    UnknownProblem(String),

    #[error("problem index {index} out of range ({len} problems)")]
    OutOfRange { index: usize, len: usize },

    #[error("no image with uuid `{0}`")]
    UnknownImage(String),
}

/// Immutable copy of the document at one revision.
#[derive(Debug, Clone, Default)]
pub struct DocumentSnapshot {
    pub revision: u64,
    pub contest: Contest,
    pub blobs: ImageBlobs,
}

pub struct DocumentStore {
    contest: Contest,
    blobs: ImageBlobs,
    revision: u64,
    tx: watch::Sender<Arc<DocumentSnapshot>>,
}

impl DocumentStore {
    pub fn new(contest: Contest, blobs: ImageBlobs) -> Self {
        let snapshot = DocumentSnapshot {
            revision: 0,
            contest: contest.clone(),
            blobs: blobs.clone(),
        };
        let (tx, _) = watch::channel(Arc::new(snapshot));
        Self {
            contest,
            blobs,
            revision: 0,
            tx,
        }
    }

    /// Store seeded with the built-in example contest.
    pub fn example() -> Self {
        let (contest, blobs) = super::example_contest();
        Self::new(contest, blobs)
    }

    // =========================================================================
    // Read access
    // =========================================================================

    pub fn contest(&self) -> &Contest {
        &self.contest
    }

    pub fn blobs(&self) -> &ImageBlobs {
        &self.blobs
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Images in registry order, with byte handles.
    pub fn images(&self) -> Vec<ImageData> {
        self.contest
            .images
            .iter()
            .filter_map(|meta| {
                let bytes = self.blobs.get(&meta.uuid)?;
                Some(ImageData {
                    uuid: meta.uuid.clone(),
                    name: meta.name.clone(),
                    bytes: Arc::clone(bytes),
                })
            })
            .collect()
    }

    /// Subscribe to snapshots published after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<Arc<DocumentSnapshot>> {
        self.tx.subscribe()
    }

    /// Current snapshot (same value subscribers see).
    pub fn snapshot(&self) -> Arc<DocumentSnapshot> {
        self.tx.borrow().clone()
    }

    /// Display letter of the problem with `key`.
    pub fn letter_of(&self, key: &str) -> Option<String> {
        self.contest.position(key).map(super::problem_letter)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub fn update_meta(&mut self, f: impl FnOnce(&mut ContestMeta)) {
        f(&mut self.contest.meta);
        self.touch();
    }

    pub fn set_template(&mut self, template: Option<String>) {
        self.contest.template = template;
        self.touch();
    }

    /// Append a problem; returns its key.
    pub fn add_problem(&mut self, problem: Problem) -> String {
        let key = problem.key.clone();
        self.contest.problems.push(problem);
        self.touch();
        key
    }

    pub fn remove_problem(&mut self, key: &str) -> Result<Problem, StoreError> {
        let index = self.index_of(key)?;
        let problem = self.contest.problems.remove(index);
        self.touch();
        Ok(problem)
    }

    /// Move the problem at `from` so it ends up at position `to`.
    pub fn move_problem(&mut self, from: usize, to: usize) -> Result<(), StoreError> {
        let len = self.contest.problems.len();
        for index in [from, to] {
            if index >= len {
                return Err(StoreError::OutOfRange { index, len });
            }
        }
        if from != to {
            let problem = self.contest.problems.remove(from);
            self.contest.problems.insert(to, problem);
            self.touch();
        }
        Ok(())
    }

    pub fn update_problem(
        &mut self,
        key: &str,
        f: impl FnOnce(&mut Problem),
    ) -> Result<(), StoreError> {
        let index = self.index_of(key)?;
        f(&mut self.contest.problems[index]);
        self.touch();
        Ok(())
    }

    /// Register image bytes under a fresh uuid; returns the uuid.
    pub fn add_image(&mut self, name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> String {
        let uuid = uuid::Uuid::new_v4().to_string();
        self.contest.images.push(ImageMeta {
            uuid: uuid.clone(),
            name: name.into(),
        });
        self.blobs.insert(uuid.clone(), bytes.into());
        self.touch();
        uuid
    }

    pub fn remove_image(&mut self, uuid: &str) -> Result<ImageMeta, StoreError> {
        let index = self
            .contest
            .images
            .iter()
            .position(|image| image.uuid == uuid)
            .ok_or_else(|| StoreError::UnknownImage(uuid.to_string()))?;
        let meta = self.contest.images.remove(index);
        self.blobs.remove(uuid);
        self.touch();
        Ok(meta)
    }

    /// Replace the whole document (import, version restore, sync pull).
    pub fn replace(&mut self, contest: Contest, blobs: ImageBlobs) {
        self.contest = contest;
        self.blobs = blobs;
        self.touch();
    }

    fn index_of(&self, key: &str) -> Result<usize, StoreError> {
        self.contest
            .position(key)
            .ok_or_else(|| StoreError::UnknownProblem(key.to_string()))
    }

    fn touch(&mut self) {
        self.revision += 1;
        let snapshot = DocumentSnapshot {
            revision: self.revision,
            contest: self.contest.clone(),
            blobs: self.blobs.clone(),
        };
        self.tx.send_replace(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contest::StatementFormat;

    fn store_with(names: &[&str]) -> (DocumentStore, Vec<String>) {
        let mut store = DocumentStore::new(Contest::default(), ImageBlobs::default());
        let keys = names
            .iter()
            .map(|name| store.add_problem(Problem::new(*name, StatementFormat::Markdown)))
            .collect();
        (store, keys)
    }

    fn names(store: &DocumentStore) -> Vec<&str> {
        store
            .contest()
            .problems
            .iter()
            .map(|p| p.problem.display_name.as_str())
            .collect()
    }

    #[test]
    fn test_move_problem_relabels() {
        let (mut store, keys) = store_with(&["one", "two", "three"]);
        store.move_problem(0, 2).unwrap();
        assert_eq!(names(&store), ["two", "three", "one"]);
        assert_eq!(store.letter_of(&keys[0]).as_deref(), Some("C"));
        assert_eq!(store.letter_of(&keys[1]).as_deref(), Some("A"));
    }

    #[test]
    fn test_move_problem_out_of_range() {
        let (mut store, _) = store_with(&["one"]);
        assert_eq!(
            store.move_problem(0, 3),
            Err(StoreError::OutOfRange { index: 3, len: 1 })
        );
    }

    #[test]
    fn test_remove_unknown_problem() {
        let (mut store, _) = store_with(&["one"]);
        assert!(matches!(
            store.remove_problem("missing"),
            Err(StoreError::UnknownProblem(_))
        ));
    }

    #[test]
    fn test_mutations_publish_snapshots() {
        let (mut store, keys) = store_with(&["one"]);
        let mut rx = store.subscribe();
        let before = rx.borrow_and_update().revision;

        store
            .update_problem(&keys[0], |p| p.statement.description = "changed".into())
            .unwrap();

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.revision, before + 1);
        assert_eq!(snapshot.contest.problems[0].statement.description, "changed");
    }

    #[test]
    fn test_images_roundtrip() {
        let mut store = DocumentStore::new(Contest::default(), ImageBlobs::default());
        let uuid = store.add_image("tree.png", vec![1u8, 2, 3]);
        let images = store.images();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].uuid, uuid);
        assert_eq!(&*images[0].bytes, &[1, 2, 3]);

        store.remove_image(&uuid).unwrap();
        assert!(store.images().is_empty());
        assert!(store.blobs().is_empty());
    }
}
