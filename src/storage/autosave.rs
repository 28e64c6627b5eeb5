//! Autosave actor
//!
//! Persists every [`DocumentSnapshot`] the document store publishes.
//!
//! ```text
//! DocumentStore --watch--> Autosave --spawn_blocking--> LocalStore
//! ```
//!
//! Snapshots published while a save is running coalesce into one: the
//! `watch` channel only keeps the newest. Versions and branches are never
//! touched. The actor stops once the store is dropped, after saving the
//! last unseen snapshot.

use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};

use super::LocalStore;
use crate::contest::DocumentSnapshot;

pub struct Autosave {
    store: LocalStore,
    snapshots: watch::Receiver<Arc<DocumentSnapshot>>,
}

impl Autosave {
    pub fn new(store: LocalStore, snapshots: watch::Receiver<Arc<DocumentSnapshot>>) -> Self {
        Self { store, snapshots }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Save every revision. Returns once the document store is gone.
    pub async fn run(mut self) {
        while self.snapshots.changed().await.is_ok() {
            let snapshot = self.snapshots.borrow_and_update().clone();
            let store = self.store.clone();
            let revision = snapshot.revision;

            let saved = tokio::task::spawn_blocking(move || {
                store.save_document(&snapshot.contest, &snapshot.blobs)
            })
            .await;

            match saved {
                Ok(Ok(true)) => crate::debug!("autosave"; "saved revision {}", revision),
                Ok(Ok(false)) => {}
                Ok(Err(err)) => crate::log!("autosave"; "{:#}", anyhow::Error::from(err)),
                Err(err) => crate::log!("autosave"; "save task failed: {}", err),
            }
        }
    }
}
