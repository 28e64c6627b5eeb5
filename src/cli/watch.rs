//! `watch`: recompile whenever the contest file changes.
//!
//! ```text
//! notify ──> bridge thread ──> reload ──> DocumentStore ──> Autosave
//!                                  │
//!                                  └──> Target::produce (debounced by the gateway)
//!                                            └──> write, or keep the last good output
//! ```
//!
//! Every change starts a compile; the gateway cancels the ones a newer
//! change supersedes, so only the latest revision reaches the output.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use futures::{StreamExt, stream::FuturesUnordered};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::compile::{Artifact, Target, read_contest};
use super::{CompileArgs, session};
use crate::contest::{Contest, DocumentStore, ImageBlobs};
use crate::gateway::{CompilerGateway, GatewayError};
use crate::logger::WatchStatus;
use crate::storage::autosave::Autosave;

/// Check if path is a temp/backup file (editor artifacts)
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

/// Whether `event` may have changed the file at `target`.
fn touches(event: &notify::Event, target: &Path) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| !is_temp_file(path) && path.file_name() == target.file_name())
}

/// Watches the directory holding `target`; editors often replace files by
/// renaming, which a watch on the file itself would miss.
struct FileWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::Receiver<notify::Event>,
}

impl FileWatcher {
    fn new(target: &Path) -> notify::Result<Self> {
        // notify is sync; bridge through a thread like any blocking source
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;
        let dir = target.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let (tx, events) = mpsc::channel(64);
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if tx.blocking_send(event).is_err() {
                            break; // receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            events,
        })
    }
}

/// One compile of one revision.
async fn build(
    gateway: &CompilerGateway,
    target: &Target,
    revision: u64,
    contest: Contest,
) -> (u64, Result<Artifact, GatewayError>) {
    (revision, target.produce(gateway, contest).await)
}

pub async fn run(args: &CompileArgs, workspace: &session::Workspace) -> Result<()> {
    let Some(input) = args.input.clone() else {
        bail!("watch needs a contest file to follow, e.g. `watch contest.json`");
    };
    let input = std::path::absolute(&input).with_context(|| format!("invalid path {}", input.display()))?;

    // watcher first, so no change made during startup is lost
    let mut watcher = FileWatcher::new(&input).context("failed to watch the contest file")?;

    let (contest, blobs) = read_contest(&input)?;
    let target = Target::new(args, &contest)?;
    let output: PathBuf = args.output.clone().unwrap_or_else(|| target.default_output(&contest));

    let mut document = DocumentStore::new(contest, blobs);
    let autosave = Autosave::new(workspace.store.clone(), document.subscribe()).spawn();
    let shutdown = session::shutdown_signal();
    tokio::pin!(shutdown);

    let gateway = session::start_gateway(&workspace.config)?;
    let outcome = async {
        session::initialize(&gateway).await?;
        crate::log!("watch"; "watching {} -> {}", input.display(), output.display());

        let mut status = WatchStatus::new();
        let mut images = ImageSync::default();
        if let Err(err) = images.refresh(&gateway, document.blobs()).await {
            status.error("failed to register images", &err.to_string());
        }
        let mut builds = FuturesUnordered::new();
        let mut latest_written = 0;
        builds.push(build(&gateway, &target, document.revision(), document.contest().clone()));

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = watcher.events.recv() => {
                    if !touches(&event, &input) {
                        continue;
                    }
                    // let the editor finish writing
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    match read_contest(&input) {
                        Ok((contest, blobs)) if contest == *document.contest() && blobs == *document.blobs() => {}
                        Ok((contest, blobs)) => {
                            document.replace(contest, blobs);
                            // a failed registration is retried on the next change
                            if let Err(err) = images.refresh(&gateway, document.blobs()).await {
                                status.error("failed to register images", &err.to_string());
                            }
                            builds.push(build(&gateway, &target, document.revision(), document.contest().clone()));
                        }
                        Err(err) => status.error("invalid contest file", &format!("{err:#}")),
                    }
                }
                Some((revision, result)) = builds.next() => match result {
                    Ok(artifact) if revision > latest_written => {
                        match artifact.write(&output) {
                            Ok(()) => {
                                latest_written = revision;
                                status.success(&format!("compiled revision {} ({})", revision, artifact.describe()));
                            }
                            Err(err) => status.error("failed to write output", &format!("{err:#}")),
                        }
                    }
                    Ok(_) => {}
                    Err(err) if err.is_cancelled() => {}
                    // the previous output stays in place
                    Err(err) => status.error(&format!("revision {} failed to compile", revision), &err.to_string()),
                },
            }
        }
        anyhow::Ok(())
    }
    .await;

    gateway.shutdown().await;
    drop(document);
    if let Err(err) = autosave.await {
        crate::log!("watch"; "autosave task failed: {}", err);
    }
    outcome
}

/// Uuids currently registered with the host.
type Registered = Vec<String>;

/// Keeps the host's image registry in step with the document.
#[derive(Debug, Default)]
struct ImageSync {
    /// Set by the last successful registration only.
    registered: Option<Registered>,
}

impl ImageSync {
    /// Register `blobs` when their uuids differ from the last successful
    /// registration. On error the previous set is kept.
    async fn refresh(&mut self, gateway: &CompilerGateway, blobs: &ImageBlobs) -> Result<(), GatewayError> {
        let mut uuids: Registered = blobs.keys().cloned().collect();
        uuids.sort_unstable();
        if self.registered.as_ref() == Some(&uuids) {
            return Ok(());
        }
        let count = gateway.register_images(blobs).await?;
        crate::debug!("watch"; "registered {} images", count);
        self.registered = Some(uuids);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::asset::{CacheStore, LocalFontAccess, MapFetcher};
    use crate::config::FontEntry;
    use crate::engine::fake::FakeLoader;
    use crate::gateway::{Capabilities, GatewayOptions};
    use crate::host::HostManifest;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    /// A gateway whose bootstrap fails when `font_missing` is set.
    fn gateway(cache: &tempfile::TempDir, font_missing: bool) -> CompilerGateway {
        let fonts = if font_missing {
            vec![FontEntry {
                name: "Missing".into(),
                url: "https://fonts.test/missing.ttf".into(),
            }]
        } else {
            Vec::new()
        };
        CompilerGateway::start_in_task(
            GatewayOptions {
                manifest: HostManifest::default(),
                fonts,
                debounce: Duration::from_millis(300),
                init_timeout: Duration::from_secs(30),
                request_timeout: Duration::from_secs(60),
            },
            Capabilities {
                network: Arc::new(MapFetcher::new()),
                cache: CacheStore::new(cache.path()),
                local_fonts: LocalFontAccess::Unavailable,
                loader: Arc::new(FakeLoader::default()),
            },
        )
    }

    fn blobs(uuids: &[&str]) -> ImageBlobs {
        uuids
            .iter()
            .map(|uuid| (uuid.to_string(), Arc::<[u8]>::from(b"png".as_slice())))
            .collect()
    }

    #[tokio::test]
    async fn test_image_sync_records_sorted_uuids() {
        let dir = tempfile::TempDir::new().unwrap();
        let gateway = gateway(&dir, false);
        let mut images = ImageSync::default();

        images.refresh(&gateway, &blobs(&["b", "a"])).await.unwrap();
        assert_eq!(images.registered, Some(vec!["a".to_string(), "b".to_string()]));

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_registration_keeps_previous_set() {
        let dir = tempfile::TempDir::new().unwrap();
        let gateway = gateway(&dir, true);
        let mut images = ImageSync {
            registered: Some(vec!["old".to_string()]),
        };

        let err = images.refresh(&gateway, &blobs(&["new"])).await.unwrap_err();
        assert!(matches!(err, GatewayError::Init(_)));
        assert_eq!(images.registered, Some(vec!["old".to_string()]));

        // unchanged input is attempted again rather than treated as registered
        assert!(images.refresh(&gateway, &blobs(&["new"])).await.is_err());

        gateway.shutdown().await;
    }

    fn event(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_is_temp_file() {
        assert!(is_temp_file(Path::new("/tmp/contest.json.swp")));
        assert!(is_temp_file(Path::new("/tmp/.contest.json")));
        assert!(is_temp_file(Path::new("/tmp/contest.json~")));
        assert!(!is_temp_file(Path::new("/tmp/contest.json")));
    }

    #[test]
    fn test_touches_only_target() {
        let target = Path::new("/work/contest.json");
        assert!(touches(&event(EventKind::Modify(ModifyKind::Any), "/work/contest.json"), target));
        assert!(touches(&event(EventKind::Create(CreateKind::File), "/work/contest.json"), target));
        assert!(!touches(&event(EventKind::Modify(ModifyKind::Any), "/work/other.json"), target));
        assert!(!touches(&event(EventKind::Access(AccessKind::Any), "/work/contest.json"), target));
    }
}
