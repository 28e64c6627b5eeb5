//! Setup shared by the commands: configuration, local store, compiler gateway
//! and Ctrl+C handling.

use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use anyhow::{Context, Result, anyhow};
use tokio::{sync::watch, task::JoinHandle};

use super::{Cli, prompt};
use crate::asset::{CacheStore, FontAccess, HttpFetcher, LocalFontAccess};
use crate::config::BookletConfig;
use crate::contest::DocumentStore;
use crate::engine::TypstLoader;
use crate::gateway::{Capabilities, CompilerGateway, GatewayOptions};
use crate::logger::ProgressLine;
use crate::storage::LocalStore;

/// Configuration plus the opened data directory.
pub struct Workspace {
    pub config: BookletConfig,
    pub store: LocalStore,
}

impl Workspace {
    pub fn open(cli: &Cli) -> Result<Self> {
        let mut config = BookletConfig::load(cli.config.as_deref())?;
        if let Some(dir) = &cli.data_dir {
            config.storage.data_dir = std::path::absolute(dir)
                .with_context(|| format!("invalid data directory {}", dir.display()))?;
        }

        let data_dir = config.data_dir();
        let store = LocalStore::open(&data_dir)
            .with_context(|| format!("failed to open data directory {}", data_dir.display()))?;
        crate::debug!("storage"; "data directory {}", data_dir.display());

        Ok(Self { config, store })
    }

    /// The persisted contest, or the built-in example.
    pub fn document(&self) -> DocumentStore {
        self.store.restore_or_example()
    }

    pub fn sync_state_path(&self) -> PathBuf {
        self.store.dir().join("sync.json")
    }
}

/// Start the compiler host with the platform's real capabilities.
pub fn start_gateway(config: &BookletConfig) -> Result<CompilerGateway> {
    let network = HttpFetcher::new(config.compile.request_timeout())?;
    let capabilities = Capabilities {
        network: Arc::new(network),
        cache: CacheStore::new(config.cache_dir()),
        local_fonts: LocalFontAccess::system(config.toolchain.system_fonts),
        loader: Arc::new(TypstLoader),
    };
    CompilerGateway::start(GatewayOptions::from_config(config), capabilities)
        .context("failed to start the compiler host")
}

/// Run the bootstrap behind a progress line, asking for installed-font
/// access when the gateway requests it.
pub async fn initialize(gateway: &CompilerGateway) -> Result<()> {
    let mut progress = gateway.progress();
    if progress.borrow().is_ready() {
        return Ok(());
    }
    let line = ProgressLine::new();
    let mut consent: Option<JoinHandle<Result<bool>>> = None;
    let mut asked = false;

    let init = gateway.init();
    tokio::pin!(init);

    let result = loop {
        tokio::select! {
            result = &mut init => break result,
            Ok(()) = progress.changed() => {
                let snapshot = progress.borrow_and_update().clone();
                line.update(&snapshot.summary());
                if snapshot.font_access == FontAccess::Requested && !asked {
                    asked = true;
                    eprintln!();
                    consent = Some(tokio::task::spawn_blocking(|| {
                        prompt::confirm("Use installed fonts before downloading missing ones?")
                    }));
                }
            }
            answer = async {
                match consent.as_mut() {
                    Some(handle) => handle.await,
                    None => std::future::pending().await,
                }
            }, if consent.is_some() => {
                consent = None;
                let granted = matches!(answer, Ok(Ok(true)));
                gateway.acknowledge_font_access(granted);
                crate::debug!("font"; "installed fonts {}", if granted { "allowed" } else { "declined" });
            }
        }
    };

    let snapshot = gateway.progress().borrow().clone();
    line.finish(&snapshot.summary());
    if let Err(err) = result {
        return Err(match snapshot.failure() {
            Some((phase, _)) => anyhow::Error::new(err).context(format!("{phase} setup failed")),
            None => err.into(),
        });
    }
    Ok(())
}

// ============================================================================
// Ctrl+C
// ============================================================================

static SHUTDOWN: OnceLock<watch::Sender<bool>> = OnceLock::new();

fn shutdown_sender() -> &'static watch::Sender<bool> {
    SHUTDOWN.get_or_init(|| watch::channel(false).0)
}

/// Install the Ctrl+C handler.
///
/// While a command listens through [`shutdown_signal`] the first Ctrl+C asks
/// it to stop; otherwise, or on a second Ctrl+C, the process exits.
pub fn setup_shutdown_handler() -> Result<()> {
    let sender = shutdown_sender();
    ctrlc::set_handler(move || {
        if sender.receiver_count() == 0 || *sender.borrow() {
            std::process::exit(130);
        }
        crate::log!("watch"; "shutting down...");
        sender.send_replace(true);
    })
    .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Resolves once Ctrl+C was pressed. Listening starts at the call.
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    let mut rx = shutdown_sender().subscribe();
    async move {
        // the sender is a static, so this never errors
        rx.wait_for(|stop| *stop).await.ok();
    }
}

/// Default output path: the slugged title plus the format's extension.
pub fn default_output(title: &str, extension: &str) -> PathBuf {
    PathBuf::from(format!("{}.{extension}", crate::utils::slug::slugify(title)))
}
