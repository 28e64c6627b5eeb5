//! Compiler gateway: the one place compile and render requests go through.
//!
//! A [`CompilerGateway`] is a session object. It owns
//!
//! - the compiler host (started on its own thread by [`CompilerGateway::start`])
//! - the one-time toolchain bootstrap and its [`InitProgress`]
//! - one debounced single-flight scheduler per request kind
//!
//! ```text
//! compile_pdf ──┐
//! compile_problem ─┤  Flight (300 ms window,  ──> Broker ──> host thread
//! render_svg ───┤   one in flight per kind)        <── Reply by id
//! render_pages ─┘
//! ```
//!
//! Every request waits for the bootstrap first, starting it if nobody has.

mod broker;
mod flight;
mod init;


use std::{io, sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::{OnceCell, mpsc, watch};

use crate::asset::{CacheStore, CachedFetcher, FontAccess, FontConsent, Fetcher, LocalFontAccess};
use crate::config::{BookletConfig, FontEntry};
use crate::contest::{Contest, ImageBlobs};
use crate::engine::EngineLoader;
use crate::host::{self, Host, HostHandle, HostManifest};
use crate::protocol::{CompileData, RegisterImagesData, RenderData, Request, ResponseData, SvgLayout};

use broker::Broker;
use flight::Flight;

pub use init::{InitProgress, PhaseStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The bootstrap failed; nothing compiles until `retry_init`.
    #[error("compiler initialization failed: {0}")]
    Init(Arc<str>),

    #[error("{kind} request timed out after {}s", after.as_secs())]
    Timeout { kind: &'static str, after: Duration },

    /// Superseded by a newer call before it was dispatched.
    #[error("superseded by a newer request")]
    Cancelled,

    /// The host answered with an error (compile diagnostics included).
    #[error("{0}")]
    Host(String),

    #[error("compiler host is not running")]
    Closed,

    #[error("unexpected `{0}` reply")]
    Protocol(&'static str),

    #[error("no problem at position {0}")]
    NoSuchProblem(usize),
}

impl GatewayError {
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Scheduling and bootstrap settings.
#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub manifest: HostManifest,
    pub fonts: Vec<FontEntry>,
    pub debounce: Duration,
    pub init_timeout: Duration,
    pub request_timeout: Duration,
}

impl GatewayOptions {
    pub fn from_config(config: &BookletConfig) -> Self {
        Self {
            manifest: HostManifest::from_config(&config.toolchain),
            fonts: config.toolchain.fonts.clone(),
            debounce: config.compile.debounce(),
            init_timeout: config.compile.init_timeout(),
            request_timeout: config.compile.request_timeout(),
        }
    }
}

/// Platform access the gateway is given instead of reaching for it.
#[derive(Clone)]
pub struct Capabilities {
    pub network: Arc<dyn Fetcher>,
    pub cache: CacheStore,
    pub local_fonts: LocalFontAccess,
    pub loader: Arc<dyn EngineLoader>,
}

/// State shared by the gateway and its scheduler tasks.
struct Core {
    options: GatewayOptions,
    broker: Broker,
    fetcher: CachedFetcher,
    local_fonts: LocalFontAccess,
    consent: FontConsent,
    progress: watch::Sender<InitProgress>,
    /// Swapped for a fresh cell by `retry_init`.
    init: ArcSwap<OnceCell<Result<(), GatewayError>>>,
}

impl Core {
    /// Resolve once the bootstrap succeeded, running it if needed.
    ///
    /// Concurrent callers share one bootstrap and its outcome.
    async fn ready(&self) -> Result<(), GatewayError> {
        let cell = self.init.load_full();
        cell.get_or_init(|| self.bootstrap()).await.clone()
    }

    async fn request(&self, request: Request) -> Result<ResponseData, GatewayError> {
        self.ready().await?;
        self.broker.call(request, self.options.request_timeout).await
    }

    async fn compile(&self, contest: Contest) -> Result<Arc<[u8]>, GatewayError> {
        match self.request(Request::CompileTypst(CompileData { contest })).await? {
            ResponseData::Pdf(pdf) => Ok(pdf),
            other => Err(GatewayError::Protocol(other.kind())),
        }
    }

    async fn render(&self, contest: Contest, layout: SvgLayout) -> Result<ResponseData, GatewayError> {
        self.request(Request::RenderTypst(RenderData { contest, layout }))
            .await
    }
}

pub struct CompilerGateway {
    core: Arc<Core>,
    pdf: Flight<Contest, Arc<[u8]>>,
    problem: Flight<Contest, Arc<[u8]>>,
    svg: Flight<Contest, String>,
    pages: Flight<Contest, Vec<String>>,
    host: Option<HostHandle>,
}

impl CompilerGateway {
    /// Start the host thread and the schedulers. Nothing is fetched until
    /// the first request or an explicit [`init`](Self::init).
    ///
    /// Must be called inside a tokio runtime.
    pub fn start(options: GatewayOptions, capabilities: Capabilities) -> io::Result<Self> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let (reply_tx, replies) = mpsc::unbounded_channel();

        let handle = host::spawn(Self::host(&options, &capabilities), inbox, reply_tx)?;
        let mut gateway = Self::assemble(options, capabilities, Broker::new(outbox, replies));
        gateway.host = Some(handle);
        Ok(gateway)
    }

    /// Like [`start`](Self::start), with the host loop running as a task
    /// on the current runtime.
    #[cfg(test)]
    pub(crate) fn start_in_task(options: GatewayOptions, capabilities: Capabilities) -> Self {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let (reply_tx, replies) = mpsc::unbounded_channel();

        tokio::spawn(host::serve(Self::host(&options, &capabilities), inbox, reply_tx));
        Self::assemble(options, capabilities, Broker::new(outbox, replies))
    }

    fn host(options: &GatewayOptions, capabilities: &Capabilities) -> Host {
        // packages come straight from the network; modules were cached by the bootstrap
        Host::new(
            options.manifest.clone(),
            capabilities.network.clone(),
            capabilities.loader.clone(),
        )
        .with_module_cache(capabilities.cache.clone())
    }

    fn assemble(options: GatewayOptions, capabilities: Capabilities, broker: Broker) -> Self {
        let window = options.debounce;
        let core = Arc::new(Core {
            fetcher: CachedFetcher::new(capabilities.network, capabilities.cache),
            local_fonts: capabilities.local_fonts,
            consent: FontConsent::new(),
            progress: watch::Sender::new(InitProgress::default()),
            init: ArcSwap::from_pointee(OnceCell::new()),
            broker,
            options,
        });

        let pdf = Flight::spawn("compile_pdf", window, {
            let core = core.clone();
            move |contest| {
                let core = core.clone();
                async move { core.compile(contest).await }
            }
        });
        let problem = Flight::spawn("compile_problem", window, {
            let core = core.clone();
            move |contest| {
                let core = core.clone();
                async move { core.compile(contest).await }
            }
        });
        let svg = Flight::spawn("render_svg", window, {
            let core = core.clone();
            move |contest| {
                let core = core.clone();
                async move {
                    match core.render(contest, SvgLayout::Merged).await? {
                        ResponseData::Svg(svg) => Ok(svg),
                        other => Err(GatewayError::Protocol(other.kind())),
                    }
                }
            }
        });
        let pages = Flight::spawn("render_pages", window, {
            let core = core.clone();
            move |contest| {
                let core = core.clone();
                async move {
                    match core.render(contest, SvgLayout::Pages).await? {
                        ResponseData::Pages(pages) => Ok(pages),
                        other => Err(GatewayError::Protocol(other.kind())),
                    }
                }
            }
        });

        Self {
            core,
            pdf,
            problem,
            svg,
            pages,
            host: None,
        }
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Bootstrap the toolchain. Every caller shares one outcome until
    /// [`retry_init`](Self::retry_init) discards a failure.
    pub async fn init(&self) -> Result<(), GatewayError> {
        self.core.ready().await
    }

    /// Discard a failed bootstrap so the next request starts over.
    ///
    /// Returns `false` if the bootstrap had not failed.
    pub fn retry_init(&self) -> bool {
        let previous = self.core.init.rcu(|cell| match cell.get() {
            Some(Err(_)) => Arc::new(OnceCell::new()),
            _ => Arc::clone(cell),
        });
        let reset = matches!(previous.get(), Some(Err(_)));
        if reset {
            crate::debug!("init"; "discarded failed bootstrap");
        }
        reset
    }

    pub fn progress(&self) -> watch::Receiver<InitProgress> {
        self.core.progress.subscribe()
    }

    /// Answer the installed-font prompt. Only the first answer counts.
    pub fn acknowledge_font_access(&self, granted: bool) -> bool {
        let recorded = self.core.consent.acknowledge(granted);
        if recorded {
            let state = if granted {
                FontAccess::Granted
            } else {
                FontAccess::Denied
            };
            self.core
                .progress
                .send_modify(|progress| progress.font_access = state);
        }
        recorded
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Replace the host's image registry. Not debounced.
    pub async fn register_images(&self, images: &ImageBlobs) -> Result<usize, GatewayError> {
        let request = Request::RegisterImages(RegisterImagesData {
            images: images.clone(),
        });
        match self.core.request(request).await? {
            ResponseData::ImagesRegistered(count) => Ok(count),
            other => Err(GatewayError::Protocol(other.kind())),
        }
    }

    pub async fn compile_pdf(&self, contest: Contest) -> Result<Arc<[u8]>, GatewayError> {
        self.pdf.call(contest).await
    }

    /// Compile the problem at `index` on its own (meta, images and template kept).
    pub async fn compile_problem(
        &self,
        contest: &Contest,
        index: usize,
    ) -> Result<Arc<[u8]>, GatewayError> {
        let single = contest
            .single_problem(index)
            .ok_or(GatewayError::NoSuchProblem(index))?;
        self.problem.call(single).await
    }

    pub async fn render_svg(&self, contest: Contest) -> Result<String, GatewayError> {
        self.svg.call(contest).await
    }

    pub async fn render_pages(&self, contest: Contest) -> Result<Vec<String>, GatewayError> {
        self.pages.call(contest).await
    }

    /// Close the host's inbox and wait for its thread.
    ///
    /// A request already running in the host finishes first.
    pub async fn shutdown(mut self) {
        self.core.broker.close();
        if let Some(handle) = self.host.take()
            && tokio::task::spawn_blocking(move || handle.join()).await.is_err()
        {
            crate::log!("gateway"; "failed to join compiler host");
        }
    }
}
