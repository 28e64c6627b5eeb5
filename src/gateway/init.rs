//! Toolchain bootstrap: module fetch, font acquisition, package manifest,
//! then the host's own `init`.
//!
//! Progress of every phase is published as an [`InitProgress`] value; the
//! CLI draws it on a [`ProgressLine`](crate::logger::ProgressLine).

use std::{future::Future, sync::Arc};

use futures::future::try_join_all;

use super::{Core, GatewayError};
use crate::asset::{ByteProgress, FontAccess, Fetcher, LocalFontAccess};
use crate::config::FontEntry;
use crate::protocol::{InitData, Request, ResponseData};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PhaseStatus {
    #[default]
    Pending,
    Fulfilled,
    Rejected(String),
}

/// One bootstrap phase: its outcome and per-resource byte progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseState {
    pub status: PhaseStatus,
    pub resources: Vec<ByteProgress>,
}

impl PhaseState {
    fn with_resources(count: usize) -> Self {
        Self {
            status: PhaseStatus::Pending,
            resources: vec![ByteProgress::default(); count],
        }
    }

    pub fn progress(&self) -> ByteProgress {
        ByteProgress::aggregate(&self.resources)
    }

    fn describe(&self) -> String {
        match &self.status {
            PhaseStatus::Fulfilled => "done".into(),
            PhaseStatus::Rejected(_) => "failed".into(),
            PhaseStatus::Pending if self.resources.is_empty() => "...".into(),
            PhaseStatus::Pending => self.progress().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Phase {
    Toolchain,
    Fonts,
    Packages,
}

/// Snapshot of the bootstrap, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitProgress {
    pub toolchain: PhaseState,
    pub fonts: PhaseState,
    pub packages: PhaseState,
    /// Installed-font consent; `Requested` means the front end must call
    /// `acknowledge_font_access`.
    pub font_access: FontAccess,
    /// The host's own init, after all three phases.
    pub host: PhaseStatus,
}

impl InitProgress {
    fn starting(modules: usize, fonts: usize, font_access: FontAccess) -> Self {
        Self {
            toolchain: PhaseState::with_resources(modules),
            fonts: PhaseState::with_resources(fonts),
            packages: PhaseState::default(),
            font_access,
            host: PhaseStatus::Pending,
        }
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut PhaseState {
        match phase {
            Phase::Toolchain => &mut self.toolchain,
            Phase::Fonts => &mut self.fonts,
            Phase::Packages => &mut self.packages,
        }
    }

    /// Bytes of every download, across phases.
    pub fn overall(&self) -> ByteProgress {
        ByteProgress::aggregate(self.toolchain.resources.iter().chain(&self.fonts.resources))
    }

    pub fn is_ready(&self) -> bool {
        self.host == PhaseStatus::Fulfilled
    }

    /// First rejected phase and its reason.
    pub fn failure(&self) -> Option<(&'static str, &str)> {
        [
            ("toolchain", &self.toolchain.status),
            ("fonts", &self.fonts.status),
            ("packages", &self.packages.status),
            ("compiler", &self.host),
        ]
        .into_iter()
        .find_map(|(phase, status)| match status {
            PhaseStatus::Rejected(message) => Some((phase, message.as_str())),
            _ => None,
        })
    }

    /// `(phase, state)` pairs for the progress line, plus the overall
    /// download percentage once anything is being downloaded.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        let mut parts = vec![
            ("toolchain", self.toolchain.describe()),
            ("fonts", self.fonts.describe()),
            ("packages", self.packages.describe()),
        ];
        if !self.toolchain.resources.is_empty() || !self.fonts.resources.is_empty() {
            parts.push(("total", format!("{:.0}%", self.overall().percent())));
        }
        parts
    }
}

impl Core {
    /// Run every phase, then initialize the host with the acquired fonts.
    pub(super) async fn bootstrap(&self) -> Result<(), GatewayError> {
        let modules = self.module_urls();
        self.progress.send_replace(InitProgress::starting(
            modules.len(),
            self.options.fonts.len(),
            self.consent.state(),
        ));
        crate::debug!("init"; "bootstrapping toolchain");

        let (toolchain, fonts, packages) = tokio::join!(
            self.track(Phase::Toolchain, self.fetch_modules(&modules)),
            self.track(Phase::Fonts, self.acquire_fonts()),
            self.track(Phase::Packages, async { Ok(()) }),
        );
        toolchain?;
        packages?;
        let fonts = fonts?;

        let outcome = match self
            .broker
            .call(Request::Init(InitData { fonts }), self.options.init_timeout)
            .await
        {
            Ok(ResponseData::Initialized) => Ok(()),
            Ok(other) => Err(GatewayError::Protocol(other.kind())),
            Err(err) => Err(GatewayError::Init(err.to_string().into())),
        };

        self.progress.send_modify(|progress| {
            progress.host = match &outcome {
                Ok(()) => PhaseStatus::Fulfilled,
                Err(err) => PhaseStatus::Rejected(err.to_string()),
            }
        });
        match &outcome {
            Ok(()) => crate::debug!("init"; "compiler ready"),
            Err(err) => crate::log!("init"; "{}", err),
        }
        outcome
    }

    fn module_urls(&self) -> Vec<&str> {
        let manifest = &self.options.manifest;
        [manifest.compiler.as_deref(), manifest.renderer.as_deref()]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Record the outcome of `work` as the status of `phase`.
    async fn track<T>(
        &self,
        phase: Phase,
        work: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        let result = work.await;
        let status = match &result {
            Ok(_) => PhaseStatus::Fulfilled,
            Err(err) => PhaseStatus::Rejected(err.to_string()),
        };
        self.progress
            .send_modify(|progress| progress.phase_mut(phase).status = status);
        result
    }

    fn record(&self, phase: Phase, index: usize, update: ByteProgress) {
        self.progress.send_modify(|progress| {
            if let Some(slot) = progress.phase_mut(phase).resources.get_mut(index) {
                *slot = update;
            }
        });
    }

    /// Warm the cache with the engine modules; the host loads them from there.
    async fn fetch_modules(&self, urls: &[&str]) -> Result<(), GatewayError> {
        let fetches = urls.iter().enumerate().map(|(index, url)| async move {
            self.fetcher
                .fetch(url, &|update| self.record(Phase::Toolchain, index, update))
                .await
                .map_err(|err| init_error(format!("failed to fetch {url}"), &err))
        });
        try_join_all(fetches).await?;
        Ok(())
    }

    /// Font buffers in manifest order.
    async fn acquire_fonts(&self) -> Result<Vec<Arc<[u8]>>, GatewayError> {
        let fonts = self.options.fonts.iter().enumerate();
        try_join_all(fonts.map(|(index, entry)| self.acquire_font(index, entry))).await
    }

    /// Cache, then installed fonts (after consent), then network.
    async fn acquire_font(&self, index: usize, entry: &FontEntry) -> Result<Arc<[u8]>, GatewayError> {
        if let Some(bytes) = self.fetcher.cache().get(&entry.url) {
            crate::debug!("font"; "{} from cache", entry.name);
            return Ok(self.served(index, bytes));
        }

        if let LocalFontAccess::Available(source) = &self.local_fonts
            && self.installed_fonts_allowed().await
            && let Some(bytes) = source.find(&entry.name)
        {
            crate::debug!("font"; "{} from installed fonts", entry.name);
            return Ok(self.served(index, bytes));
        }

        let bytes = self
            .fetcher
            .fetch(&entry.url, &|update| self.record(Phase::Fonts, index, update))
            .await
            .map_err(|err| init_error(format!("failed to fetch font `{}`", entry.name), &err))?;
        Ok(Arc::from(bytes))
    }

    fn served(&self, index: usize, bytes: Vec<u8>) -> Arc<[u8]> {
        self.record(Phase::Fonts, index, ByteProgress::complete(bytes.len() as u64));
        Arc::from(bytes)
    }

    /// Ask for consent once per session; every font waits on the same answer.
    async fn installed_fonts_allowed(&self) -> bool {
        if !self.consent.state().is_decided() {
            self.progress
                .send_modify(|progress| progress.font_access = FontAccess::Requested);
        }
        let granted = self.consent.obtain().await;
        let state = self.consent.state();
        self.progress
            .send_if_modified(|progress| std::mem::replace(&mut progress.font_access, state) != state);
        granted
    }
}

fn init_error(context: String, err: &dyn std::error::Error) -> GatewayError {
    let mut message = context;
    let mut source = Some(err);
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    GatewayError::Init(message.into())
}
