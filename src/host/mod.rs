//! Compiler host: the isolated worker owning the engine.
//!
//! The host processes one [`Envelope`](crate::protocol::Envelope) at a time
//! on its own thread (see [`spawn`]). It keeps three pieces of private state:
//!
//! - the engine, once [`Request::Init`] succeeded
//! - the image registry (uuid -> bytes), replaced wholesale on every
//!   [`Request::RegisterImages`]
//! - the virtual filesystem the engine compiles from
//!
//! Handler errors (and panics) turn into failure replies; the host itself
//! keeps running.

mod worker;


use std::sync::Arc;

use futures::future::try_join_all;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::asset::{AssetError, CacheStore, Fetcher};
use crate::contest::{
    Contest,
    assets::{ASSET_PREFIX, asset_path},
};
use crate::embed::LIBRARY_TEMPLATE;
use crate::engine::{
    Engine, EngineError, EngineInit, EngineLoader, EngineModules, PackageError, PackageRef,
    PackageRegistry, VirtualFs,
};
use crate::protocol::{Request, ResponseData, SvgLayout};
use crate::source::{self, LIBRARY_PATH, MAIN_PATH, OVERRIDE_PATH};

pub use worker::{HostHandle, serve, spawn};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("compiler is not initialized")]
    NotInitialized,

    #[error("failed to fetch {what}")]
    Fetch {
        what: String,
        #[source]
        source: AssetError,
    },

    #[error(transparent)]
    Package(#[from] PackageError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// What the host downloads at init.
#[derive(Debug, Clone, Default)]
pub struct HostManifest {
    pub compiler: Option<String>,
    pub renderer: Option<String>,
    pub packages: Vec<PackageRef>,
    pub package_registry: String,
}

impl HostManifest {
    pub fn from_config(toolchain: &crate::config::ToolchainConfig) -> Self {
        Self {
            compiler: toolchain.compiler.clone(),
            renderer: toolchain.renderer.clone(),
            packages: toolchain.package_refs(),
            package_registry: toolchain.package_registry.clone(),
        }
    }
}

pub struct Host {
    manifest: HostManifest,
    /// Network access; package archives are never cached at this tier.
    fetcher: Arc<dyn Fetcher>,
    /// Where the gateway left the engine modules it downloaded.
    module_cache: Option<CacheStore>,
    loader: Arc<dyn EngineLoader>,
    /// Present once init succeeded.
    engine: Option<Box<dyn Engine>>,
    images: FxHashMap<String, Arc<[u8]>>,
    vfs: VirtualFs,
}

impl Host {
    pub fn new(
        manifest: HostManifest,
        fetcher: Arc<dyn Fetcher>,
        loader: Arc<dyn EngineLoader>,
    ) -> Self {
        Self {
            manifest,
            fetcher,
            module_cache: None,
            loader,
            engine: None,
            images: FxHashMap::default(),
            vfs: VirtualFs::new(),
        }
    }

    /// Read engine modules from `cache` before going to the network.
    pub fn with_module_cache(mut self, cache: CacheStore) -> Self {
        self.module_cache = Some(cache);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    pub async fn handle(&mut self, request: Request) -> Result<ResponseData, HostError> {
        match request {
            Request::Init(data) => self.init(data.fonts).await,
            Request::RegisterImages(data) => Ok(self.register_images(data.images)),
            Request::CompileTypst(data) => self.compile(&data.contest),
            Request::RenderTypst(data) => self.render(&data.contest, data.layout),
        }
    }

    /// Load the engine. A no-op once ready; after a failure the next init
    /// starts over.
    pub(crate) async fn init(&mut self, fonts: Vec<Arc<[u8]>>) -> Result<ResponseData, HostError> {
        if self.is_ready() {
            return Ok(ResponseData::Initialized);
        }

        let engine = self.bootstrap(fonts).await?;
        self.engine = Some(engine);
        self.vfs.insert_source(LIBRARY_PATH, LIBRARY_TEMPLATE);
        crate::debug!("host"; "compiler ready");
        Ok(ResponseData::Initialized)
    }

    async fn bootstrap(&self, fonts: Vec<Arc<[u8]>>) -> Result<Box<dyn Engine>, HostError> {
        let (archives, modules) =
            futures::try_join!(self.fetch_packages(), self.fetch_modules())?;

        let mut packages = PackageRegistry::new();
        for (package, archive) in self.manifest.packages.iter().zip(&archives) {
            let files = packages.insert_archive(package, archive)?;
            crate::debug!("host"; "unpacked {} ({} files)", package, files);
        }

        let init = EngineInit {
            modules,
            fonts,
            packages,
        };
        Ok(self.loader.load(init)?)
    }

    async fn fetch_packages(&self) -> Result<Vec<Vec<u8>>, HostError> {
        let fetches = self.manifest.packages.iter().map(|package| async move {
            let url = package.archive_url(&self.manifest.package_registry);
            self.fetcher
                .fetch(&url, &|_| {})
                .await
                .map_err(|source| HostError::Fetch {
                    what: format!("package {package}"),
                    source,
                })
        });
        try_join_all(fetches).await
    }

    async fn fetch_modules(&self) -> Result<EngineModules, HostError> {
        let compiler = self.fetch_module("compiler", self.manifest.compiler.as_deref());
        let renderer = self.fetch_module("renderer", self.manifest.renderer.as_deref());
        let (compiler, renderer) = futures::try_join!(compiler, renderer)?;
        Ok(EngineModules { compiler, renderer })
    }

    async fn fetch_module(
        &self,
        what: &str,
        url: Option<&str>,
    ) -> Result<Option<Arc<[u8]>>, HostError> {
        let Some(url) = url else {
            return Ok(None);
        };
        if let Some(bytes) = self.module_cache.as_ref().and_then(|cache| cache.get(url)) {
            crate::debug!("host"; "{} module from cache", what);
            return Ok(Some(Arc::from(bytes)));
        }
        let bytes = self
            .fetcher
            .fetch(url, &|_| {})
            .await
            .map_err(|source| HostError::Fetch {
                what: format!("{what} module"),
                source,
            })?;
        Ok(Some(Arc::from(bytes)))
    }

    fn register_images(&mut self, images: FxHashMap<String, Arc<[u8]>>) -> ResponseData {
        self.images = images;
        crate::debug!("host"; "registered {} images", self.images.len());
        ResponseData::ImagesRegistered(self.images.len())
    }

    /// Lay out the virtual filesystem for `contest`.
    ///
    /// Returns the engine together with the filesystem it compiles from.
    fn prepare(&mut self, contest: &Contest) -> Result<(&mut dyn Engine, &VirtualFs), HostError> {
        let Self {
            engine,
            images,
            vfs,
            ..
        } = self;
        let Some(engine) = engine else {
            return Err(HostError::NotInitialized);
        };

        vfs.clear_prefix(ASSET_PREFIX);
        for (uuid, bytes) in images.iter() {
            vfs.insert(&asset_path(uuid), bytes.clone());
        }

        match &contest.template {
            Some(template) => vfs.insert_source(OVERRIDE_PATH, template),
            None => {
                vfs.remove(OVERRIDE_PATH);
            }
        }
        vfs.insert_source(MAIN_PATH, &source::render_main(contest));

        Ok((engine.as_mut(), vfs))
    }

    fn compile(&mut self, contest: &Contest) -> Result<ResponseData, HostError> {
        let (engine, vfs) = self.prepare(contest)?;
        let pdf = engine.compile_pdf(vfs)?;
        Ok(ResponseData::Pdf(Arc::from(pdf)))
    }

    fn render(&mut self, contest: &Contest, layout: SvgLayout) -> Result<ResponseData, HostError> {
        let (engine, vfs) = self.prepare(contest)?;
        match layout {
            SvgLayout::Merged => Ok(ResponseData::Svg(engine.render_svg(vfs)?)),
            SvgLayout::Pages => Ok(ResponseData::Pages(engine.render_pages(vfs)?)),
        }
    }
}
