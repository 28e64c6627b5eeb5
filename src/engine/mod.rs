//! Typesetting engine boundary.
//!
//! The host talks to the engine through two traits:
//!
//! - [`EngineLoader`] builds an engine from fonts, packages and (optionally)
//!   downloaded engine modules
//! - [`Engine`] compiles whatever `/main.typ` the [`VirtualFs`] currently holds
//!
//! The production implementation ([`TypstLoader`]) links the Typst compiler
//! directly; tests substitute a scripted engine.

mod package;
mod native;
mod world;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

pub use package::{PackageError, PackageRef, PackageRegistry};
#[cfg(test)]
pub(crate) use package::tarball;
pub use native::TypstLoader;

/// Entry point every compile starts from.
pub const MAIN_PATH: &str = crate::source::MAIN_PATH;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no usable fonts were supplied")]
    NoFonts,

    #[error("{0}")]
    Compile(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("engine produced an empty {0}")]
    Empty(&'static str),

    #[error("engine failed to load: {0}")]
    Load(String),
}

/// Downloaded engine binaries, when the toolchain manifest names any.
#[derive(Debug, Clone, Default)]
pub struct EngineModules {
    pub compiler: Option<Arc<[u8]>>,
    pub renderer: Option<Arc<[u8]>>,
}

/// Everything an engine needs at load time.
#[derive(Debug, Default)]
pub struct EngineInit {
    pub modules: EngineModules,
    pub fonts: Vec<Arc<[u8]>>,
    pub packages: PackageRegistry,
}

pub trait EngineLoader: Send + Sync {
    fn load(&self, init: EngineInit) -> Result<Box<dyn Engine>, EngineError>;
}

pub trait Engine: Send + Sync {
    /// Compile `/main.typ` to PDF bytes.
    fn compile_pdf(&mut self, vfs: &VirtualFs) -> Result<Vec<u8>, EngineError>;

    /// Render every page into one SVG document.
    fn render_svg(&mut self, vfs: &VirtualFs) -> Result<String, EngineError>;

    /// Render one SVG document per page.
    fn render_pages(&mut self, vfs: &VirtualFs) -> Result<Vec<String>, EngineError>;
}

// ============================================================================
// Virtual filesystem
// ============================================================================

/// In-memory files visible to the engine, keyed by absolute path.
///
/// Nothing outside this map (and the package registry) is reachable from a
/// document.
#[derive(Debug, Clone, Default)]
pub struct VirtualFs {
    files: FxHashMap<String, Arc<[u8]>>,
}

impl VirtualFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, bytes: impl Into<Arc<[u8]>>) {
        self.files.insert(normalize(path), bytes.into());
    }

    pub fn insert_source(&mut self, path: &str, text: &str) {
        self.insert(path, text.as_bytes());
    }

    pub fn remove(&mut self, path: &str) -> bool {
        self.files.remove(&normalize(path)).is_some()
    }

    pub fn get(&self, path: &str) -> Option<&Arc<[u8]>> {
        self.files.get(&normalize(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(&normalize(path))
    }

    /// Drop every file under `prefix`.
    pub fn clear_prefix(&mut self, prefix: &str) {
        let prefix = normalize(prefix);
        self.files.retain(|path, _| !path.starts_with(&prefix));
    }

    #[cfg(test)]
    pub(crate) fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    format!("/{trimmed}")
}
