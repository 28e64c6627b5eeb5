//! Scripted engine for host and gateway tests.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use super::{Engine, EngineError, EngineInit, EngineLoader, VirtualFs};

/// Shared record of what the fake engine saw.
#[derive(Debug, Default)]
pub(crate) struct FakeLog {
    pub loads: AtomicUsize,
    pub compiles: AtomicUsize,
    /// `/main.typ` of every compile, in order.
    pub sources: Mutex<Vec<String>>,
    /// Paths present in the vfs at the last compile, sorted.
    pub last_paths: Mutex<Vec<String>>,
    pub font_count: AtomicUsize,
    /// Font buffers handed to the last load.
    pub fonts: Mutex<Vec<Arc<[u8]>>>,
    pub package_count: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeLoader {
    pub log: Arc<FakeLog>,
    pub fail_load: bool,
}

impl EngineLoader for FakeLoader {
    fn load(&self, init: EngineInit) -> Result<Box<dyn Engine>, EngineError> {
        self.log.loads.fetch_add(1, Ordering::SeqCst);
        self.log.font_count.store(init.fonts.len(), Ordering::SeqCst);
        self.log.package_count.store(init.packages.len(), Ordering::SeqCst);
        *self.log.fonts.lock() = init.fonts.clone();

        if self.fail_load {
            return Err(EngineError::Load("scripted failure".into()));
        }
        Ok(Box::new(FakeEngine {
            log: self.log.clone(),
        }))
    }
}

/// Compiles by echoing `/main.typ`; a source containing `#panic` panics and
/// one containing `#fail` returns a compile error.
pub(crate) struct FakeEngine {
    log: Arc<FakeLog>,
}

impl FakeEngine {
    fn run(&self, vfs: &VirtualFs) -> Result<String, EngineError> {
        self.log.compiles.fetch_add(1, Ordering::SeqCst);

        let main = vfs
            .get(super::MAIN_PATH)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .unwrap_or_default();

        let mut paths: Vec<String> = vfs.paths().map(str::to_string).collect();
        paths.sort();
        *self.log.last_paths.lock() = paths;
        self.log.sources.lock().push(main.clone());

        if main.contains("#panic") {
            panic!("scripted panic");
        }
        if main.contains("#fail") {
            return Err(EngineError::Compile("error: scripted failure".into()));
        }
        Ok(main)
    }
}

impl Engine for FakeEngine {
    fn compile_pdf(&mut self, vfs: &VirtualFs) -> Result<Vec<u8>, EngineError> {
        let main = self.run(vfs)?;
        Ok(format!("%PDF {}", main.len()).into_bytes())
    }

    fn render_svg(&mut self, vfs: &VirtualFs) -> Result<String, EngineError> {
        self.run(vfs).map(|main| format!("<svg>{}</svg>", main.len()))
    }

    fn render_pages(&mut self, vfs: &VirtualFs) -> Result<Vec<String>, EngineError> {
        self.run(vfs)
            .map(|main| vec![format!("<svg>{}</svg>", main.len()), "<svg/>".into()])
    }
}
