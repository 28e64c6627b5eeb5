//! Statically linked Typst engine.

use std::sync::Arc;

use typst::{
    Library, LibraryExt,
    diag::Warned,
    foundations::Bytes,
    layout::{Abs, PagedDocument},
    text::{Font, FontBook},
    utils::LazyHash,
};
use typst_pdf::PdfOptions;

use super::{
    Engine, EngineError, EngineInit, EngineLoader, PackageRegistry, VirtualFs,
    world::BookletWorld,
};

/// Gap between pages in merged SVG output.
const PAGE_GAP: f64 = 8.0;

/// Builds a [`TypstEngine`] from the supplied fonts only.
///
/// Typst's bundled fonts are not added, so documents render with exactly
/// the fonts the toolchain manifest names.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypstLoader;

impl EngineLoader for TypstLoader {
    fn load(&self, init: EngineInit) -> Result<Box<dyn Engine>, EngineError> {
        if init.modules.compiler.is_some() || init.modules.renderer.is_some() {
            crate::debug!("host"; "engine modules supplied, using the linked compiler");
        }
        Ok(Box::new(TypstEngine::new(&init.fonts, init.packages)?))
    }
}

pub struct TypstEngine {
    library: LazyHash<Library>,
    book: LazyHash<FontBook>,
    fonts: Vec<Font>,
    packages: PackageRegistry,
}

impl TypstEngine {
    pub fn new(buffers: &[Arc<[u8]>], packages: PackageRegistry) -> Result<Self, EngineError> {
        let fonts: Vec<Font> = buffers
            .iter()
            .flat_map(|buffer| Font::iter(Bytes::new(buffer.clone())))
            .collect();

        if fonts.is_empty() {
            return Err(EngineError::NoFonts);
        }

        crate::debug!("host"; "loaded {} font faces from {} buffers", fonts.len(), buffers.len());

        Ok(Self {
            library: LazyHash::new(Library::default()),
            book: LazyHash::new(FontBook::from_fonts(&fonts)),
            fonts,
            packages,
        })
    }

    fn world<'a>(&'a self, vfs: &'a VirtualFs) -> BookletWorld<'a> {
        BookletWorld::new(&self.library, &self.book, &self.fonts, &self.packages, vfs)
    }

    fn compile(&self, world: &BookletWorld<'_>) -> Result<PagedDocument, EngineError> {
        let Warned { output, warnings } = typst::compile::<PagedDocument>(world);
        if !warnings.is_empty() {
            crate::debug!("host"; "{} compile warnings\n{}", warnings.len(), world.describe(&warnings));
        }
        output.map_err(|errors| EngineError::Compile(world.describe(&errors)))
    }
}

impl Engine for TypstEngine {
    fn compile_pdf(&mut self, vfs: &VirtualFs) -> Result<Vec<u8>, EngineError> {
        let world = self.world(vfs);
        let document = self.compile(&world)?;
        let pdf = typst_pdf::pdf(&document, &PdfOptions::default())
            .map_err(|errors| EngineError::Export(world.describe(&errors)))?;

        if pdf.is_empty() {
            return Err(EngineError::Empty("pdf"));
        }
        Ok(pdf)
    }

    fn render_svg(&mut self, vfs: &VirtualFs) -> Result<String, EngineError> {
        let world = self.world(vfs);
        let document = self.compile(&world)?;
        let svg = typst_svg::svg_merged(&document, Abs::pt(PAGE_GAP));

        if svg.is_empty() {
            return Err(EngineError::Empty("svg"));
        }
        Ok(svg)
    }

    fn render_pages(&mut self, vfs: &VirtualFs) -> Result<Vec<String>, EngineError> {
        let world = self.world(vfs);
        let document = self.compile(&world)?;
        let pages: Vec<String> = document.pages.iter().map(typst_svg::svg).collect();

        if pages.is_empty() {
            return Err(EngineError::Empty("page list"));
        }
        Ok(pages)
    }
}
