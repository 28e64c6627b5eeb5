//! Typst `World` over the virtual filesystem.
//!
//! File access is limited to two sources:
//! - the [`VirtualFs`] for files of the document itself
//! - the [`PackageRegistry`] for `@namespace/name:version` imports
//!
//! Anything else resolves to `NotFound`.

use std::path::PathBuf;

use chrono::Datelike;
use typst::{
    Library,
    diag::{FileError, FileResult, PackageError, SourceDiagnostic},
    foundations::{Bytes, Datetime},
    syntax::{FileId, Source, VirtualPath},
    text::{Font, FontBook},
    utils::LazyHash,
};

use super::{MAIN_PATH, PackageRegistry, VirtualFs};

pub(super) struct BookletWorld<'a> {
    library: &'a LazyHash<Library>,
    book: &'a LazyHash<FontBook>,
    fonts: &'a [Font],
    packages: &'a PackageRegistry,
    vfs: &'a VirtualFs,
    main: FileId,
}

impl<'a> BookletWorld<'a> {
    pub(super) fn new(
        library: &'a LazyHash<Library>,
        book: &'a LazyHash<FontBook>,
        fonts: &'a [Font],
        packages: &'a PackageRegistry,
        vfs: &'a VirtualFs,
    ) -> Self {
        Self {
            library,
            book,
            fonts,
            packages,
            vfs,
            main: FileId::new(None, VirtualPath::new(MAIN_PATH)),
        }
    }

    fn bytes(&self, id: FileId) -> FileResult<Bytes> {
        let path = id.vpath().as_rooted_path().to_string_lossy().replace('\\', "/");

        if let Some(package) = id.package() {
            let spec = package.to_string();
            if !self.packages.contains_package(&spec) {
                return Err(FileError::Package(PackageError::NotFound(package.clone())));
            }
            return self
                .packages
                .get(&spec, &path)
                .map(|bytes| Bytes::new(bytes.clone()))
                .ok_or_else(|| FileError::NotFound(PathBuf::from(path)));
        }

        self.vfs
            .get(&path)
            .map(|bytes| Bytes::new(bytes.clone()))
            .ok_or_else(|| FileError::NotFound(PathBuf::from(path)))
    }

    /// Render diagnostics as `error: message` lines with file and line.
    pub(super) fn describe(&self, diagnostics: &[SourceDiagnostic]) -> String {
        diagnostics
            .iter()
            .map(|diag| self.describe_one(diag))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn describe_one(&self, diag: &SourceDiagnostic) -> String {
        let mut out = format!("error: {}", diag.message);

        if let Some(id) = diag.span.id()
            && let Ok(source) = typst::World::source(self, id)
            && let Some(range) = source.range(diag.span)
        {
            let line = source.text()[..range.start].matches('\n').count() + 1;
            let path = id.vpath().as_rooted_path().display().to_string();
            let location = match id.package() {
                Some(package) => format!("{package}{path}"),
                None => path,
            };
            out.push_str(&format!("\n  --> {location}:{line}"));
        }
        out
    }
}

impl typst::World for BookletWorld<'_> {
    fn library(&self) -> &LazyHash<Library> {
        self.library
    }

    fn book(&self) -> &LazyHash<FontBook> {
        self.book
    }

    fn main(&self) -> FileId {
        self.main
    }

    fn source(&self, id: FileId) -> FileResult<Source> {
        let bytes = self.bytes(id)?;
        let text = std::str::from_utf8(&bytes).map_err(|_| FileError::InvalidUtf8)?;
        let text = text.trim_start_matches('\u{feff}');
        Ok(Source::new(id, text.to_string()))
    }

    fn file(&self, id: FileId) -> FileResult<Bytes> {
        self.bytes(id)
    }

    fn font(&self, index: usize) -> Option<Font> {
        self.fonts.get(index).cloned()
    }

    fn today(&self, offset: Option<i64>) -> Option<Datetime> {
        let now = chrono::Utc::now();
        let date = match offset {
            Some(hours) => (now + chrono::Duration::hours(hours)).date_naive(),
            None => chrono::Local::now().date_naive(),
        };
        Datetime::from_ymd(date.year(), date.month() as u8, date.day() as u8)
    }
}
