//! Pre-fetched Typst packages served from memory.
//!
//! Packages arrive as `.tar.gz` archives from the package registry
//! (`{registry}/{namespace}/{name}-{version}.tar.gz`) and are unpacked once
//! at host init. Afterwards the engine only ever reads them by path.

use std::{fmt, io::Read, str::FromStr, sync::Arc};

use flate2::read::GzDecoder;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Upper bound for trusting a tar header's size when preallocating.
const PREALLOC_LIMIT: u64 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("invalid package spec `{0}` (expected `@namespace/name:version`)")]
    InvalidSpec(String),

    #[error("failed to unpack {spec}: {source}")]
    Archive {
        spec: String,
        #[source]
        source: std::io::Error,
    },
}

/// `@namespace/name:version`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageRef {
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl PackageRef {
    /// Archive location under `registry`.
    pub fn archive_url(&self, registry: &str) -> String {
        format!(
            "{}/{}/{}-{}.tar.gz",
            registry.trim_end_matches('/'),
            self.namespace,
            self.name,
            self.version
        )
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}/{}:{}", self.namespace, self.name, self.version)
    }
}

impl FromStr for PackageRef {
    type Err = PackageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PackageError::InvalidSpec(s.to_string());
        let rest = s.strip_prefix('@').ok_or_else(invalid)?;
        let (namespace, rest) = rest.split_once('/').ok_or_else(invalid)?;
        let (name, version) = rest.split_once(':').ok_or_else(invalid)?;

        if [namespace, name, version].iter().any(|part| part.is_empty()) {
            return Err(invalid());
        }

        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// Unpacked package files keyed by spec string, then by rooted path.
#[derive(Debug, Clone, Default)]
pub struct PackageRegistry {
    packages: FxHashMap<String, FxHashMap<String, Arc<[u8]>>>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unpack a gzipped tarball and register its regular files.
    ///
    /// Returns the number of files registered.
    pub fn insert_archive(
        &mut self,
        package: &PackageRef,
        archive: &[u8],
    ) -> Result<usize, PackageError> {
        let spec = package.to_string();
        let wrap = |source| PackageError::Archive {
            spec: spec.clone(),
            source,
        };

        let mut tar = tar::Archive::new(GzDecoder::new(archive));
        let mut files = FxHashMap::default();

        for entry in tar.entries().map_err(wrap)? {
            let mut entry = entry.map_err(wrap)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }

            let path = entry.path().map_err(wrap)?;
            let key = format!("/{}", path.to_string_lossy().trim_start_matches("./"));

            let mut bytes = Vec::with_capacity(entry.size().min(PREALLOC_LIMIT) as usize);
            entry.read_to_end(&mut bytes).map_err(wrap)?;
            files.insert(key, Arc::from(bytes));
        }

        let count = files.len();
        self.packages.insert(spec, files);
        Ok(count)
    }

    /// Register a single file directly.
    pub fn insert_file(&mut self, spec: &str, path: &str, bytes: impl Into<Arc<[u8]>>) {
        let path = format!("/{}", path.trim_start_matches('/'));
        self.packages
            .entry(spec.to_string())
            .or_default()
            .insert(path, bytes.into());
    }

    pub fn contains_package(&self, spec: &str) -> bool {
        self.packages.contains_key(spec)
    }

    pub fn get(&self, spec: &str, path: &str) -> Option<&Arc<[u8]>> {
        let path = format!("/{}", path.trim_start_matches('/'));
        self.packages.get(spec)?.get(&path)
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::{Compression, write::GzEncoder};

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, bytes) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *bytes).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_ref() {
        let package: PackageRef = "@preview/cmarker:0.1.6".parse().unwrap();
        assert_eq!(package.namespace, "preview");
        assert_eq!(package.name, "cmarker");
        assert_eq!(package.version, "0.1.6");
        assert_eq!(package.to_string(), "@preview/cmarker:0.1.6");
    }

    #[test]
    fn test_parse_package_ref_rejects_malformed() {
        for spec in ["preview/cmarker:0.1.6", "@preview/cmarker", "@preview/:1.0", "@/x:1"] {
            assert!(spec.parse::<PackageRef>().is_err(), "{spec}");
        }
    }

    #[test]
    fn test_archive_url() {
        let package: PackageRef = "@preview/mitex:0.2.5".parse().unwrap();
        assert_eq!(
            package.archive_url("https://packages.typst.org/"),
            "https://packages.typst.org/preview/mitex-0.2.5.tar.gz"
        );
    }

    #[test]
    fn test_insert_archive() {
        let package: PackageRef = "@preview/demo:1.0.0".parse().unwrap();
        let archive = tarball(&[
            ("typst.toml", b"[package]\nname = \"demo\""),
            ("src/lib.typ", b"#let hello = [hi]"),
        ]);

        let mut registry = PackageRegistry::new();
        let count = registry.insert_archive(&package, &archive).unwrap();

        assert_eq!(count, 2);
        assert!(registry.contains_package("@preview/demo:1.0.0"));
        assert_eq!(
            registry.get("@preview/demo:1.0.0", "src/lib.typ").unwrap().as_ref(),
            b"#let hello = [hi]"
        );
        assert!(registry.get("@preview/demo:1.0.0", "/missing.typ").is_none());
    }

    #[test]
    fn test_oversized_header_does_not_preallocate() {
        use flate2::{Compression, write::GzEncoder};

        // header claims a terabyte, body holds three bytes
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(1 << 40);
        header.set_mode(0o644);
        builder.append_data(&mut header, "lib.typ", b"abc".as_slice()).unwrap();
        let archive = builder.into_inner().unwrap().finish().unwrap();

        let package: PackageRef = "@preview/demo:1.0.0".parse().unwrap();
        let mut registry = PackageRegistry::new();
        if registry.insert_archive(&package, &archive).is_ok() {
            let file = registry.get("@preview/demo:1.0.0", "lib.typ").unwrap();
            assert!(file.len() < 4096);
        }
    }

    #[test]
    fn test_insert_archive_rejects_garbage() {
        let package: PackageRef = "@preview/demo:1.0.0".parse().unwrap();
        let mut registry = PackageRegistry::new();
        assert!(registry.insert_archive(&package, b"not a tarball").is_err());
        assert!(registry.is_empty());
    }
}
