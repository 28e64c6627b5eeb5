//! `[toolchain]` section configuration.
//!
//! Where the engine, fonts and packages come from.
//!
//! # Example
//!
//! ```toml
//! [toolchain]
//! packages = ["@preview/cmarker:0.1.6", "@preview/mitex:0.2.5"]
//! package_registry = "https://packages.typst.org"
//! system_fonts = true         # Offer installed fonts before downloading
//!
//! [[toolchain.fonts]]
//! name = "Linux Libertine"
//! url = "https://cdn.example.com/LinLibertine_R.ttf"
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;
use crate::engine::PackageRef;

const FONT_BASE: &str = "https://cdn.jsdelivr.net/gh/typst/typst-assets@v0.13.1/files/fonts";

/// One font of the manifest: the name to look for among installed fonts and
/// the URL to download it from otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontEntry {
    pub name: String,
    pub url: String,
}

impl FontEntry {
    fn bundled(name: &str, file: &str) -> Self {
        Self {
            name: name.to_string(),
            url: format!("{FONT_BASE}/{file}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler module URL (engines that load external modules only).
    pub compiler: Option<String>,

    /// Renderer module URL.
    pub renderer: Option<String>,

    /// Package specs fetched at init, `@namespace/name:version`.
    pub packages: Vec<String>,

    pub package_registry: String,

    /// Offer installed fonts (after consent) before downloading.
    pub system_fonts: bool,

    pub fonts: Vec<FontEntry>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            compiler: None,
            renderer: None,
            packages: crate::embed::TEMPLATE_PACKAGES
                .iter()
                .map(|spec| spec.to_string())
                .collect(),
            package_registry: "https://packages.typst.org".into(),
            system_fonts: true,
            fonts: vec![
                FontEntry::bundled("Linux Libertine", "LinLibertine_R.ttf"),
                FontEntry::bundled("New Computer Modern Math", "NewCMMath-Regular.otf"),
                FontEntry::bundled("DejaVu Sans Mono", "DejaVuSansMono.ttf"),
            ],
        }
    }
}

impl ToolchainConfig {
    /// Parsed package specs; invalid entries are reported by [`Self::validate`].
    pub fn package_refs(&self) -> Vec<PackageRef> {
        self.packages
            .iter()
            .filter_map(|spec| spec.parse().ok())
            .collect()
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.fonts.is_empty() {
            diag.error_with_hint(
                "toolchain.fonts",
                "no fonts configured",
                "add at least one [[toolchain.fonts]] entry",
            );
        }
        for font in &self.fonts {
            if font.name.trim().is_empty() || font.url.trim().is_empty() {
                diag.error("toolchain.fonts", "every font needs a `name` and a `url`");
            }
        }
        for spec in &self.packages {
            if let Err(err) = spec.parse::<PackageRef>() {
                diag.error("toolchain.packages", err.to_string());
            }
        }
        if !self.packages.is_empty() && !self.package_registry.starts_with("http") {
            diag.error_with_hint(
                "toolchain.package_registry",
                format!("`{}` is not an http(s) URL", self.package_registry),
                "the default is https://packages.typst.org",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ConfigDiagnostics, test_parse_config};

    #[test]
    fn test_toolchain_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.toolchain.fonts.len(), 3);
        assert_eq!(config.toolchain.package_refs().len(), 2);
        assert!(config.toolchain.compiler.is_none());
        assert!(config.toolchain.system_fonts);
    }

    #[test]
    fn test_toolchain_fonts_replace_defaults() {
        let config = test_parse_config(
            "[[toolchain.fonts]]\nname = \"Noto Serif CJK SC\"\nurl = \"https://cdn/noto.otf\"",
        );
        assert_eq!(config.toolchain.fonts.len(), 1);
        assert_eq!(config.toolchain.fonts[0].name, "Noto Serif CJK SC");
    }

    #[test]
    fn test_toolchain_validation() {
        let config = test_parse_config(
            "[toolchain]\nfonts = []\npackages = [\"cmarker\"]\npackage_registry = \"ftp://x\"",
        );
        let mut diag = ConfigDiagnostics::new();
        config.toolchain.validate(&mut diag);
        assert_eq!(diag.len(), 3);
    }
}
