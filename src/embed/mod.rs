//! Embedded static resources.
//!
//! - `LIBRARY_TEMPLATE` - the Typst library defining `conf(...)`, registered
//!   at `/lib.typ` in the engine's virtual filesystem during host init
//! - `DEFAULT_CONFIG` - the `booklet.toml` written by `xcpc-booklet init`

/// Typst library template providing the `conf` configuration function.
pub const LIBRARY_TEMPLATE: &str = include_str!("typst/lib.typ");

/// Packages imported by [`LIBRARY_TEMPLATE`]; the default package manifest.
pub const TEMPLATE_PACKAGES: &[&str] = &["@preview/cmarker:0.1.6", "@preview/mitex:0.2.5"];

/// Default configuration file content.
pub const DEFAULT_CONFIG: &str = include_str!("booklet.toml");
