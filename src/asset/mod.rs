//! Remote resources: engine modules, fonts and package archives.
//!
//! - [`Fetcher`]: network capability (HTTP in production, canned in tests)
//! - [`CacheStore`] / [`CachedFetcher`]: cache-first access by URL
//! - [`LocalFontAccess`] / [`FontConsent`]: installed fonts behind consent
//! - [`ByteProgress`]: download progress that aggregates safely

mod cache;
mod fetch;
mod font;
mod progress;

pub use cache::CacheStore;
pub use fetch::{CachedFetcher, Fetcher, HttpFetcher};
pub use font::{FontAccess, FontConsent, LocalFontAccess};
pub use progress::ByteProgress;

#[cfg(test)]
pub(crate) use fetch::fake::MapFetcher;
#[cfg(test)]
pub(crate) use font::fake::MapFonts;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("request to `{url}` failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("`{url}` answered with status {status}")]
    Status { url: String, status: u16 },
}
