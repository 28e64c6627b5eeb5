//! Network access behind the [`Fetcher`] capability.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use super::{AssetError, ByteProgress, CacheStore};

/// Upper bound for trusting `Content-Length` when preallocating.
const PREALLOC_LIMIT: u64 = 64 * 1024 * 1024;

/// Progress sink for one download.
pub type OnProgress<'a> = &'a (dyn Fn(ByteProgress) + Send + Sync);

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `url` in full, reporting progress as bytes arrive.
    ///
    /// Any non-success response is an error.
    async fn fetch(&self, url: &str, progress: OnProgress<'_>) -> Result<Vec<u8>, AssetError>;
}

/// Plain HTTP(S) fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, AssetError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("xcpc-booklet/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()
            .map_err(|source| AssetError::Http {
                url: String::new(),
                source,
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, progress: OnProgress<'_>) -> Result<Vec<u8>, AssetError> {
        let http = |source| AssetError::Http {
            url: url.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(http)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut body = Vec::with_capacity(total.unwrap_or(0).min(PREALLOC_LIMIT) as usize);
        progress(ByteProgress::new(0, total));

        while let Some(chunk) = response.chunk().await.map_err(http)? {
            body.extend_from_slice(&chunk);
            progress(ByteProgress::new(body.len() as u64, total));
        }

        crate::debug!("fetch"; "{} ({})", url, crate::utils::fmt::bytes(body.len() as u64));
        Ok(body)
    }
}

/// Cache-first wrapper: serve from the [`CacheStore`] when possible,
/// otherwise fetch and store.
///
/// A failed cache write is logged and the body is still returned.
#[derive(Clone)]
pub struct CachedFetcher {
    inner: Arc<dyn Fetcher>,
    cache: CacheStore,
}

impl CachedFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, cache: CacheStore) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }
}

#[async_trait]
impl Fetcher for CachedFetcher {
    async fn fetch(&self, url: &str, progress: OnProgress<'_>) -> Result<Vec<u8>, AssetError> {
        if let Some(bytes) = self.cache.get(url) {
            progress(ByteProgress::complete(bytes.len() as u64));
            crate::debug!("cache"; "hit {}", url);
            return Ok(bytes);
        }

        let bytes = self.inner.fetch(url, progress).await?;
        if let Err(err) = self.cache.put(url, &bytes) {
            crate::log!("cache"; "failed to store {}: {}", url, err);
        }
        Ok(bytes)
    }
}

// ============================================================================
// Test double
// ============================================================================

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use rustc_hash::FxHashMap;

    use super::*;

    /// Serves canned bodies; unknown URLs answer 404.
    #[derive(Debug, Default)]
    pub(crate) struct MapFetcher {
        bodies: FxHashMap<String, Arc<[u8]>>,
        /// Requested URLs, in order.
        pub calls: Mutex<Vec<String>>,
        /// Report no content length.
        pub unknown_length: bool,
        pub delay: Option<Duration>,
    }

    impl MapFetcher {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with(mut self, url: &str, body: &[u8]) -> Self {
            self.bodies.insert(url.to_string(), Arc::from(body));
            self
        }

        pub(crate) fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, url: &str, progress: OnProgress<'_>) -> Result<Vec<u8>, AssetError> {
            self.calls.lock().push(url.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            let body = self.bodies.get(url).ok_or_else(|| AssetError::Status {
                url: url.to_string(),
                status: 404,
            })?;

            let total = (!self.unknown_length).then_some(body.len() as u64);
            progress(ByteProgress::new(0, total));
            progress(ByteProgress::new(body.len() as u64, total));
            Ok(body.to_vec())
        }
    }
}
