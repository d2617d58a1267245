//! Private in-memory response cache.
//!
//! Caches successful GET responses by URL to avoid refetching actors and
//! collections during a session. Entries expire after a TTL and the total
//! body size is bounded; the oldest entries are evicted first.

#![allow(missing_docs)]

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use apclient_common::config::CacheConfig;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Method, Request, Response, StatusCode,
    header::{CACHE_CONTROL, HeaderMap},
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::transport::{
    SharedTransport, Transport, TransportError, buffer_response, rebuild_response,
};

/// Default byte budget: 1 MiB.
pub const DEFAULT_MAX_BYTES: usize = 1024 * 1024;

/// Default entry lifetime: 5 minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct CachedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    stored_at: Instant,
    sequence: u64,
}

impl CachedResponse {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() > ttl
    }
}

/// Caching transport.
pub struct CacheTransport {
    base: SharedTransport,
    entries: RwLock<HashMap<String, CachedResponse>>,
    max_bytes: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    sequence: AtomicU64,
}

impl CacheTransport {
    #[must_use]
    pub fn new(base: SharedTransport) -> Self {
        Self::with_limits(base, DEFAULT_MAX_BYTES, DEFAULT_TTL)
    }

    #[must_use]
    pub fn with_limits(base: SharedTransport, max_bytes: usize, ttl: Duration) -> Self {
        Self {
            base,
            entries: RwLock::new(HashMap::new()),
            max_bytes,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn from_config(base: SharedTransport, config: &CacheConfig) -> Self {
        Self::with_limits(base, config.max_bytes, config.ttl())
    }

    /// Drop a cached URL, e.g. after submitting a change to it.
    pub async fn invalidate(&self, url: &str) {
        if self.entries.write().await.remove(url).is_some() {
            debug!(url = %url, "Invalidated cached response");
        }
    }

    /// Drop everything.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            bytes: entries.values().map(|entry| entry.body.len()).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn lookup(&self, key: &str) -> Option<CachedResponse> {
        let entry = self.entries.read().await.get(key).cloned()?;
        if entry.is_stale(self.ttl) {
            self.entries.write().await.remove(key);
            return None;
        }
        Some(entry)
    }

    async fn store(&self, key: String, entry: CachedResponse) {
        let size = entry.body.len();
        if size > self.max_bytes {
            debug!(url = %key, size, "Response too large to cache");
            return;
        }

        let mut entries = self.entries.write().await;
        entries.remove(&key);
        let mut used: usize = entries.values().map(|entry| entry.body.len()).sum();
        while used + size > self.max_bytes {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.sequence)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            if let Some(evicted) = entries.remove(&oldest) {
                used -= evicted.body.len();
            }
        }
        entries.insert(key, entry);
    }
}

fn is_no_store(headers: &HeaderMap) -> bool {
    headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|directive| directive.trim().eq_ignore_ascii_case("no-store"))
}

#[async_trait]
impl Transport for CacheTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        if request.method() != Method::GET {
            return self.base.send(request).await;
        }

        let key = request.url().to_string();
        if let Some(entry) = self.lookup(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(url = %key, "Cache hit");
            return Ok(rebuild_response(entry.status, entry.headers, entry.body));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let response = self.base.send(request).await?;
        if response.status() != StatusCode::OK || is_no_store(response.headers()) {
            return Ok(response);
        }

        let (status, headers, body) = buffer_response(response).await?;
        self.store(
            key,
            CachedResponse {
                status,
                headers: headers.clone(),
                body: body.clone(),
                stored_at: Instant::now(),
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            },
        )
        .await;

        Ok(rebuild_response(status, headers, body))
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached responses
    pub entries: usize,
    /// Total body bytes held
    pub bytes: usize,
    /// Requests served from the cache
    pub hits: u64,
    /// GET requests forwarded to the base transport
    pub misses: u64,
}
