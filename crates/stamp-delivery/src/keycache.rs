// SPDX-FileCopyrightText: 2026 Stamp Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Expiry-bearing cache for the HR API credential.
//!
//! The credential is refreshed on a pull-based check: `current()` returns
//! the cached key only while its TTL holds and otherwise re-reads the
//! source. Nothing is cached forever, so a rotated key is picked up within
//! one TTL without a restart.

use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use stamp_config::model::HrConfig;

/// Where the key comes from on a refresh.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Fixed key from the config file.
    Static(String),
    /// Read from an environment variable on every refresh.
    Env(String),
}

struct CachedKey {
    key: String,
    fetched_at: Instant,
}

/// Pull-refreshed credential cache.
pub struct ApiKeyCache {
    source: KeySource,
    ttl: Duration,
    cached: Mutex<Option<CachedKey>>,
}

impl ApiKeyCache {
    pub fn new(source: KeySource, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Build from config: an inline key wins, otherwise the named
    /// environment variable is consulted on each refresh.
    pub fn from_config(config: &HrConfig) -> Self {
        let source = match &config.api_key {
            Some(key) => KeySource::Static(key.clone()),
            None => KeySource::Env(config.api_key_env.clone()),
        };
        Self::new(source, Duration::from_secs(config.api_key_ttl_secs))
    }

    /// The current key, refreshing if the cached one expired.
    ///
    /// Returns `None` when no key is available from the source; callers
    /// send unauthenticated requests and let the backend reject them.
    pub async fn current(&self) -> Option<String> {
        let mut guard = self.cached.lock().await;
        if let Some(cached) = guard.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return Some(cached.key.clone());
        }

        let fresh = self.fetch();
        *guard = fresh.clone().map(|key| {
            debug!("HR API key refreshed");
            CachedKey {
                key,
                fetched_at: Instant::now(),
            }
        });
        fresh
    }

    /// Drop the cached key so the next `current()` refreshes.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    fn fetch(&self) -> Option<String> {
        match &self.source {
            KeySource::Static(key) => Some(key.clone()),
            KeySource::Env(var) => std::env::var(var).ok().filter(|v| !v.is_empty()),
        }
    }
}
