//! Session-wide severity cache

use crate::models::Severity;
use crate::search::SearchError;
use moka::future::Cache;
use std::future::Future;
use std::sync::Arc;

/// Why a severity could not be resolved
#[derive(Debug, thiserror::Error)]
pub enum SeverityLookupError {
    /// The lookup matched no document, or the document had no severity
    #[error("no severity found for '{0}'")]
    NotFound(String),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Signature to last known severity.
///
/// One instance per application session. Entries never expire; a stale
/// severity is accepted in exchange for not re-querying seen signatures.
/// Clones share the same storage.
#[derive(Clone)]
pub struct SeverityCache {
    cache: Cache<String, Severity>,
}

impl SeverityCache {
    pub fn new() -> Self {
        Self {
            cache: Cache::builder().build(),
        }
    }

    pub async fn get(&self, signature: &str) -> Option<Severity> {
        self.cache.get(signature).await
    }

    pub async fn insert(&self, signature: impl Into<String>, severity: Severity) {
        self.cache.insert(signature.into(), severity).await;
    }

    /// Return the cached severity or run `fetch` to resolve it.
    ///
    /// Concurrent callers for the same signature share a single `fetch`.
    /// A failed fetch is not cached, so a later call retries.
    pub async fn get_or_fetch<F>(&self, signature: &str, fetch: F) -> Result<Severity, Arc<SeverityLookupError>>
    where
        F: Future<Output = Result<Severity, SeverityLookupError>>,
    {
        self.cache.try_get_with(signature.to_string(), fetch).await
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.cache.contains_key(signature)
    }
}

impl Default for SeverityCache {
    fn default() -> Self {
        Self::new()
    }
}
