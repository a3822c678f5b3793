//! Cache of rendered notifications keyed by the conclusion number.
use crate::enrichment::{validation, Notification, Quality};
use crate::observability::metrics;
use crate::prelude::*;
use crate::registry::ConclusionNumber;
use crate::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

#[async_trait]
pub(crate) trait LeadCacheStore: Send + Sync {
    async fn get(&self, key: &ConclusionNumber) -> Result<Option<String>>;

    /// Stores the text only if there is no entry for the key yet.
    /// Returns the text that ended up retained for the key.
    async fn put_if_absent(&self, key: &ConclusionNumber, text: &str) -> Result<String>;
}

#[derive(Clone)]
pub(crate) struct LeadCache {
    store: Arc<dyn LeadCacheStore>,
}

impl LeadCache {
    pub(crate) fn new(store: Arc<dyn LeadCacheStore>) -> Self {
        Self { store }
    }

    /// Returns the cached text for the key, or runs `compute` and caches its
    /// result if it is enriched and passes validation. Degraded results are
    /// returned as is without caching, so the next occurrence of the record
    /// gets another chance to be enriched.
    ///
    /// Store failures never fail the call: a failed read falls back to
    /// computing, a failed write returns the computed text.
    pub(crate) async fn get_or_compute<F>(
        &self,
        key: &ConclusionNumber,
        compute: impl FnOnce() -> F,
    ) -> Result<Option<String>>
    where
        F: Future<Output = Option<Notification>>,
    {
        match self.store.get(key).await {
            Ok(Some(text)) => {
                metrics::lead_cache_lookup(true);
                debug!("Lead cache hit");
                return Ok(Some(text));
            }
            Ok(None) => {}
            Err(err) => {
                warn!(err = tracing_err(&err), "Lead cache read failed, computing anyway");
            }
        }

        metrics::lead_cache_lookup(false);

        let Some(notification) = compute().await else {
            return Ok(None);
        };

        if notification.text.trim().is_empty() {
            return Ok(None);
        }

        let cacheable =
            notification.quality == Quality::Enriched && validation::is_quality(&notification.text);

        if !cacheable {
            debug!(quality = ?notification.quality, "Not caching a degraded notification");
            return Ok(Some(notification.text));
        }

        // Another caller may have raced us here, its text wins then
        match self.store.put_if_absent(key, &notification.text).await {
            Ok(retained) => Ok(Some(retained)),
            Err(err) => {
                warn!(err = tracing_err(&err), "Lead cache write failed, sending uncached text");
                Ok(Some(notification.text))
            }
        }
    }
}
