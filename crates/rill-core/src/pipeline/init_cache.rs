//! Per-content cache of parsed initialization segments

use super::parser::ParsedSegment;
use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

/// Maps representation id to its initialization segment.
///
/// At most one fetch per representation is ever in flight: concurrent
/// callers share the cell and await the first caller's request. A failed
/// fetch leaves the cell empty, so the next caller retries.
#[derive(Debug, Default)]
pub struct InitSegmentCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<ParsedSegment>>>>,
}

impl InitSegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch<F, Fut>(
        &self,
        representation_id: &str,
        fetch: F,
    ) -> Result<ParsedSegment>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ParsedSegment>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries
                .entry(representation_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        let segment = cell.get_or_try_init(fetch).await?;
        Ok(segment.clone())
    }

    pub async fn contains(&self, representation_id: &str) -> bool {
        self.entries
            .lock()
            .await
            .get(representation_id)
            .is_some_and(|cell| cell.initialized())
    }

    /// Drop every cached segment; called on stop
    pub async fn evict_all(&self) {
        let mut entries = self.entries.lock().await;
        debug!(count = entries.len(), "Evicting init segment cache");
        entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }
}
