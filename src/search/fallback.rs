//! Deterministic provider chain.

use super::{dedupe_by_url, prioritize, SearchItem, SearchProvider};
use crate::error::{NewscastError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Walks providers in priority order until exactly `max_sources` unique items are found.
pub struct FallbackSearch {
    providers: Vec<Arc<dyn SearchProvider>>,
    max_sources: usize,
    results_per_provider: usize,
}

impl FallbackSearch {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        max_sources: usize,
        results_per_provider: usize,
    ) -> Self {
        Self {
            providers,
            max_sources,
            results_per_provider,
        }
    }

    pub fn providers(&self) -> &[Arc<dyn SearchProvider>] {
        &self.providers
    }

    /// Collect sources; erroring providers are skipped.
    pub async fn collect(&self, query: &str) -> Result<Vec<SearchItem>> {
        let mut items: Vec<SearchItem> = Vec::new();
        let mut errors = Vec::new();

        for provider in prioritize(&self.providers, query) {
            if items.len() >= self.max_sources {
                break;
            }

            match provider.search(query, self.results_per_provider).await {
                Ok(found) => {
                    info!("{} returned {} results", provider.name(), found.len());
                    items.extend(found);
                    items = dedupe_by_url(items);
                }
                Err(e) => {
                    warn!("{} failed, trying next provider: {}", provider.name(), e);
                    errors.push(format!("{}: {}", provider.name(), e));
                }
            }
        }

        items.truncate(self.max_sources);

        if items.is_empty() && !errors.is_empty() {
            return Err(NewscastError::Search(format!(
                "all search providers failed ({})",
                errors.join("; ")
            )));
        }

        if items.len() < self.max_sources {
            warn!(
                "Only found {} sources (expected {})",
                items.len(),
                self.max_sources
            );
        }

        Ok(items)
    }
}
