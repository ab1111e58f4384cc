//! Source adapter contract, adapter registry, and the built-in adapters.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobagg_core::RawFieldSet;
use jobagg_storage::FetchError;
use thiserror::Error;
use uuid::Uuid;

mod fixture;
mod html;

pub use fixture::{load_raw_fixture, FixtureAdapter, StaticAdapter};
pub use html::{
    html_adapter_for_source, indeed_preset, linkedin_preset, naukri_preset, parse_listing_html,
    HtmlListingAdapter, ListingPreset, ListingSelectors,
};

pub const CRATE_NAME: &str = "jobagg-adapters";

/// Per-run information handed to every adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl AdapterContext {
    pub fn new(run_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self { run_id, started_at }
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("all {pages} listing page(s) failed, last error: {last}")]
    AllPagesFailed { pages: usize, last: String },
    #[error("fixture {path}: {message}")]
    Fixture { path: String, message: String },
    #[error("{0}")]
    Message(String),
}

/// One external listing provider: produce raw field-sets or fail.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;

    async fn fetch(&self, ctx: &AdapterContext) -> Result<Vec<RawFieldSet>, AdapterError>;
}

#[derive(Clone)]
struct RegisteredAdapter {
    adapter: Arc<dyn SourceAdapter>,
    enabled: bool,
}

/// Source name to adapter mapping. Registration order is the enumeration order of a run.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    entries: Vec<RegisteredAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enabled adapter, replacing any previous adapter with the same source id
    /// in place.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.insert(adapter, true);
    }

    /// Registers an adapter that only runs when requested by name.
    pub fn register_disabled(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.insert(adapter, false);
    }

    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    fn insert(&mut self, adapter: Arc<dyn SourceAdapter>, enabled: bool) {
        let entry = RegisteredAdapter { adapter, enabled };
        match self
            .entries
            .iter_mut()
            .find(|e| e.adapter.source_id() == entry.adapter.source_id())
        {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.entries
            .iter()
            .find(|e| e.adapter.source_id() == source_id)
            .map(|e| Arc::clone(&e.adapter))
    }

    pub fn enabled(&self) -> Vec<Arc<dyn SourceAdapter>> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| Arc::clone(&e.adapter))
            .collect()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.adapter.source_id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("sources", &self.source_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_keeps_registration_order_and_replaces_in_place() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(StaticAdapter::new("naukri", vec![])));
        registry.register(Arc::new(StaticAdapter::new("indeed", vec![])));
        registry.register_disabled(Arc::new(StaticAdapter::new("seed", vec![])));
        registry.register(Arc::new(StaticAdapter::new(
            "naukri",
            vec![RawFieldSet::new("naukri").with_title("x")],
        )));

        assert_eq!(registry.source_ids(), vec!["naukri", "indeed", "seed"]);
        let enabled: Vec<_> = registry
            .enabled()
            .iter()
            .map(|a| a.source_id().to_string())
            .collect();
        assert_eq!(enabled, vec!["naukri", "indeed"]);
        assert!(registry.get("seed").is_some());
        assert!(registry.get("monster").is_none());
    }

    #[tokio::test]
    async fn replaced_adapter_is_the_one_invoked() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(StaticAdapter::new("naukri", vec![])));
        registry.register(Arc::new(StaticAdapter::new(
            "naukri",
            vec![RawFieldSet::new("naukri").with_title("SOC Analyst")],
        )));
        let ctx = AdapterContext::new(Uuid::nil(), Utc::now());
        let adapter = registry.get("naukri").unwrap();
        assert_eq!(adapter.fetch(&ctx).await.unwrap().len(), 1);
    }
}
