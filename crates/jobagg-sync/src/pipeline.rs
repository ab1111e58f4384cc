use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use jobagg_adapters::{AdapterContext, AdapterRegistry, SourceAdapter};
use jobagg_core::{
    IdentityKey, MatchMode, NormalizedRecord, RawFieldSet, RunErrorKind, RunSummary,
};
use jobagg_storage::RecordStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::dedup::deduplicate_tagged;
use crate::error::SyncError;
use crate::merge::{MergeOutcome, MergePersister};
use crate::normalize::{DropReason, Normalizer};

/// Parameters of one aggregation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Run only this source; `None` runs every enabled source.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub mode: MatchMode,
    /// Deactivate the invoked sources' entities before persisting the fresh batch.
    #[serde(default)]
    pub purge: bool,
}

impl RunRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    /// Builds a request from loosely typed trigger input (query string, CLI flags). Blank
    /// source and mode values mean "all" and strict.
    pub fn parse(
        source: Option<&str>,
        mode: Option<&str>,
        purge: bool,
    ) -> Result<Self, SyncError> {
        let source = source
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let mode = match mode.map(str::trim).filter(|m| !m.is_empty()) {
            Some(raw) => raw.parse()?,
            None => MatchMode::default(),
        };
        Ok(Self {
            source,
            mode,
            purge,
        })
    }
}

/// Fan-out/fan-in orchestrator: adapters → normalizer → deduplicator → merge-persister.
pub struct AggregationPipeline {
    registry: AdapterRegistry,
    persister: MergePersister,
    normalizer: Normalizer,
}

impl AggregationPipeline {
    pub fn new(
        registry: AdapterRegistry,
        store: Arc<dyn RecordStore>,
        normalizer: Normalizer,
    ) -> Self {
        Self {
            registry,
            persister: MergePersister::new(store),
            normalizer,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        self.persister.store()
    }

    fn select_adapters(
        &self,
        source: Option<&str>,
    ) -> Result<Vec<Arc<dyn SourceAdapter>>, SyncError> {
        match source {
            Some(requested) => self
                .registry
                .get(requested)
                .map(|adapter| vec![adapter])
                .ok_or_else(|| SyncError::UnknownSource {
                    requested: requested.to_string(),
                    available: self.registry.source_ids(),
                }),
            None => Ok(self.registry.enabled()),
        }
    }

    /// Runs every selected source to completion and folds the outcome into a [`RunSummary`].
    /// Only configuration problems fail the call; adapter and persistence failures are
    /// reported inside the summary.
    pub async fn run_aggregation(&self, request: RunRequest) -> Result<RunSummary, SyncError> {
        let adapters = self.select_adapters(request.source.as_deref())?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = info_span!(
            "aggregation_run",
            %run_id,
            mode = %request.mode,
            purge = request.purge
        );
        self.run_selected(run_id, started_at, adapters, request)
            .instrument(span)
            .await
    }

    async fn run_selected(
        &self,
        run_id: Uuid,
        started_at: chrono::DateTime<Utc>,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        request: RunRequest,
    ) -> Result<RunSummary, SyncError> {
        let mut summary = RunSummary::new(
            run_id,
            started_at,
            request.mode,
            request.purge,
            request.source.clone(),
        );
        info!(sources = adapters.len(), "starting aggregation run");

        let ctx = AdapterContext::new(run_id, started_at);
        // Every counter of one adapter lands under this key, whatever its records claim.
        let fetches = adapters.iter().map(|adapter| {
            let source_key = IdentityKey::normalize_fragment(adapter.source_id());
            let span = info_span!("source_fetch", %run_id, source = %source_key);
            let ctx = &ctx;
            async move {
                let outcome = adapter.fetch(ctx).await;
                (source_key, outcome)
            }
            .instrument(span)
        });
        let settled = join_all(fetches).await;

        let mut batch: Vec<(String, RawFieldSet)> = Vec::new();
        let mut succeeded_sources = Vec::new();
        for (source_id, outcome) in settled {
            let stats = summary.source_mut(&source_id);
            match outcome {
                Ok(records) => {
                    stats.succeeded = true;
                    stats.discovered = records.len();
                    info!(source = %source_id, discovered = records.len(), "source fetched");
                    batch.extend(records.into_iter().map(|r| (source_id.clone(), r)));
                    succeeded_sources.push(source_id);
                }
                Err(err) => {
                    warn!(source = %source_id, error = %err, "source adapter failed");
                    summary.record_error(&source_id, RunErrorKind::Adapter, err.to_string());
                    if request.purge {
                        warn!(source = %source_id, "purge skipped for failed source");
                    }
                }
            }
        }

        let normalized = self.normalize_batch(batch, &mut summary);
        let deduped = deduplicate_tagged(normalized);
        for (source, count) in &deduped.duplicates {
            summary.source_mut(source).duplicates += count;
        }

        if request.purge {
            self.purge(&succeeded_sources, &mut summary).await;
        }

        let seen_at = Utc::now();
        for (source_key, record) in &deduped.records {
            match self.persister.persist(record, request.mode, seen_at).await {
                Ok(MergeOutcome::Created(_)) => summary.source_mut(source_key).created += 1,
                Ok(MergeOutcome::Updated(_)) => summary.source_mut(source_key).updated += 1,
                Err(err) => {
                    warn!(
                        source = %source_key,
                        key = %record.identity,
                        error = %err,
                        "persisting record failed"
                    );
                    summary.record_error(
                        source_key,
                        RunErrorKind::Persistence,
                        format!("{}: {err}", record.identity),
                    );
                }
            }
        }

        summary.finished_at = Utc::now();
        info!(
            discovered = summary.total_discovered(),
            dropped = summary.total_dropped(),
            created = summary.total_created(),
            updated = summary.total_updated(),
            deactivated = summary.total_deactivated(),
            errors = summary.errors.len(),
            "aggregation run finished"
        );
        Ok(summary)
    }

    fn normalize_batch(
        &self,
        batch: Vec<(String, RawFieldSet)>,
        summary: &mut RunSummary,
    ) -> Vec<(String, NormalizedRecord)> {
        let now = summary.started_at;
        let mut out = Vec::with_capacity(batch.len());
        for (source_id, mut raw) in batch {
            if raw.source.trim().is_empty() {
                raw.source = source_id.clone();
            }
            match self.normalizer.normalize(&raw, now) {
                Ok(record) => out.push((source_id, record)),
                Err(DropReason::Irrelevant) => summary.source_mut(&source_id).filtered += 1,
                Err(reason) => {
                    debug!(source = %source_id, %reason, "dropped raw record");
                    summary.source_mut(&source_id).dropped += 1;
                }
            }
        }
        out
    }

    async fn purge(&self, sources: &[String], summary: &mut RunSummary) {
        for source_id in sources {
            match self.persister.purge_source(source_id).await {
                Ok(count) => {
                    info!(source = %source_id, deactivated = count, "purged source");
                    summary.source_mut(source_id).deactivated += count as usize;
                }
                Err(err) => {
                    warn!(source = %source_id, error = %err, "purge failed");
                    summary.record_error(
                        source_id,
                        RunErrorKind::Persistence,
                        format!("purge failed: {err}"),
                    );
                }
            }
        }
    }
}

impl std::fmt::Debug for AggregationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationPipeline")
            .field("registry", &self.registry)
            .field("normalizer", &self.normalizer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_request_parse() {
        let req = RunRequest::parse(Some(" indeed "), Some("fuzzy"), true).unwrap();
        assert_eq!(req.source.as_deref(), Some("indeed"));
        assert_eq!(req.mode, MatchMode::Upsert);
        assert!(req.purge);

        let req = RunRequest::parse(Some(""), None, false).unwrap();
        assert_eq!(req, RunRequest::all());

        let err = RunRequest::parse(None, Some("loose"), false).unwrap_err();
        assert!(matches!(err, SyncError::InvalidMode(_)));
    }

    #[test]
    fn run_request_builders() {
        let req = RunRequest::for_source("naukri")
            .with_mode(MatchMode::Upsert)
            .with_purge(true);
        assert_eq!(req.source.as_deref(), Some("naukri"));
        assert_eq!(req.mode, MatchMode::Upsert);
        assert!(req.purge);
    }
}
