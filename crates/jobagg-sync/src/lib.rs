//! Aggregation pipeline: normalization, in-run dedup, merge-on-persist, and the run
//! orchestrator, plus configuration, reports, and scheduling around it.

use anyhow::Result;
use jobagg_core::RunSummary;
use tracing::info;

mod config;
mod dedup;
mod error;
mod merge;
mod normalize;
mod pipeline;
mod report;
mod scheduler;

pub use config::{
    build_pipeline, build_registry, connect_store, load_normalizer_config, SkillRulesFile,
    SourceConfig, SourceMode, SourceRegistryFile, SyncConfig, DEFAULT_BIND, DEFAULT_SYNC_CRON,
};
pub use dedup::{deduplicate, deduplicate_tagged, DedupOutcome};
pub use error::SyncError;
pub use merge::{merge_into, MergeOutcome, MergePersister};
pub use normalize::{
    parse_posted_hint, DropReason, Normalizer, NormalizerConfig, RelevanceFilter,
    SkillVocabulary, DEFAULT_LOCATION, DEFAULT_MAX_SKILLS, DEFAULT_SKILL_TERMS,
};
pub use pipeline::{AggregationPipeline, RunRequest};
pub use report::{render_brief, write_run_report};
pub use scheduler::{build_scheduler, maybe_build_scheduler};

pub const CRATE_NAME: &str = "jobagg-sync";

/// Runs once and writes the report when enabled. Configuration errors surface as `Err`.
pub async fn run_and_report(
    config: &SyncConfig,
    pipeline: &AggregationPipeline,
    request: RunRequest,
) -> Result<RunSummary> {
    let summary = pipeline.run_aggregation(request).await?;
    if config.reports_enabled {
        let dir = write_run_report(&config.reports_root(), &summary).await?;
        info!(report = %dir.display(), "run report written");
    }
    Ok(summary)
}

pub async fn run_sync_once_from_env(request: RunRequest) -> Result<RunSummary> {
    let config = SyncConfig::from_env();
    let pipeline = build_pipeline(&config).await?;
    run_and_report(&config, &pipeline, request).await
}
