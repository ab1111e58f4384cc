use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::pipeline::{AggregationPipeline, RunRequest};
use crate::report::write_run_report;

/// Scheduler firing a full strict run on `cron` (six-field, seconds first). Reports go to
/// `reports_root` when given.
pub async fn build_scheduler(
    cron: &str,
    pipeline: Arc<AggregationPipeline>,
    reports_root: Option<PathBuf>,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron, move |_uuid, _l| {
        let pipeline = Arc::clone(&pipeline);
        let reports_root = reports_root.clone();
        Box::pin(async move {
            match pipeline.run_aggregation(RunRequest::all()).await {
                Ok(summary) => {
                    info!(
                        run_id = %summary.run_id,
                        created = summary.total_created(),
                        updated = summary.total_updated(),
                        "scheduled run finished"
                    );
                    if let Some(root) = reports_root {
                        if let Err(err) = write_run_report(&root, &summary).await {
                            error!(error = %err, "writing scheduled run report failed");
                        }
                    }
                }
                Err(err) => error!(error = %err, "scheduled run failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}

/// [`build_scheduler`] gated on `JOBAGG_SCHEDULER_ENABLED`.
pub async fn maybe_build_scheduler(
    config: &SyncConfig,
    pipeline: Arc<AggregationPipeline>,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }
    let reports = config.reports_enabled.then(|| config.reports_root());
    build_scheduler(&config.sync_cron, pipeline, reports).await.map(Some)
}
