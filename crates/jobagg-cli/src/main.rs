use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobagg_storage::{EntityFilter, PgRecordStore, RecordStore};
use jobagg_sync::{
    build_pipeline, build_scheduler, maybe_build_scheduler, run_and_report, RunRequest, SyncConfig,
};
use jobagg_web::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobagg-cli")]
#[command(about = "Job listing aggregation command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one aggregation pass.
    Sync {
        /// Only run this source (may be a disabled one).
        #[arg(long)]
        source: Option<String>,
        /// strict (default) or upsert/fuzzy.
        #[arg(long)]
        mode: Option<String>,
        /// Deactivate the invoked sources' stored jobs before persisting.
        #[arg(long)]
        purge: bool,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Apply database migrations (requires DATABASE_URL).
    Migrate,
    /// Serve the trigger API; starts the scheduler when enabled.
    Serve,
    /// Run the cron scheduler in the foreground until Ctrl-C.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobagg=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync {
        source: None,
        mode: None,
        purge: false,
        json: false,
    }) {
        Commands::Sync {
            source,
            mode,
            purge,
            json,
        } => {
            let request = RunRequest::parse(source.as_deref(), mode.as_deref(), purge)?;
            let pipeline = build_pipeline(&config).await?;
            let summary = run_and_report(&config, &pipeline, request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                let active = pipeline.store().list(&EntityFilter::active()).await?.len();
                println!(
                    "sync complete: run_id={} mode={} discovered={} dropped={} created={} updated={} deactivated={} errors={} active_jobs={}",
                    summary.run_id,
                    summary.mode,
                    summary.total_discovered(),
                    summary.total_dropped(),
                    summary.total_created(),
                    summary.total_updated(),
                    summary.total_deactivated(),
                    summary.errors.len(),
                    active
                );
                for err in &summary.errors {
                    eprintln!("  {} ({}): {}", err.source, err.kind, err.message);
                }
            }
        }
        Commands::Migrate => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set to run migrations")?;
            let store = PgRecordStore::connect(url).await?;
            store.migrate().await?;
            println!("migrations applied");
        }
        Commands::Serve => {
            let addr: SocketAddr = config
                .bind_addr
                .parse()
                .with_context(|| format!("parsing JOBAGG_BIND {}", config.bind_addr))?;
            let pipeline = Arc::new(build_pipeline(&config).await?);
            let scheduler = maybe_build_scheduler(&config, Arc::clone(&pipeline)).await?;
            if let Some(sched) = &scheduler {
                sched.start().await.context("starting scheduler")?;
                info!(cron = %config.sync_cron, "scheduler started");
            }
            let mut state = AppState::new(pipeline);
            if config.reports_enabled {
                state = state.with_reports(config.reports_root());
            }
            jobagg_web::serve(state, addr).await?;
        }
        Commands::Schedule => {
            let pipeline = Arc::new(build_pipeline(&config).await?);
            let reports = config.reports_enabled.then(|| config.reports_root());
            let mut sched = build_scheduler(&config.sync_cron, pipeline, reports).await?;
            sched.start().await.context("starting scheduler")?;
            info!(cron = %config.sync_cron, "scheduler running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            sched.shutdown().await.context("stopping scheduler")?;
        }
    }

    Ok(())
}
