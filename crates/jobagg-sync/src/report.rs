use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jobagg_core::RunSummary;
use tokio::fs;

pub fn render_brief(summary: &RunSummary) -> String {
    let mut lines = vec![
        "# Job Aggregation Run".to_string(),
        String::new(),
        format!("- Run ID: `{}`", summary.run_id),
        format!("- Started: {}", summary.started_at),
        format!("- Finished: {}", summary.finished_at),
        format!("- Mode: {}", summary.mode),
        format!("- Purge: {}", summary.purge),
        format!(
            "- Source filter: {}",
            summary.source_filter.as_deref().unwrap_or("all enabled")
        ),
        format!(
            "- Totals: {} discovered, {} dropped, {} created, {} updated, {} deactivated",
            summary.total_discovered(),
            summary.total_dropped(),
            summary.total_created(),
            summary.total_updated(),
            summary.total_deactivated()
        ),
        String::new(),
        "## Sources".to_string(),
        String::new(),
        "| source | ok | discovered | dropped | filtered | duplicates | created | updated | deactivated |"
            .to_string(),
        "|---|---|---|---|---|---|---|---|---|".to_string(),
    ];
    for (source, s) in &summary.sources {
        lines.push(format!(
            "| {source} | {} | {} | {} | {} | {} | {} | {} | {} |",
            if s.succeeded { "yes" } else { "no" },
            s.discovered,
            s.dropped,
            s.filtered,
            s.duplicates,
            s.created,
            s.updated,
            s.deactivated
        ));
    }

    lines.push(String::new());
    lines.push("## Errors".to_string());
    lines.push(String::new());
    if summary.errors.is_empty() {
        lines.push("- none".to_string());
    }
    for err in &summary.errors {
        lines.push(format!("- {} ({}): {}", err.source, err.kind, err.message));
    }
    lines.push(String::new());
    lines.join("\n")
}

/// Writes `run_summary.json` and `brief.md` under `<reports_root>/<run_id>/`.
pub async fn write_run_report(reports_root: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let dir = reports_root.join(summary.run_id.to_string());
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(dir.join("run_summary.json"), json)
        .await
        .context("writing run_summary.json")?;
    fs::write(dir.join("brief.md"), render_brief(summary))
        .await
        .context("writing brief.md")?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobagg_core::{MatchMode, RunErrorKind};
    use uuid::Uuid;

    fn sample() -> RunSummary {
        let mut summary =
            RunSummary::new(Uuid::new_v4(), Utc::now(), MatchMode::Strict, true, None);
        let naukri = summary.source_mut("naukri");
        naukri.succeeded = true;
        naukri.discovered = 4;
        naukri.created = 3;
        naukri.dropped = 1;
        summary.source_mut("indeed");
        summary.record_error("indeed", RunErrorKind::Adapter, "http status 403");
        summary
    }

    #[test]
    fn brief_lists_sources_and_errors() {
        let brief = render_brief(&sample());
        assert!(brief.contains("| naukri | yes | 4 | 1 | 0 | 0 | 3 | 0 | 0 |"));
        assert!(brief.contains("| indeed | no | 0 |"));
        assert!(brief.contains("- indeed (adapter): http status 403"));
        assert!(brief.contains("Source filter: all enabled"));
    }

    #[tokio::test]
    async fn report_files_are_written() {
        let tmp = tempfile::tempdir().unwrap();
        let summary = sample();
        let dir = write_run_report(tmp.path(), &summary).await.unwrap();
        assert_eq!(dir, tmp.path().join(summary.run_id.to_string()));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("run_summary.json")).unwrap())
                .unwrap();
        assert_eq!(json["sources"]["naukri"]["created"], 3);
        assert_eq!(json["errors"][0]["kind"], "adapter");
        assert!(dir.join("brief.md").exists());
    }
}
