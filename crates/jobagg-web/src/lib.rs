//! HTTP trigger surface: start a run, check liveness.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use jobagg_sync::{write_run_report, AggregationPipeline, RunRequest};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "jobagg-web";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AggregationPipeline>,
    /// Where run reports go; `None` disables them.
    pub reports_root: Option<PathBuf>,
    started: Instant,
}

impl AppState {
    pub fn new(pipeline: Arc<AggregationPipeline>) -> Self {
        Self {
            pipeline,
            reports_root: None,
            started: Instant::now(),
        }
    }

    pub fn with_reports(mut self, reports_root: impl Into<PathBuf>) -> Self {
        self.reports_root = Some(reports_root.into());
        self
    }
}

#[derive(Debug, Deserialize, Default)]
struct ScrapeQuery {
    source: Option<String>,
    mode: Option<String>,
    purge: Option<String>,
}

fn truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/scrape", post(scrape_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "OK",
        "timestamp": Utc::now(),
        "uptime_secs": state.started.elapsed().as_secs(),
        "sources": state.pipeline.registry().source_ids(),
    }))
    .into_response()
}

async fn scrape_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ScrapeQuery>,
) -> Response {
    let request = match RunRequest::parse(
        query.source.as_deref(),
        query.mode.as_deref(),
        truthy(query.purge.as_deref()),
    ) {
        Ok(request) => request,
        Err(err) => return bad_request(err),
    };

    match state.pipeline.run_aggregation(request).await {
        Ok(summary) => {
            if let Some(root) = &state.reports_root {
                if let Err(err) = write_run_report(root, &summary).await {
                    warn!(error = %err, "writing run report failed");
                }
            }
            Json(summary).into_response()
        }
        Err(err) => bad_request(err),
    }
}

fn bad_request(err: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": err.to_string() })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use jobagg_adapters::{AdapterRegistry, StaticAdapter};
    use jobagg_core::{RawFieldSet, RunSummary};
    use jobagg_storage::{EntityFilter, MemoryRecordStore, RecordStore};
    use jobagg_sync::Normalizer;
    use tower::ServiceExt;

    fn state_with(store: Arc<MemoryRecordStore>) -> AppState {
        let registry = AdapterRegistry::new()
            .with(Arc::new(StaticAdapter::new(
                "naukri",
                vec![RawFieldSet::new("naukri")
                    .with_title("SOC Analyst")
                    .with_company("Acme")],
            )))
            .with(Arc::new(StaticAdapter::new(
                "indeed",
                vec![RawFieldSet::new("indeed")
                    .with_title("Pen Tester")
                    .with_company("Red Lantern")],
            )));
        let pipeline = AggregationPipeline::new(registry, store, Normalizer::default());
        AppState::new(Arc::new(pipeline))
    }

    async fn post_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_sources() {
        let app = app(state_with(Arc::new(MemoryRecordStore::new())));
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["sources"], json!(["naukri", "indeed"]));
    }

    #[tokio::test]
    async fn scrape_runs_all_sources_and_returns_summary() {
        let store = Arc::new(MemoryRecordStore::new());
        let (status, json) = post_json(app(state_with(store.clone())), "/api/scrape").await;
        assert_eq!(status, StatusCode::OK);
        let summary: RunSummary = serde_json::from_value(json).unwrap();
        assert_eq!(summary.total_created(), 2);
        assert_eq!(store.list(&EntityFilter::active()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn scrape_single_source_with_mode_and_purge() {
        let store = Arc::new(MemoryRecordStore::new());
        let router = app(state_with(store.clone()));
        let (status, _) = post_json(router.clone(), "/api/scrape").await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) =
            post_json(router, "/api/scrape?source=indeed&mode=fuzzy&purge=true").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["mode"], "upsert");
        assert_eq!(json["purge"], true);
        assert_eq!(json["source_filter"], "indeed");
        assert_eq!(json["sources"]["indeed"]["deactivated"], 1);
        assert_eq!(json["sources"]["indeed"]["updated"], 1);
        assert!(json["sources"].get("naukri").is_none());
    }

    #[tokio::test]
    async fn configuration_errors_are_bad_requests() {
        let router = app(state_with(Arc::new(MemoryRecordStore::new())));
        let (status, json) = post_json(router.clone(), "/api/scrape?source=monster").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("monster"));

        let (status, _) = post_json(router, "/api/scrape?mode=loose").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn scrape_writes_report_when_enabled() {
        let tmp = tempfile::tempdir().unwrap();
        let state = state_with(Arc::new(MemoryRecordStore::new())).with_reports(tmp.path());
        let (status, json) = post_json(app(state), "/api/scrape?source=naukri").await;
        assert_eq!(status, StatusCode::OK);
        let run_id = json["run_id"].as_str().unwrap();
        assert!(tmp.path().join(run_id).join("run_summary.json").exists());
    }

    #[test]
    fn purge_flag_parsing() {
        assert!(truthy(Some("true")));
        assert!(truthy(Some(" 1 ")));
        assert!(!truthy(Some("false")));
        assert!(!truthy(None));
    }
}
