use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use jobagg_adapters::{html_adapter_for_source, AdapterRegistry, FixtureAdapter, SourceAdapter};
use jobagg_storage::{HttpClientConfig, HttpFetcher, MemoryRecordStore, PgRecordStore, RecordStore};
use serde::Deserialize;
use tracing::{info, warn};

use crate::normalize::{
    Normalizer, NormalizerConfig, RelevanceFilter, SkillVocabulary, DEFAULT_LOCATION,
    DEFAULT_MAX_SKILLS,
};
use crate::pipeline::AggregationPipeline;

pub const DEFAULT_SYNC_CRON: &str = "0 0 */4 * * *";
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Postgres connection string; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub workspace_root: PathBuf,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    pub user_agent: Option<String>,
    pub http_timeout_secs: u64,
    pub request_delay_ms: u64,
    pub default_location: String,
    pub reports_enabled: bool,
    pub bind_addr: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            workspace_root: PathBuf::from("."),
            scheduler_enabled: false,
            sync_cron: DEFAULT_SYNC_CRON.to_string(),
            user_agent: None,
            http_timeout_secs: 20,
            request_delay_ms: 2500,
            default_location: DEFAULT_LOCATION.to_string(),
            reports_enabled: true,
            bind_addr: DEFAULT_BIND.to_string(),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True" | "yes"))
        .unwrap_or(default)
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env_non_empty("DATABASE_URL"),
            workspace_root: env_non_empty("JOBAGG_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            scheduler_enabled: env_flag("JOBAGG_SCHEDULER_ENABLED", false),
            sync_cron: env_non_empty("JOBAGG_SYNC_CRON").unwrap_or(defaults.sync_cron),
            user_agent: env_non_empty("JOBAGG_USER_AGENT"),
            http_timeout_secs: env_non_empty("JOBAGG_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            request_delay_ms: env_non_empty("JOBAGG_REQUEST_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.request_delay_ms),
            default_location: env_non_empty("JOBAGG_DEFAULT_LOCATION")
                .unwrap_or(defaults.default_location),
            reports_enabled: env_flag("JOBAGG_REPORTS", true),
            bind_addr: env_non_empty("JOBAGG_BIND").unwrap_or(defaults.bind_addr),
        }
    }

    pub fn sources_path(&self) -> PathBuf {
        self.workspace_root.join("sources.yaml")
    }

    pub fn skill_rules_path(&self) -> PathBuf {
        self.workspace_root.join("rules").join("skills.yaml")
    }

    pub fn reports_root(&self) -> PathBuf {
        self.workspace_root.join("reports")
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: self.user_agent.clone(),
            request_delay: Duration::from_millis(self.request_delay_ms),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    Html,
    Fixture,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub mode: SourceMode,
    #[serde(default)]
    pub listing_urls: Vec<String>,
    /// JSON file of raw field-sets, relative to the workspace root.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistryFile {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistryFile {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing source registry")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }
}

/// `rules/skills.yaml`: skill vocabulary, cap, and optional relevance keywords.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillRulesFile {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub max_skills: Option<usize>,
    #[serde(default)]
    pub relevance_keywords: Vec<String>,
}

impl SkillRulesFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn into_normalizer_config(self, default_location: &str) -> NormalizerConfig {
        let skills = if self.skills.is_empty() {
            let defaults = SkillVocabulary::default();
            SkillVocabulary::new(
                defaults.terms().to_vec(),
                self.max_skills.unwrap_or(DEFAULT_MAX_SKILLS),
            )
        } else {
            SkillVocabulary::new(self.skills, self.max_skills.unwrap_or(DEFAULT_MAX_SKILLS))
        };
        NormalizerConfig {
            default_location: default_location.to_string(),
            skills,
            relevance: RelevanceFilter::new(self.relevance_keywords),
        }
    }
}

/// Normalizer settings from `rules/skills.yaml`, or the built-in vocabulary when the file is
/// absent.
pub fn load_normalizer_config(config: &SyncConfig) -> Result<NormalizerConfig> {
    let path = config.skill_rules_path();
    let rules = if path.exists() {
        SkillRulesFile::load(&path)?
    } else {
        SkillRulesFile::default()
    };
    Ok(rules.into_normalizer_config(&config.default_location))
}

/// Registers one adapter per configured source, in file order. Disabled sources are
/// registered too so they can still be requested by name.
pub fn build_registry(
    workspace_root: &Path,
    file: &SourceRegistryFile,
    http: Arc<HttpFetcher>,
) -> Result<AdapterRegistry> {
    let mut registry = AdapterRegistry::new();
    for source in &file.sources {
        let adapter: Arc<dyn SourceAdapter> = match source.mode {
            SourceMode::Html => Arc::new(
                html_adapter_for_source(&source.source_id, &source.listing_urls, http.clone())
                    .with_context(|| {
                        format!("no built-in html adapter for source {}", source.source_id)
                    })?,
            ),
            SourceMode::Fixture => {
                let path = source.fixture_path.as_ref().with_context(|| {
                    format!("fixture source {} has no fixture_path", source.source_id)
                })?;
                Arc::new(FixtureAdapter::new(
                    source.source_id.clone(),
                    workspace_root.join(path),
                ))
            }
        };
        if source.enabled {
            registry.register(adapter);
        } else {
            registry.register_disabled(adapter);
        }
    }
    Ok(registry)
}

/// Postgres when `DATABASE_URL` is set (migrations applied), otherwise a process-local store.
pub async fn connect_store(config: &SyncConfig) -> Result<Arc<dyn RecordStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PgRecordStore::connect(url).await?;
            store.migrate().await?;
            info!("using postgres record store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory record store, nothing is persisted");
            Ok(Arc::new(MemoryRecordStore::new()))
        }
    }
}

pub async fn build_pipeline(config: &SyncConfig) -> Result<AggregationPipeline> {
    let sources = SourceRegistryFile::load(&config.sources_path())?;
    let http = Arc::new(HttpFetcher::new(config.http_client_config())?);
    let registry = build_registry(&config.workspace_root, &sources, http)?;
    let normalizer = Normalizer::new(load_normalizer_config(config)?);
    let store = connect_store(config).await?;
    info!(sources = ?registry.source_ids(), "aggregation pipeline ready");
    Ok(AggregationPipeline::new(registry, store, normalizer))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: &str = r#"
sources:
  - source_id: naukri
    display_name: Naukri
    enabled: true
    mode: html
  - source_id: indeed
    display_name: Indeed
    enabled: true
    mode: html
    listing_urls:
      - https://in.indeed.com/jobs?q=soc+analyst
  - source_id: seed
    display_name: Seed data
    enabled: false
    mode: fixture
    fixture_path: fixtures/seed/listings.json
"#;

    #[test]
    fn registry_follows_file_order_and_enabled_flags() {
        let file = SourceRegistryFile::from_yaml_str(SOURCES).unwrap();
        let http = Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap());
        let registry = build_registry(Path::new("."), &file, http).unwrap();
        assert_eq!(registry.source_ids(), vec!["naukri", "indeed", "seed"]);
        let enabled: Vec<_> = registry
            .enabled()
            .iter()
            .map(|a| a.source_id().to_string())
            .collect();
        assert_eq!(enabled, vec!["naukri", "indeed"]);
    }

    #[test]
    fn fixture_source_requires_path() {
        let file = SourceRegistryFile::from_yaml_str(
            "sources:\n  - source_id: seed\n    display_name: Seed\n    enabled: true\n    mode: fixture\n",
        )
        .unwrap();
        let http = Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap());
        assert!(build_registry(Path::new("."), &file, http).is_err());
    }

    #[test]
    fn unknown_html_source_is_rejected() {
        let file = SourceRegistryFile::from_yaml_str(
            "sources:\n  - source_id: monster\n    display_name: Monster\n    enabled: true\n    mode: html\n",
        )
        .unwrap();
        let http = Arc::new(HttpFetcher::new(HttpClientConfig::default()).unwrap());
        let err = build_registry(Path::new("."), &file, http).unwrap_err();
        assert!(err.to_string().contains("monster"));
    }

    #[test]
    fn skill_rules_override_vocabulary() {
        let rules: SkillRulesFile = serde_yaml::from_str(
            "skills: [Go, Rust]\nmax_skills: 1\nrelevance_keywords: [engineer]\n",
        )
        .unwrap();
        let config = rules.into_normalizer_config("Remote");
        assert_eq!(config.skills.terms(), ["Go".to_string(), "Rust".to_string()]);
        assert_eq!(config.skills.max_skills(), 1);
        assert!(config.relevance.is_enabled());
        assert_eq!(config.default_location, "Remote");
    }

    #[test]
    fn empty_rules_keep_builtin_vocabulary() {
        let config = SkillRulesFile::default().into_normalizer_config(DEFAULT_LOCATION);
        assert_eq!(config.skills, SkillVocabulary::default());
        assert!(!config.relevance.is_enabled());
    }

    #[test]
    fn http_config_uses_delay_and_timeout() {
        let config = SyncConfig {
            http_timeout_secs: 5,
            request_delay_ms: 100,
            ..Default::default()
        };
        let http = config.http_client_config();
        assert_eq!(http.timeout, Duration::from_secs(5));
        assert_eq!(http.request_delay, Duration::from_millis(100));
    }
}
