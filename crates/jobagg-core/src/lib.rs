//! Core domain model shared by the aggregation pipeline crates.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobagg-core";

/// Unvalidated fields extracted by a source adapter for one listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFieldSet {
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub posted: Option<String>,
}

impl RawFieldSet {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_salary(mut self, salary: impl Into<String>) -> Self {
        self.salary = Some(salary.into());
        self
    }

    pub fn with_experience(mut self, experience: impl Into<String>) -> Self {
        self.experience = Some(experience.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_posted(mut self, posted: impl Into<String>) -> Self {
        self.posted = Some(posted.into());
        self
    }
}

/// Trims and collapses internal whitespace runs to a single space.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deterministic dedup/match key: `source|title|company`, each fragment whitespace-collapsed
/// and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn from_parts(source: &str, title: &str, company: &str) -> Self {
        Self(format!(
            "{}|{}|{}",
            Self::normalize_fragment(source),
            Self::normalize_fragment(title),
            Self::normalize_fragment(company)
        ))
    }

    pub fn normalize_fragment(input: &str) -> String {
        collapse_whitespace(input).to_lowercase()
    }

    /// Wraps a key read back from storage without re-normalizing it.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical record produced by the normalizer for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub identity: IdentityKey,
    pub source: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: Option<String>,
    pub experience: Option<String>,
    pub description: Option<String>,
    pub skills: Vec<String>,
    pub url: Option<String>,
    pub posted_at: DateTime<Utc>,
    /// `location` holds the configured default rather than a sourced value.
    pub location_defaulted: bool,
    /// `posted_at` holds the run time rather than a sourced value.
    pub posted_at_defaulted: bool,
}

/// Persisted job posting. Lifecycle spans runs; never hard-deleted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub id: Uuid,
    pub identity_key: IdentityKey,
    pub source: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub salary: Option<String>,
    pub experience: Option<String>,
    pub description: Option<String>,
    pub skills: Vec<String>,
    pub url: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl StoredEntity {
    /// Builds a fresh active entity carrying every field of `record` verbatim.
    pub fn from_record(id: Uuid, record: &NormalizedRecord, seen_at: DateTime<Utc>) -> Self {
        Self {
            id,
            identity_key: record.identity.clone(),
            source: record.source.clone(),
            title: record.title.clone(),
            company: record.company.clone(),
            location: record.location.clone(),
            salary: record.salary.clone(),
            experience: record.experience.clone(),
            description: record.description.clone(),
            skills: record.skills.clone(),
            url: record.url.clone(),
            posted_at: record.posted_at,
            scraped_at: seen_at,
            created_at: seen_at,
            is_active: true,
        }
    }
}

/// How the merge-persister locates an existing entity for an incoming record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Exact identity key equality.
    #[default]
    Strict,
    /// Source equality plus case-insensitive title/company equality.
    Upsert,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Strict => "strict",
            MatchMode::Upsert => "upsert",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMatchMode(pub String);

impl fmt::Display for UnknownMatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown match mode `{}` (expected strict or upsert)", self.0)
    }
}

impl std::error::Error for UnknownMatchMode {}

impl FromStr for MatchMode {
    type Err = UnknownMatchMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(MatchMode::Strict),
            "upsert" | "fuzzy" => Ok(MatchMode::Upsert),
            _ => Err(UnknownMatchMode(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunErrorKind {
    Adapter,
    Persistence,
}

impl fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunErrorKind::Adapter => "adapter",
            RunErrorKind::Persistence => "persistence",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub source: String,
    pub kind: RunErrorKind,
    pub message: String,
}

/// Per-source counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub succeeded: bool,
    pub discovered: usize,
    pub dropped: usize,
    pub filtered: usize,
    pub duplicates: usize,
    pub created: usize,
    pub updated: usize,
    pub deactivated: usize,
}

/// Outcome of one aggregation run, folded after every source settled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub mode: MatchMode,
    pub purge: bool,
    pub source_filter: Option<String>,
    pub sources: BTreeMap<String, SourceStats>,
    pub errors: Vec<RunError>,
}

impl RunSummary {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        mode: MatchMode,
        purge: bool,
        source_filter: Option<String>,
    ) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            mode,
            purge,
            source_filter,
            sources: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn source_mut(&mut self, source: &str) -> &mut SourceStats {
        self.sources.entry(source.to_string()).or_default()
    }

    pub fn source(&self, source: &str) -> Option<&SourceStats> {
        self.sources.get(source)
    }

    pub fn record_error(&mut self, source: &str, kind: RunErrorKind, message: impl Into<String>) {
        self.errors.push(RunError {
            source: source.to_string(),
            kind,
            message: message.into(),
        });
    }

    pub fn errors_for<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a RunError> + 'a {
        self.errors.iter().filter(move |e| e.source == source)
    }

    pub fn total_discovered(&self) -> usize {
        self.sources.values().map(|s| s.discovered).sum()
    }

    pub fn total_dropped(&self) -> usize {
        self.sources.values().map(|s| s.dropped).sum()
    }

    pub fn total_created(&self) -> usize {
        self.sources.values().map(|s| s.created).sum()
    }

    pub fn total_updated(&self) -> usize {
        self.sources.values().map(|s| s.updated).sum()
    }

    pub fn total_deactivated(&self) -> usize {
        self.sources.values().map(|s| s.deactivated).sum()
    }
}
