use std::path::{Path, PathBuf};

use async_trait::async_trait;
use jobagg_core::RawFieldSet;

use crate::{AdapterContext, AdapterError, SourceAdapter};

/// Reads a JSON array of raw field-sets. Entries without a source tag are attributed to
/// `source_id`.
pub async fn load_raw_fixture(
    source_id: &str,
    path: impl AsRef<Path>,
) -> Result<Vec<RawFieldSet>, AdapterError> {
    let path = path.as_ref();
    let fixture_err = |message: String| AdapterError::Fixture {
        path: path.display().to_string(),
        message,
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| fixture_err(e.to_string()))?;
    let mut records: Vec<RawFieldSet> =
        serde_json::from_str(&text).map_err(|e| fixture_err(e.to_string()))?;
    for record in &mut records {
        if record.source.trim().is_empty() {
            record.source = source_id.to_string();
        }
    }
    Ok(records)
}

/// Serves listings captured on disk, e.g. seed data or manual imports.
#[derive(Debug, Clone)]
pub struct FixtureAdapter {
    source_id: String,
    path: PathBuf,
}

impl FixtureAdapter {
    pub fn new(source_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for FixtureAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self, _ctx: &AdapterContext) -> Result<Vec<RawFieldSet>, AdapterError> {
        load_raw_fixture(&self.source_id, &self.path).await
    }
}

/// Returns a fixed, in-memory set of listings on every call.
#[derive(Debug, Clone)]
pub struct StaticAdapter {
    source_id: String,
    records: Vec<RawFieldSet>,
}

impl StaticAdapter {
    pub fn new(source_id: impl Into<String>, records: Vec<RawFieldSet>) -> Self {
        Self {
            source_id: source_id.into(),
            records,
        }
    }
}

#[async_trait]
impl SourceAdapter for StaticAdapter {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch(&self, _ctx: &AdapterContext) -> Result<Vec<RawFieldSet>, AdapterError> {
        Ok(self.records.clone())
    }
}
