//! Record store contract, store backends, and HTTP fetch utilities.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobagg_core::{IdentityKey, NormalizedRecord, StoredEntity};
use thiserror::Error;
use uuid::Uuid;

mod http;
mod memory;
mod postgres;

pub use http::{
    classify_reqwest_error, classify_status, BackoffPolicy, FetchError, FetchedPage,
    HttpClientConfig, HttpFetcher, RetryDisposition,
};
pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

pub const CRATE_NAME: &str = "jobagg-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an entity with identity key `{0}` already exists")]
    Conflict(String),
    #[error("entity {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0}")]
    Backend(String),
}

/// Read filter for [`RecordStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub source: Option<String>,
    pub active_only: bool,
}

impl EntityFilter {
    pub fn active() -> Self {
        Self {
            source: None,
            active_only: true,
        }
    }

    pub fn active_for_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            active_only: true,
        }
    }
}

/// Persistent home of [`StoredEntity`] values. Every call touches at most one entity, except
/// `deactivate_source` and `list`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Entity stored under exactly `key`, active or not.
    async fn find_by_identity(&self, key: &IdentityKey) -> Result<Option<StoredEntity>, StoreError>;

    /// Entity with equal `source` and case-insensitively equal `title` and `company`.
    /// Active entities win over inactive ones, then the most recently seen.
    async fn find_by_source_title_company(
        &self,
        source: &str,
        title: &str,
        company: &str,
    ) -> Result<Option<StoredEntity>, StoreError>;

    /// Inserts a new active entity for `record`; the store assigns the identifier.
    async fn create(
        &self,
        record: &NormalizedRecord,
        seen_at: DateTime<Utc>,
    ) -> Result<StoredEntity, StoreError>;

    /// Overwrites the mutable fields of the entity with `entity.id`.
    async fn update(&self, entity: &StoredEntity) -> Result<(), StoreError>;

    /// Soft-deletes every active entity of `source`, returning how many were deactivated.
    async fn deactivate_source(&self, source: &str) -> Result<u64, StoreError>;

    async fn list(&self, filter: &EntityFilter) -> Result<Vec<StoredEntity>, StoreError>;
}

pub(crate) fn eq_ignore_case(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}
