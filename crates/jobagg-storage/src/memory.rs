use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobagg_core::{IdentityKey, NormalizedRecord, StoredEntity};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{eq_ignore_case, EntityFilter, RecordStore, StoreError};

/// Process-local store. Enforces one entity per identity key, like the `jobs` table's unique index.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    entities: Mutex<Vec<StoredEntity>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from pre-existing entities, e.g. rows written under an older key format.
    pub fn with_entities(entities: Vec<StoredEntity>) -> Self {
        Self {
            entities: Mutex::new(entities),
        }
    }

    pub async fn len(&self) -> usize {
        self.entities.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.lock().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_by_identity(
        &self,
        key: &IdentityKey,
    ) -> Result<Option<StoredEntity>, StoreError> {
        let entities = self.entities.lock().await;
        Ok(entities.iter().find(|e| &e.identity_key == key).cloned())
    }

    async fn find_by_source_title_company(
        &self,
        source: &str,
        title: &str,
        company: &str,
    ) -> Result<Option<StoredEntity>, StoreError> {
        let entities = self.entities.lock().await;
        Ok(entities
            .iter()
            .filter(|e| {
                e.source == source
                    && eq_ignore_case(&e.title, title)
                    && eq_ignore_case(&e.company, company)
            })
            .max_by_key(|e| (e.is_active, e.scraped_at))
            .cloned())
    }

    async fn create(
        &self,
        record: &NormalizedRecord,
        seen_at: DateTime<Utc>,
    ) -> Result<StoredEntity, StoreError> {
        let mut entities = self.entities.lock().await;
        if entities.iter().any(|e| e.identity_key == record.identity) {
            return Err(StoreError::Conflict(record.identity.to_string()));
        }
        let entity = StoredEntity::from_record(Uuid::new_v4(), record, seen_at);
        entities.push(entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: &StoredEntity) -> Result<(), StoreError> {
        let mut entities = self.entities.lock().await;
        let slot = entities
            .iter_mut()
            .find(|e| e.id == entity.id)
            .ok_or(StoreError::NotFound(entity.id))?;
        // created_at and the identity fields are owned by the original insert.
        let created_at = slot.created_at;
        *slot = StoredEntity {
            created_at,
            identity_key: slot.identity_key.clone(),
            source: slot.source.clone(),
            title: slot.title.clone(),
            company: slot.company.clone(),
            ..entity.clone()
        };
        Ok(())
    }

    async fn deactivate_source(&self, source: &str) -> Result<u64, StoreError> {
        let mut entities = self.entities.lock().await;
        let mut deactivated = 0u64;
        for entity in entities.iter_mut().filter(|e| e.source == source && e.is_active) {
            entity.is_active = false;
            deactivated += 1;
        }
        Ok(deactivated)
    }

    async fn list(&self, filter: &EntityFilter) -> Result<Vec<StoredEntity>, StoreError> {
        let entities = self.entities.lock().await;
        Ok(entities
            .iter()
            .filter(|e| !filter.active_only || e.is_active)
            .filter(|e| filter.source.as_deref().map_or(true, |s| e.source == s))
            .cloned()
            .collect())
    }
}
