use std::sync::Arc;

use chrono::{DateTime, Utc};
use jobagg_core::{MatchMode, NormalizedRecord, StoredEntity};
use jobagg_storage::{RecordStore, StoreError};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Created(StoredEntity),
    Updated(StoredEntity),
}

impl MergeOutcome {
    pub fn entity(&self) -> &StoredEntity {
        match self {
            MergeOutcome::Created(e) | MergeOutcome::Updated(e) => e,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|v| !v.trim().is_empty())
}

/// Folds `incoming` into `stored`. Optional fields only move toward more information, skills
/// are unioned, and identity fields are left alone.
pub fn merge_into(stored: &mut StoredEntity, incoming: &NormalizedRecord, seen_at: DateTime<Utc>) {
    if !incoming.location_defaulted && !incoming.location.trim().is_empty() {
        stored.location = incoming.location.clone();
    }
    for (slot, value) in [
        (&mut stored.salary, &incoming.salary),
        (&mut stored.experience, &incoming.experience),
        (&mut stored.description, &incoming.description),
        (&mut stored.url, &incoming.url),
    ] {
        if let Some(v) = non_empty(value) {
            *slot = Some(v.clone());
        }
    }
    if !incoming.posted_at_defaulted {
        stored.posted_at = incoming.posted_at;
    }
    for skill in &incoming.skills {
        if !stored.skills.iter().any(|s| s.eq_ignore_ascii_case(skill)) {
            stored.skills.push(skill.clone());
        }
    }
    stored.scraped_at = seen_at;
    stored.is_active = true;
}

/// Match-or-create against a [`RecordStore`], one record per call.
#[derive(Clone)]
pub struct MergePersister {
    store: Arc<dyn RecordStore>,
}

impl MergePersister {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub async fn find_match(
        &self,
        record: &NormalizedRecord,
        mode: MatchMode,
    ) -> Result<Option<StoredEntity>, StoreError> {
        match mode {
            MatchMode::Strict => self.store.find_by_identity(&record.identity).await,
            MatchMode::Upsert => {
                let found = self
                    .store
                    .find_by_source_title_company(&record.source, &record.title, &record.company)
                    .await?;
                match found {
                    Some(entity) => Ok(Some(entity)),
                    // Whitespace drift hides exact key matches from the fuzzy lookup.
                    None => self.store.find_by_identity(&record.identity).await,
                }
            }
        }
    }

    pub async fn persist(
        &self,
        record: &NormalizedRecord,
        mode: MatchMode,
        seen_at: DateTime<Utc>,
    ) -> Result<MergeOutcome, StoreError> {
        match self.find_match(record, mode).await? {
            Some(mut entity) => {
                merge_into(&mut entity, record, seen_at);
                self.store.update(&entity).await?;
                debug!(id = %entity.id, key = %entity.identity_key, "merged into existing entity");
                Ok(MergeOutcome::Updated(entity))
            }
            None => {
                let entity = self.store.create(record, seen_at).await?;
                debug!(id = %entity.id, key = %entity.identity_key, "created entity");
                Ok(MergeOutcome::Created(entity))
            }
        }
    }

    pub async fn purge_source(&self, source: &str) -> Result<u64, StoreError> {
        self.store.deactivate_source(source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;
    use chrono::{TimeDelta, TimeZone};
    use jobagg_core::{IdentityKey, RawFieldSet};
    use jobagg_storage::{EntityFilter, MemoryRecordStore};
    use uuid::Uuid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).single().unwrap()
    }

    fn record(raw: RawFieldSet, now: DateTime<Utc>) -> NormalizedRecord {
        Normalizer::default().normalize(&raw, now).unwrap()
    }

    #[test]
    fn merge_keeps_stored_values_when_incoming_is_empty() {
        let first = record(
            RawFieldSet::new("naukri")
                .with_title("SOC Analyst")
                .with_company("Acme")
                .with_location("Pune")
                .with_salary("₹5-8L")
                .with_posted("2026-09-30")
                .with_description("SIEM and Splunk"),
            t0(),
        );
        let mut stored = StoredEntity::from_record(Uuid::new_v4(), &first, t0());

        let later = t0() + TimeDelta::days(1);
        let second = record(
            RawFieldSet::new("naukri")
                .with_title("soc analyst")
                .with_company("ACME")
                .with_experience("2-5 Yrs")
                .with_description("Nessus scanning"),
            later,
        );
        merge_into(&mut stored, &second, later);

        assert_eq!(stored.location, "Pune");
        assert_eq!(stored.salary.as_deref(), Some("₹5-8L"));
        assert_eq!(stored.experience.as_deref(), Some("2-5 Yrs"));
        assert_eq!(stored.description.as_deref(), Some("Nessus scanning"));
        assert_eq!(stored.posted_at, first.posted_at);
        assert_eq!(stored.skills, vec!["SIEM", "Splunk", "Nessus"]);
        assert_eq!(stored.title, "SOC Analyst");
        assert_eq!(stored.company, "Acme");
        assert_eq!(stored.scraped_at, later);
        assert_eq!(stored.created_at, t0());
    }

    #[test]
    fn merge_reactivates_and_takes_observed_location() {
        let first = record(
            RawFieldSet::new("indeed").with_title("Pen Tester").with_company("Red Lantern"),
            t0(),
        );
        let mut stored = StoredEntity::from_record(Uuid::new_v4(), &first, t0());
        stored.is_active = false;
        assert_eq!(stored.location, "India");

        let second = record(
            RawFieldSet::new("indeed")
                .with_title("Pen Tester")
                .with_company("Red Lantern")
                .with_location("Remote"),
            t0(),
        );
        merge_into(&mut stored, &second, t0());
        assert!(stored.is_active);
        assert_eq!(stored.location, "Remote");
    }

    #[tokio::test]
    async fn strict_persist_creates_then_updates() {
        let store = Arc::new(MemoryRecordStore::new());
        let persister = MergePersister::new(store.clone());
        let rec = record(
            RawFieldSet::new("naukri").with_title("SOC Analyst").with_company("Acme"),
            t0(),
        );

        let created = persister.persist(&rec, MatchMode::Strict, t0()).await.unwrap();
        assert!(matches!(created, MergeOutcome::Created(_)));
        let updated = persister
            .persist(&rec, MatchMode::Strict, t0() + TimeDelta::hours(4))
            .await
            .unwrap();
        assert!(matches!(updated, MergeOutcome::Updated(_)));
        assert_eq!(created.entity().id, updated.entity().id);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn upsert_matches_entity_with_drifted_key() {
        let rec = record(
            RawFieldSet::new("naukri").with_title("SOC Analyst").with_company("Acme"),
            t0(),
        );
        let mut legacy = StoredEntity::from_record(Uuid::new_v4(), &rec, t0());
        legacy.identity_key = IdentityKey::from_stored("naukri_SOC Analyst_Acme");
        let legacy_id = legacy.id;
        let store = Arc::new(MemoryRecordStore::with_entities(vec![legacy]));
        let persister = MergePersister::new(store.clone());

        assert!(persister.find_match(&rec, MatchMode::Strict).await.unwrap().is_none());
        let outcome = persister.persist(&rec, MatchMode::Upsert, t0()).await.unwrap();
        assert_eq!(outcome.entity().id, legacy_id);
        assert_eq!(outcome.entity().identity_key.as_str(), "naukri_SOC Analyst_Acme");
        assert_eq!(store.list(&EntityFilter::default()).await.unwrap().len(), 1);
    }
}
