use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobagg_core::{IdentityKey, NormalizedRecord, StoredEntity};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::info;
use uuid::Uuid;

use crate::{EntityFilter, RecordStore, StoreError};

const ENTITY_COLUMNS: &str = "id, identity_key, source, title, company, location, salary, experience, \
     description, skills, url, posted_at, scraped_at, created_at, is_active";

/// Postgres-backed store over the `jobs` table (see `migrations/`).
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .context("running jobs migrations")?;
        info!("jobs schema migrated");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn entity_from_row(row: &PgRow) -> Result<StoredEntity, sqlx::Error> {
    Ok(StoredEntity {
        id: row.try_get("id")?,
        identity_key: IdentityKey::from_stored(row.try_get::<String, _>("identity_key")?),
        source: row.try_get("source")?,
        title: row.try_get("title")?,
        company: row.try_get("company")?,
        location: row.try_get("location")?,
        salary: row.try_get("salary")?,
        experience: row.try_get("experience")?,
        description: row.try_get("description")?,
        skills: row.try_get("skills")?,
        url: row.try_get("url")?,
        posted_at: row.try_get("posted_at")?,
        scraped_at: row.try_get("scraped_at")?,
        created_at: row.try_get("created_at")?,
        is_active: row.try_get("is_active")?,
    })
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find_by_identity(
        &self,
        key: &IdentityKey,
    ) -> Result<Option<StoredEntity>, StoreError> {
        let sql = format!("SELECT {ENTITY_COLUMNS} FROM jobs WHERE identity_key = $1");
        let row = sqlx::query(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(entity_from_row).transpose()?)
    }

    async fn find_by_source_title_company(
        &self,
        source: &str,
        title: &str,
        company: &str,
    ) -> Result<Option<StoredEntity>, StoreError> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM jobs \
             WHERE source = $1 AND lower(title) = lower($2) AND lower(company) = lower($3) \
             ORDER BY is_active DESC, scraped_at DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(source)
            .bind(title)
            .bind(company)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(entity_from_row).transpose()?)
    }

    async fn create(
        &self,
        record: &NormalizedRecord,
        seen_at: DateTime<Utc>,
    ) -> Result<StoredEntity, StoreError> {
        let entity = StoredEntity::from_record(Uuid::new_v4(), record, seen_at);
        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, identity_key, source, title, company, location, salary, experience,
                              description, skills, url, posted_at, scraped_at, created_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(entity.id)
        .bind(entity.identity_key.as_str())
        .bind(&entity.source)
        .bind(&entity.title)
        .bind(&entity.company)
        .bind(&entity.location)
        .bind(&entity.salary)
        .bind(&entity.experience)
        .bind(&entity.description)
        .bind(&entity.skills)
        .bind(&entity.url)
        .bind(entity.posted_at)
        .bind(entity.scraped_at)
        .bind(entity.created_at)
        .bind(entity.is_active)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(entity),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::Conflict(entity.identity_key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, entity: &StoredEntity) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET location = $2, salary = $3, experience = $4, description = $5, skills = $6,
                url = $7, posted_at = $8, scraped_at = $9, is_active = $10
            WHERE id = $1
            "#,
        )
        .bind(entity.id)
        .bind(&entity.location)
        .bind(&entity.salary)
        .bind(&entity.experience)
        .bind(&entity.description)
        .bind(&entity.skills)
        .bind(&entity.url)
        .bind(entity.posted_at)
        .bind(entity.scraped_at)
        .bind(entity.is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(entity.id));
        }
        Ok(())
    }

    async fn deactivate_source(&self, source: &str) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE jobs SET is_active = FALSE WHERE source = $1 AND is_active")
                .bind(source)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn list(&self, filter: &EntityFilter) -> Result<Vec<StoredEntity>, StoreError> {
        let sql = format!(
            "SELECT {ENTITY_COLUMNS} FROM jobs \
             WHERE ($1::text IS NULL OR source = $1) AND (NOT $2 OR is_active) \
             ORDER BY scraped_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.source.as_deref())
            .bind(filter.active_only)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(entity_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}
