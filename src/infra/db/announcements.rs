use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{Draft, PurgeOutcome, RepoError, ResourceRepo};
use crate::application::resources::{AnnouncementFields, Announcements};
use crate::domain::entities::AnnouncementRecord;
use crate::domain::lifecycle::LifecycleState;

use super::{PostgresRepositories, like_pattern, map_sqlx_error, state_predicate, unknown_field};

const COLUMNS: &str = "id, title, slug, description, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct AnnouncementRow {
    id: Uuid,
    title: String,
    slug: String,
    description: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<AnnouncementRow> for AnnouncementRecord {
    fn from(row: AnnouncementRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl ResourceRepo<Announcements> for PostgresRepositories {
    async fn list(&self, state: LifecycleState) -> Result<Vec<AnnouncementRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM announcements WHERE {} ORDER BY created_at DESC",
            state_predicate(state, None)
        );
        let rows = sqlx::query_as::<_, AnnouncementRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(AnnouncementRecord::from).collect())
    }

    async fn search(&self, term: &str) -> Result<Vec<AnnouncementRecord>, RepoError> {
        let pattern = like_pattern(term);
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM announcements"));
        qb.push(" WHERE deleted_at IS NULL AND (title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR description ILIKE ");
        qb.push_bind(pattern);
        qb.push(") ORDER BY created_at DESC");

        let rows = qb
            .build_query_as::<AnnouncementRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(AnnouncementRecord::from).collect())
    }

    async fn find(
        &self,
        id: Uuid,
        state: LifecycleState,
    ) -> Result<Option<AnnouncementRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM announcements WHERE id = $1 AND {}",
            state_predicate(state, None)
        );
        let row = sqlx::query_as::<_, AnnouncementRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(AnnouncementRecord::from))
    }

    async fn insert(
        &self,
        draft: &Draft<AnnouncementFields>,
    ) -> Result<AnnouncementRecord, RepoError> {
        let sql = format!(
            "INSERT INTO announcements (id, title, slug, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AnnouncementRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&draft.fields.title)
            .bind(draft.slug.as_deref().unwrap_or_default())
            .bind(&draft.fields.description)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<AnnouncementFields>,
    ) -> Result<Option<AnnouncementRecord>, RepoError> {
        let sql = format!(
            "UPDATE announcements SET title = $2, slug = $3, description = $4, updated_at = $5 \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AnnouncementRow>(&sql)
            .bind(id)
            .bind(&draft.fields.title)
            .bind(draft.slug.as_deref().unwrap_or_default())
            .bind(&draft.fields.description)
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(AnnouncementRecord::from))
    }

    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        self.mark_deleted("announcements", id, at).await
    }

    async fn restore(&self, id: Uuid) -> Result<Option<AnnouncementRecord>, RepoError> {
        if !self.clear_deleted("announcements", id).await? {
            return Ok(None);
        }
        ResourceRepo::<Announcements>::find(self, id, LifecycleState::Active).await
    }

    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<AnnouncementRecord>, RepoError> {
        let Some(record) =
            ResourceRepo::<Announcements>::find(self, id, LifecycleState::Trashed).await?
        else {
            return Ok(PurgeOutcome::Missing);
        };

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        if !Self::delete_trashed(&mut tx, "announcements", id).await? {
            return Ok(PurgeOutcome::Missing);
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(PurgeOutcome::Purged(record))
    }

    async fn slug_family(
        &self,
        base: &str,
        excluding: Option<Uuid>,
    ) -> Result<Vec<String>, RepoError> {
        self.slugs_in_family("announcements", base, excluding).await
    }

    async fn value_exists(
        &self,
        field: &'static str,
        _value: &str,
        _excluding: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        Err(unknown_field(field))
    }
}
