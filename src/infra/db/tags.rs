use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{Draft, PurgeOutcome, RepoError, ResourceRepo};
use crate::application::resources::{TagFields, Tags};
use crate::domain::entities::TagRecord;
use crate::domain::lifecycle::LifecycleState;

use super::{PostgresRepositories, like_pattern, map_sqlx_error, state_predicate, unknown_field};

const COLUMNS: &str = "id, tag, slug, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct TagRow {
    id: Uuid,
    tag: String,
    slug: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<TagRow> for TagRecord {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            tag: row.tag,
            slug: row.slug,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl ResourceRepo<Tags> for PostgresRepositories {
    async fn list(&self, state: LifecycleState) -> Result<Vec<TagRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM tags WHERE {} ORDER BY tag ASC",
            state_predicate(state, None)
        );
        let rows = sqlx::query_as::<_, TagRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn search(&self, term: &str) -> Result<Vec<TagRecord>, RepoError> {
        let pattern = like_pattern(term);
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM tags"));
        qb.push(" WHERE deleted_at IS NULL AND (tag ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR slug ILIKE ");
        qb.push_bind(pattern);
        qb.push(") ORDER BY tag ASC");

        let rows = qb
            .build_query_as::<TagRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn find(&self, id: Uuid, state: LifecycleState) -> Result<Option<TagRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM tags WHERE id = $1 AND {}",
            state_predicate(state, None)
        );
        let row = sqlx::query_as::<_, TagRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(TagRecord::from))
    }

    async fn insert(&self, draft: &Draft<TagFields>) -> Result<TagRecord, RepoError> {
        let sql = format!(
            "INSERT INTO tags (id, tag, slug, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, TagRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&draft.fields.tag)
            .bind(draft.slug.as_deref().unwrap_or_default())
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<TagFields>,
    ) -> Result<Option<TagRecord>, RepoError> {
        let sql = format!(
            "UPDATE tags SET tag = $2, slug = $3, updated_at = $4 \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, TagRow>(&sql)
            .bind(id)
            .bind(&draft.fields.tag)
            .bind(draft.slug.as_deref().unwrap_or_default())
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(TagRecord::from))
    }

    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        self.mark_deleted("tags", id, at).await
    }

    async fn restore(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError> {
        if !self.clear_deleted("tags", id).await? {
            return Ok(None);
        }
        ResourceRepo::<Tags>::find(self, id, LifecycleState::Active).await
    }

    /// Detaches the tag from every article before removing it.
    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<TagRecord>, RepoError> {
        let Some(record) = ResourceRepo::<Tags>::find(self, id, LifecycleState::Trashed).await?
        else {
            return Ok(PurgeOutcome::Missing);
        };

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("DELETE FROM news_tags WHERE tag_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if !Self::delete_trashed(&mut tx, "tags", id).await? {
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
        self.slugs_in_family("tags", base, excluding).await
    }

    async fn value_exists(
        &self,
        field: &'static str,
        value: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        match field {
            "tag" => self.value_taken("tags", "tag", value, excluding).await,
            other => Err(unknown_field(other)),
        }
    }
}
