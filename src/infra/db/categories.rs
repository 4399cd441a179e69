use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{Draft, PurgeOutcome, RepoError, ResourceRepo};
use crate::application::resources::{Categories, CategoryFields};
use crate::domain::entities::CategoryRecord;
use crate::domain::lifecycle::LifecycleState;
use crate::domain::types::ResourceKind;

use super::{PostgresRepositories, like_pattern, map_sqlx_error, state_predicate, unknown_field};

const COLUMNS: &str = "id, category, slug, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    category: String,
    slug: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            category: row.category,
            slug: row.slug,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl ResourceRepo<Categories> for PostgresRepositories {
    async fn list(&self, state: LifecycleState) -> Result<Vec<CategoryRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM categories WHERE {} ORDER BY category ASC",
            state_predicate(state, None)
        );
        let rows = sqlx::query_as::<_, CategoryRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(CategoryRecord::from).collect())
    }

    async fn search(&self, term: &str) -> Result<Vec<CategoryRecord>, RepoError> {
        let pattern = like_pattern(term);
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM categories"));
        qb.push(" WHERE deleted_at IS NULL AND (category ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR slug ILIKE ");
        qb.push_bind(pattern);
        qb.push(") ORDER BY category ASC");

        let rows = qb
            .build_query_as::<CategoryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(CategoryRecord::from).collect())
    }

    async fn find(
        &self,
        id: Uuid,
        state: LifecycleState,
    ) -> Result<Option<CategoryRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM categories WHERE id = $1 AND {}",
            state_predicate(state, None)
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(CategoryRecord::from))
    }

    async fn insert(&self, draft: &Draft<CategoryFields>) -> Result<CategoryRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let sql = format!(
            "INSERT INTO categories (id, category, slug, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&draft.fields.category)
            .bind(draft.slug.as_deref().unwrap_or_default())
            .bind(now)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<CategoryFields>,
    ) -> Result<Option<CategoryRecord>, RepoError> {
        let sql = format!(
            "UPDATE categories SET category = $2, slug = $3, updated_at = $4 \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(id)
            .bind(&draft.fields.category)
            .bind(draft.slug.as_deref().unwrap_or_default())
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(CategoryRecord::from))
    }

    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        self.mark_deleted("categories", id, at).await
    }

    async fn restore(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError> {
        if !self.clear_deleted("categories", id).await? {
            return Ok(None);
        }
        ResourceRepo::<Categories>::find(self, id, LifecycleState::Active).await
    }

    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<CategoryRecord>, RepoError> {
        let Some(record) =
            ResourceRepo::<Categories>::find(self, id, LifecycleState::Trashed).await?
        else {
            return Ok(PurgeOutcome::Missing);
        };

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let referencing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news WHERE category_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if referencing > 0 {
            return Ok(PurgeOutcome::Referenced {
                by: ResourceKind::News,
                count: referencing,
            });
        }

        if !Self::delete_trashed(&mut tx, "categories", id).await? {
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
        self.slugs_in_family("categories", base, excluding).await
    }

    async fn value_exists(
        &self,
        field: &'static str,
        value: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        match field {
            "category" => self.value_taken("categories", "category", value, excluding).await,
            other => Err(unknown_field(other)),
        }
    }
}
