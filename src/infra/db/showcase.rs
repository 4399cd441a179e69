//! Galleries and facilities share one table shape.

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{Draft, PurgeOutcome, RepoError, ResourceRepo};
use crate::application::resources::{Facilities, Galleries, ShowcaseFields};
use crate::domain::entities::ShowcaseRecord;
use crate::domain::lifecycle::LifecycleState;

use super::{PostgresRepositories, like_pattern, map_sqlx_error, state_predicate, unknown_field};

const COLUMNS: &str =
    "id, title, description, image_url, image_name, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct ShowcaseRow {
    id: Uuid,
    title: String,
    description: String,
    image_url: String,
    image_name: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<ShowcaseRow> for ShowcaseRecord {
    fn from(row: ShowcaseRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            image_url: row.image_url,
            image_name: row.image_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

impl PostgresRepositories {
    async fn showcase_list(
        &self,
        table: &'static str,
        state: LifecycleState,
    ) -> Result<Vec<ShowcaseRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {table} WHERE {} ORDER BY created_at DESC",
            state_predicate(state, None)
        );
        let rows = sqlx::query_as::<_, ShowcaseRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ShowcaseRecord::from).collect())
    }

    async fn showcase_search(
        &self,
        table: &'static str,
        term: &str,
    ) -> Result<Vec<ShowcaseRecord>, RepoError> {
        let pattern = like_pattern(term);
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM {table}"));
        qb.push(" WHERE deleted_at IS NULL AND (title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR description ILIKE ");
        qb.push_bind(pattern);
        qb.push(") ORDER BY created_at DESC");

        let rows = qb
            .build_query_as::<ShowcaseRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(ShowcaseRecord::from).collect())
    }

    async fn showcase_find(
        &self,
        table: &'static str,
        id: Uuid,
        state: LifecycleState,
    ) -> Result<Option<ShowcaseRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {table} WHERE id = $1 AND {}",
            state_predicate(state, None)
        );
        let row = sqlx::query_as::<_, ShowcaseRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ShowcaseRecord::from))
    }

    async fn showcase_insert(
        &self,
        table: &'static str,
        draft: &Draft<ShowcaseFields>,
    ) -> Result<ShowcaseRecord, RepoError> {
        let Some(image) = draft.image.as_ref() else {
            return Err(RepoError::InvalidInput {
                message: format!("{table} rows require an image"),
            });
        };

        let sql = format!(
            "INSERT INTO {table} (id, title, description, image_url, image_name, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ShowcaseRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&draft.fields.title)
            .bind(&draft.fields.description)
            .bind(&image.url)
            .bind(&image.path)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    /// Keeps the stored image unless the draft carries a new one.
    async fn showcase_update(
        &self,
        table: &'static str,
        id: Uuid,
        draft: &Draft<ShowcaseFields>,
    ) -> Result<Option<ShowcaseRecord>, RepoError> {
        let sql = format!(
            "UPDATE {table} SET title = $2, description = $3, \
                 image_url = COALESCE($4, image_url), image_name = COALESCE($5, image_name), \
                 updated_at = $6 \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, ShowcaseRow>(&sql)
            .bind(id)
            .bind(&draft.fields.title)
            .bind(&draft.fields.description)
            .bind(draft.image.as_ref().map(|image| image.url.clone()))
            .bind(draft.image.as_ref().map(|image| image.path.clone()))
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(ShowcaseRecord::from))
    }

    async fn showcase_restore(
        &self,
        table: &'static str,
        id: Uuid,
    ) -> Result<Option<ShowcaseRecord>, RepoError> {
        if !self.clear_deleted(table, id).await? {
            return Ok(None);
        }
        self.showcase_find(table, id, LifecycleState::Active).await
    }

    async fn showcase_purge(
        &self,
        table: &'static str,
        id: Uuid,
    ) -> Result<PurgeOutcome<ShowcaseRecord>, RepoError> {
        let Some(record) = self.showcase_find(table, id, LifecycleState::Trashed).await? else {
            return Ok(PurgeOutcome::Missing);
        };

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        if !Self::delete_trashed(&mut tx, table, id).await? {
            return Ok(PurgeOutcome::Missing);
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(PurgeOutcome::Purged(record))
    }
}

macro_rules! showcase_repo {
    ($resource:ty, $table:literal) => {
        #[async_trait]
        impl ResourceRepo<$resource> for PostgresRepositories {
            async fn list(&self, state: LifecycleState) -> Result<Vec<ShowcaseRecord>, RepoError> {
                self.showcase_list($table, state).await
            }

            async fn search(&self, term: &str) -> Result<Vec<ShowcaseRecord>, RepoError> {
                self.showcase_search($table, term).await
            }

            async fn find(
                &self,
                id: Uuid,
                state: LifecycleState,
            ) -> Result<Option<ShowcaseRecord>, RepoError> {
                self.showcase_find($table, id, state).await
            }

            async fn insert(
                &self,
                draft: &Draft<ShowcaseFields>,
            ) -> Result<ShowcaseRecord, RepoError> {
                self.showcase_insert($table, draft).await
            }

            async fn update(
                &self,
                id: Uuid,
                draft: &Draft<ShowcaseFields>,
            ) -> Result<Option<ShowcaseRecord>, RepoError> {
                self.showcase_update($table, id, draft).await
            }

            async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
                self.mark_deleted($table, id, at).await
            }

            async fn restore(&self, id: Uuid) -> Result<Option<ShowcaseRecord>, RepoError> {
                self.showcase_restore($table, id).await
            }

            async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<ShowcaseRecord>, RepoError> {
                self.showcase_purge($table, id).await
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
    };
}

showcase_repo!(Galleries, "galleries");
showcase_repo!(Facilities, "facilities");
