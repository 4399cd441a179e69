use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::application::repos::{Draft, PurgeOutcome, RepoError, ResourceRepo};
use crate::application::resources::{AgendaFields, Agendas};
use crate::domain::entities::AgendaRecord;
use crate::domain::lifecycle::LifecycleState;

use super::{PostgresRepositories, like_pattern, map_sqlx_error, state_predicate, unknown_field};

const COLUMNS: &str = "id, title, slug, description, date, created_at, updated_at, deleted_at";

#[derive(sqlx::FromRow)]
struct AgendaRow {
    id: Uuid,
    title: String,
    slug: String,
    description: String,
    date: Date,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<AgendaRow> for AgendaRecord {
    fn from(row: AgendaRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            description: row.description,
            date: row.date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

#[async_trait]
impl ResourceRepo<Agendas> for PostgresRepositories {
    async fn list(&self, state: LifecycleState) -> Result<Vec<AgendaRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM agendas WHERE {} ORDER BY date DESC, title ASC",
            state_predicate(state, None)
        );
        let rows = sqlx::query_as::<_, AgendaRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(AgendaRecord::from).collect())
    }

    /// Matches the title or the `YYYY-MM-DD` rendering of the date.
    async fn search(&self, term: &str) -> Result<Vec<AgendaRecord>, RepoError> {
        let pattern = like_pattern(term);
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM agendas"));
        qb.push(" WHERE deleted_at IS NULL AND (title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR to_char(date, 'YYYY-MM-DD') ILIKE ");
        qb.push_bind(pattern);
        qb.push(") ORDER BY date DESC, title ASC");

        let rows = qb
            .build_query_as::<AgendaRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(AgendaRecord::from).collect())
    }

    async fn find(
        &self,
        id: Uuid,
        state: LifecycleState,
    ) -> Result<Option<AgendaRecord>, RepoError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM agendas WHERE id = $1 AND {}",
            state_predicate(state, None)
        );
        let row = sqlx::query_as::<_, AgendaRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(AgendaRecord::from))
    }

    async fn insert(&self, draft: &Draft<AgendaFields>) -> Result<AgendaRecord, RepoError> {
        let sql = format!(
            "INSERT INTO agendas (id, title, slug, description, date, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AgendaRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&draft.fields.title)
            .bind(draft.slug.as_deref().unwrap_or_default())
            .bind(&draft.fields.description)
            .bind(draft.fields.date)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<AgendaFields>,
    ) -> Result<Option<AgendaRecord>, RepoError> {
        let sql = format!(
            "UPDATE agendas SET title = $2, slug = $3, description = $4, date = $5, updated_at = $6 \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {COLUMNS}"
        );
        let row = sqlx::query_as::<_, AgendaRow>(&sql)
            .bind(id)
            .bind(&draft.fields.title)
            .bind(draft.slug.as_deref().unwrap_or_default())
            .bind(&draft.fields.description)
            .bind(draft.fields.date)
            .bind(OffsetDateTime::now_utc())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(AgendaRecord::from))
    }

    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        self.mark_deleted("agendas", id, at).await
    }

    async fn restore(&self, id: Uuid) -> Result<Option<AgendaRecord>, RepoError> {
        if !self.clear_deleted("agendas", id).await? {
            return Ok(None);
        }
        ResourceRepo::<Agendas>::find(self, id, LifecycleState::Active).await
    }

    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<AgendaRecord>, RepoError> {
        let Some(record) =
            ResourceRepo::<Agendas>::find(self, id, LifecycleState::Trashed).await?
        else {
            return Ok(PurgeOutcome::Missing);
        };

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        if !Self::delete_trashed(&mut tx, "agendas", id).await? {
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
        self.slugs_in_family("agendas", base, excluding).await
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
