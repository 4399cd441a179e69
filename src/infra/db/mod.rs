//! Postgres-backed repository implementations.

mod agendas;
mod announcements;
mod audit;
mod auth;
mod categories;
mod feed;
mod news;
mod references;
mod roles;
mod seed;
mod showcase;
mod tags;
mod users;
mod util;

pub use seed::{SeedAdmin, SeedReport, seed};
pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder, Transaction,
    postgres::{PgPool, PgPoolOptions},
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::lifecycle::LifecycleState;
use crate::domain::slug::in_family;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'_, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    /// Whether a row other than `excluding` has `value` in `column`, trashed rows included.
    async fn value_taken(
        &self,
        table: &'static str,
        column: &'static str,
        value: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT EXISTS (SELECT 1 FROM ");
        qb.push(table);
        qb.push(" WHERE ");
        qb.push(column);
        qb.push(" = ");
        qb.push_bind(value.to_string());
        if let Some(id) = excluding {
            qb.push(" AND id <> ");
            qb.push_bind(id);
        }
        qb.push(")");

        qb.build_query_scalar::<bool>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    /// Slugs in `table` that are `base` or `base-<n>`, trashed rows included.
    async fn slugs_in_family(
        &self,
        table: &'static str,
        base: &str,
        excluding: Option<Uuid>,
    ) -> Result<Vec<String>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT slug FROM ");
        qb.push(table);
        qb.push(" WHERE (slug = ");
        qb.push_bind(base.to_string());
        qb.push(" OR slug LIKE ");
        qb.push_bind(format!("{}-%", escape_like(base)));
        qb.push(")");
        if let Some(id) = excluding {
            qb.push(" AND id <> ");
            qb.push_bind(id);
        }

        let slugs = qb
            .build_query_scalar::<String>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(slugs
            .into_iter()
            .filter(|slug| in_family(base, slug))
            .collect())
    }

    /// Set `deleted_at` on an active row.
    async fn mark_deleted(
        &self,
        table: &'static str,
        id: Uuid,
        at: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(table);
        qb.push(" SET deleted_at = ");
        qb.push_bind(at);
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND deleted_at IS NULL");

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    /// Clear `deleted_at` on a trashed row.
    async fn clear_deleted(&self, table: &'static str, id: Uuid) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE ");
        qb.push(table);
        qb.push(" SET deleted_at = NULL WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND deleted_at IS NOT NULL");

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }

    /// Physically remove a trashed row; `false` when none matched.
    async fn delete_trashed(
        executor: &mut Transaction<'_, Postgres>,
        table: &'static str,
        id: Uuid,
    ) -> Result<bool, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM ");
        qb.push(table);
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND deleted_at IS NOT NULL");

        let result = qb
            .build()
            .execute(&mut **executor)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

/// SQL predicate selecting rows in `state`, qualified by `alias` when given.
fn state_predicate(state: LifecycleState, alias: Option<&str>) -> String {
    let column = match alias {
        Some(alias) => format!("{alias}.deleted_at"),
        None => "deleted_at".to_string(),
    };
    match state {
        LifecycleState::Active => format!("{column} IS NULL"),
        LifecycleState::Trashed => format!("{column} IS NOT NULL"),
        LifecycleState::Purged => "FALSE".to_string(),
    }
}

/// `%term%` for `ILIKE`, with the pattern metacharacters escaped.
fn like_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Reject a unique-check field the table does not know.
fn unknown_field(field: &str) -> RepoError {
    RepoError::InvalidInput {
        message: format!("`{field}` is not a unique field"),
    }
}
