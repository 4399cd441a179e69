use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{Draft, PurgeOutcome, RepoError, ResourceRepo};
use crate::application::resources::{RoleFields, Roles};
use crate::domain::entities::RoleRecord;
use crate::domain::lifecycle::LifecycleState;
use crate::domain::permissions::Permission;

use super::{PostgresRepositories, like_pattern, map_sqlx_error, state_predicate, unknown_field};

const SELECT_ROLES: &str = "SELECT r.id, r.name, r.created_at, r.updated_at, r.deleted_at, \
        COALESCE(array_agg(rp.permission ORDER BY rp.permission) \
            FILTER (WHERE rp.permission IS NOT NULL), '{}') AS permissions \
    FROM roles r \
    LEFT JOIN role_permissions rp ON rp.role_id = r.id";

#[derive(sqlx::FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    permissions: Vec<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<RoleRow> for RoleRecord {
    fn from(row: RoleRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            permissions: row.permissions.into_iter().map(Permission::new).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

impl PostgresRepositories {
    async fn replace_role_permissions(
        tx: &mut Transaction<'_, Postgres>,
        role_id: Uuid,
        permissions: &[Permission],
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        let names: Vec<String> = permissions.iter().map(|p| p.as_str().to_string()).collect();
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission) \
             SELECT $1, name FROM unnest($2::text[]) AS name ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(names)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl ResourceRepo<Roles> for PostgresRepositories {
    async fn list(&self, state: LifecycleState) -> Result<Vec<RoleRecord>, RepoError> {
        let sql = format!(
            "{SELECT_ROLES} WHERE {} GROUP BY r.id ORDER BY r.name ASC",
            state_predicate(state, Some("r"))
        );
        let rows = sqlx::query_as::<_, RoleRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(RoleRecord::from).collect())
    }

    async fn search(&self, term: &str) -> Result<Vec<RoleRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_ROLES);
        qb.push(" WHERE r.deleted_at IS NULL AND r.name ILIKE ");
        qb.push_bind(like_pattern(term));
        qb.push(" GROUP BY r.id ORDER BY r.name ASC");

        let rows = qb
            .build_query_as::<RoleRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(RoleRecord::from).collect())
    }

    async fn find(&self, id: Uuid, state: LifecycleState) -> Result<Option<RoleRecord>, RepoError> {
        let sql = format!(
            "{SELECT_ROLES} WHERE r.id = $1 AND {} GROUP BY r.id",
            state_predicate(state, Some("r"))
        );
        let row = sqlx::query_as::<_, RoleRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(RoleRecord::from))
    }

    async fn insert(&self, draft: &Draft<RoleFields>) -> Result<RoleRecord, RepoError> {
        let id = Uuid::new_v4();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        sqlx::query(
            "INSERT INTO roles (id, name, created_at, updated_at) VALUES ($1, $2, $3, $3)",
        )
        .bind(id)
        .bind(&draft.fields.name)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if let Some(permissions) = &draft.fields.permissions {
            Self::replace_role_permissions(&mut tx, id, permissions).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        ResourceRepo::<Roles>::find(self, id, LifecycleState::Active)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<RoleFields>,
    ) -> Result<Option<RoleRecord>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let updated = sqlx::query(
            "UPDATE roles SET name = $2, updated_at = $3 WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(&draft.fields.name)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(permissions) = &draft.fields.permissions {
            Self::replace_role_permissions(&mut tx, id, permissions).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        ResourceRepo::<Roles>::find(self, id, LifecycleState::Active).await
    }

    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        self.mark_deleted("roles", id, at).await
    }

    async fn restore(&self, id: Uuid) -> Result<Option<RoleRecord>, RepoError> {
        if !self.clear_deleted("roles", id).await? {
            return Ok(None);
        }
        ResourceRepo::<Roles>::find(self, id, LifecycleState::Active).await
    }

    /// Revokes the role from its users and drops its grants with it.
    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<RoleRecord>, RepoError> {
        let Some(record) = ResourceRepo::<Roles>::find(self, id, LifecycleState::Trashed).await?
        else {
            return Ok(PurgeOutcome::Missing);
        };

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        for statement in [
            "DELETE FROM role_permissions WHERE role_id = $1",
            "DELETE FROM user_roles WHERE role_id = $1",
        ] {
            sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        if !Self::delete_trashed(&mut tx, "roles", id).await? {
            return Ok(PurgeOutcome::Missing);
        }
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(PurgeOutcome::Purged(record))
    }

    async fn value_exists(
        &self,
        field: &'static str,
        value: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        match field {
            "name" => self.value_taken("roles", "name", value, excluding).await,
            other => Err(unknown_field(other)),
        }
    }
}
