use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{Draft, PurgeOutcome, RepoError, ResourceRepo};
use crate::application::resources::{UserFields, Users};
use crate::domain::entities::UserRecord;
use crate::domain::lifecycle::LifecycleState;
use crate::domain::permissions::Permission;
use crate::domain::types::ResourceKind;

use super::{PostgresRepositories, like_pattern, map_sqlx_error, state_predicate, unknown_field};

/// Users with their active role names and resolved permission set.
const SELECT_USERS: &str = "SELECT u.id, u.name, u.slug, u.email, \
        u.created_at, u.updated_at, u.deleted_at, \
        COALESCE(( \
            SELECT array_agg(r.name ORDER BY r.name) \
            FROM user_roles ur \
            JOIN roles r ON r.id = ur.role_id AND r.deleted_at IS NULL \
            WHERE ur.user_id = u.id \
        ), '{}') AS roles, \
        COALESCE(( \
            SELECT array_agg(grants.permission ORDER BY grants.permission) \
            FROM ( \
                SELECT up.permission FROM user_permissions up WHERE up.user_id = u.id \
                UNION \
                SELECT rp.permission \
                FROM user_roles ur \
                JOIN roles r ON r.id = ur.role_id AND r.deleted_at IS NULL \
                JOIN role_permissions rp ON rp.role_id = r.id \
                WHERE ur.user_id = u.id \
            ) grants \
        ), '{}') AS permissions \
    FROM users u";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    slug: String,
    email: String,
    roles: Vec<String>,
    permissions: Vec<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            email: row.email,
            roles: row.roles,
            permissions: row.permissions.into_iter().map(Permission::new).collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

impl PostgresRepositories {
    async fn replace_user_roles(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        roles: &[String],
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) \
             SELECT $1, r.id FROM roles r WHERE r.name = ANY($2) AND r.deleted_at IS NULL \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(roles.to_vec())
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn replace_user_permissions(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        permissions: &[Permission],
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM user_permissions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;

        let names: Vec<String> = permissions.iter().map(|p| p.as_str().to_string()).collect();
        sqlx::query(
            "INSERT INTO user_permissions (user_id, permission) \
             SELECT $1, name FROM unnest($2::text[]) AS name ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(names)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn sync_user_grants(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
        fields: &UserFields,
    ) -> Result<(), RepoError> {
        if let Some(roles) = &fields.roles {
            Self::replace_user_roles(tx, user_id, roles).await?;
        }
        if let Some(permissions) = &fields.permissions {
            Self::replace_user_permissions(tx, user_id, permissions).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceRepo<Users> for PostgresRepositories {
    async fn list(&self, state: LifecycleState) -> Result<Vec<UserRecord>, RepoError> {
        let sql = format!(
            "{SELECT_USERS} WHERE {} ORDER BY u.name ASC",
            state_predicate(state, Some("u"))
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(UserRecord::from).collect())
    }

    async fn search(&self, term: &str) -> Result<Vec<UserRecord>, RepoError> {
        let pattern = like_pattern(term);
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_USERS);
        qb.push(" WHERE u.deleted_at IS NULL AND (u.name ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR u.email ILIKE ");
        qb.push_bind(pattern);
        qb.push(") ORDER BY u.name ASC");

        let rows = qb
            .build_query_as::<UserRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(UserRecord::from).collect())
    }

    async fn find(&self, id: Uuid, state: LifecycleState) -> Result<Option<UserRecord>, RepoError> {
        let sql = format!(
            "{SELECT_USERS} WHERE u.id = $1 AND {}",
            state_predicate(state, Some("u"))
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(UserRecord::from))
    }

    async fn insert(&self, draft: &Draft<UserFields>) -> Result<UserRecord, RepoError> {
        let Some(password_hash) = draft.fields.password_hash.as_deref() else {
            return Err(RepoError::InvalidInput {
                message: "new users require a password".to_string(),
            });
        };

        let id = Uuid::new_v4();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        sqlx::query(
            "INSERT INTO users (id, name, slug, email, password_hash, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6)",
        )
        .bind(id)
        .bind(&draft.fields.name)
        .bind(draft.slug.as_deref().unwrap_or_default())
        .bind(&draft.fields.email)
        .bind(password_hash)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        Self::sync_user_grants(&mut tx, id, &draft.fields).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        ResourceRepo::<Users>::find(self, id, LifecycleState::Active)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<UserFields>,
    ) -> Result<Option<UserRecord>, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let updated = sqlx::query(
            "UPDATE users SET name = $2, slug = $3, email = $4, updated_at = $5 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(&draft.fields.name)
        .bind(draft.slug.as_deref().unwrap_or_default())
        .bind(&draft.fields.email)
        .bind(OffsetDateTime::now_utc())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        Self::sync_user_grants(&mut tx, id, &draft.fields).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        ResourceRepo::<Users>::find(self, id, LifecycleState::Active).await
    }

    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        self.mark_deleted("users", id, at).await
    }

    async fn restore(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        if !self.clear_deleted("users", id).await? {
            return Ok(None);
        }
        ResourceRepo::<Users>::find(self, id, LifecycleState::Active).await
    }

    /// Refused while news rows name the user as author.
    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<UserRecord>, RepoError> {
        let Some(record) = ResourceRepo::<Users>::find(self, id, LifecycleState::Trashed).await?
        else {
            return Ok(PurgeOutcome::Missing);
        };

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let authored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM news WHERE user_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if authored > 0 {
            return Ok(PurgeOutcome::Referenced {
                by: ResourceKind::News,
                count: authored,
            });
        }

        for statement in [
            "DELETE FROM user_roles WHERE user_id = $1",
            "DELETE FROM user_permissions WHERE user_id = $1",
            "DELETE FROM access_tokens WHERE user_id = $1",
            "DELETE FROM password_resets WHERE user_id = $1",
            "DELETE FROM email_verifications WHERE user_id = $1",
        ] {
            sqlx::query(statement)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }
        if !Self::delete_trashed(&mut tx, "users", id).await? {
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
        self.slugs_in_family("users", base, excluding).await
    }

    async fn value_exists(
        &self,
        field: &'static str,
        value: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        match field {
            "email" => self.value_taken("users", "email", value, excluding).await,
            other => Err(unknown_field(other)),
        }
    }
}
