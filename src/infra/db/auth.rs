//! Credentials, access tokens and password resets.

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{AuthRepo, NewAccessToken, RepoError};
use crate::domain::entities::{AccessTokenRecord, OneTimeTokenRecord, UserCredentials};
use crate::domain::permissions::{AuthorizationSnapshot, Permission, RoleGrant};

use super::{PostgresRepositories, map_sqlx_error};

const TOKEN_COLUMNS: &str =
    "id, user_id, prefix, hashed_secret, expires_at, revoked_at, last_used_at, created_at";
const ONE_TIME_COLUMNS: &str = "id, user_id, hashed_token, expires_at, created_at";

#[derive(sqlx::FromRow)]
struct CredentialsRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    email_verified_at: Option<OffsetDateTime>,
}

impl From<CredentialsRow> for UserCredentials {
    fn from(row: CredentialsRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            email_verified_at: row.email_verified_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccessTokenRow {
    id: Uuid,
    user_id: Uuid,
    prefix: String,
    hashed_secret: Vec<u8>,
    expires_at: OffsetDateTime,
    revoked_at: Option<OffsetDateTime>,
    last_used_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl From<AccessTokenRow> for AccessTokenRecord {
    fn from(row: AccessTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            prefix: row.prefix,
            hashed_secret: row.hashed_secret,
            expires_at: row.expires_at,
            revoked_at: row.revoked_at,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct OneTimeTokenRow {
    id: Uuid,
    user_id: Uuid,
    hashed_token: Vec<u8>,
    expires_at: OffsetDateTime,
    created_at: OffsetDateTime,
}

impl From<OneTimeTokenRow> for OneTimeTokenRecord {
    fn from(row: OneTimeTokenRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            hashed_token: row.hashed_token,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RoleGrantRow {
    name: String,
    active: bool,
    permissions: Vec<String>,
}

#[async_trait]
impl AuthRepo for PostgresRepositories {
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, RepoError> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT id, name, email, password_hash, email_verified_at FROM users \
             WHERE lower(email) = lower($1) AND deleted_at IS NULL",
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserCredentials::from))
    }

    async fn find_credentials(&self, user_id: Uuid) -> Result<Option<UserCredentials>, RepoError> {
        let row = sqlx::query_as::<_, CredentialsRow>(
            "SELECT id, name, email, password_hash, email_verified_at FROM users \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(row.map(UserCredentials::from))
    }

    async fn authorization_snapshot(
        &self,
        user_id: Uuid,
    ) -> Result<AuthorizationSnapshot, RepoError> {
        let direct: Vec<String> = sqlx::query_scalar(
            "SELECT permission FROM user_permissions WHERE user_id = $1 ORDER BY permission",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let roles = sqlx::query_as::<_, RoleGrantRow>(
            "SELECT r.name, r.deleted_at IS NULL AS active, \
                 COALESCE(array_agg(rp.permission ORDER BY rp.permission) \
                     FILTER (WHERE rp.permission IS NOT NULL), '{}') AS permissions \
             FROM user_roles ur \
             JOIN roles r ON r.id = ur.role_id \
             LEFT JOIN role_permissions rp ON rp.role_id = r.id \
             WHERE ur.user_id = $1 \
             GROUP BY r.id, r.name, r.deleted_at \
             ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(AuthorizationSnapshot {
            direct: direct.into_iter().map(Permission::new).collect(),
            roles: roles
                .into_iter()
                .map(|row| RoleGrant {
                    name: row.name,
                    permissions: row.permissions.into_iter().map(Permission::new).collect(),
                    active: row.active,
                })
                .collect(),
        })
    }

    async fn create_token(&self, token: NewAccessToken) -> Result<AccessTokenRecord, RepoError> {
        let sql = format!(
            "INSERT INTO access_tokens (id, user_id, prefix, hashed_secret, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {TOKEN_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AccessTokenRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(token.user_id)
            .bind(token.prefix)
            .bind(token.hashed_secret)
            .bind(token.expires_at)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn find_token_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<AccessTokenRecord>, RepoError> {
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM access_tokens WHERE prefix = $1");
        let row = sqlx::query_as::<_, AccessTokenRow>(&sql)
            .bind(prefix)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(AccessTokenRecord::from))
    }

    async fn touch_token(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query("UPDATE access_tokens SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn revoke_token(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE access_tokens SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(password_hash)
        .bind(OffsetDateTime::now_utc())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn create_password_reset(
        &self,
        user_id: Uuid,
        hashed_token: Vec<u8>,
        expires_at: OffsetDateTime,
    ) -> Result<OneTimeTokenRecord, RepoError> {
        self.insert_one_time_token("password_resets", user_id, hashed_token, expires_at)
            .await
    }

    async fn password_resets(&self, user_id: Uuid) -> Result<Vec<OneTimeTokenRecord>, RepoError> {
        self.one_time_tokens("password_resets", user_id).await
    }

    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        password_hash: &str,
        at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let updated = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = $3 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(password_hash)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if updated.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        sqlx::query("DELETE FROM password_resets WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        sqlx::query(
            "UPDATE access_tokens SET revoked_at = $2 WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn create_email_verification(
        &self,
        user_id: Uuid,
        hashed_token: Vec<u8>,
        expires_at: OffsetDateTime,
    ) -> Result<OneTimeTokenRecord, RepoError> {
        self.insert_one_time_token("email_verifications", user_id, hashed_token, expires_at)
            .await
    }

    async fn email_verifications(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OneTimeTokenRecord>, RepoError> {
        self.one_time_tokens("email_verifications", user_id).await
    }

    async fn mark_email_verified(
        &self,
        user_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let updated = sqlx::query(
            "UPDATE users SET email_verified_at = COALESCE(email_verified_at, $2) \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if updated.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }

        sqlx::query("DELETE FROM email_verifications WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

impl PostgresRepositories {
    async fn insert_one_time_token(
        &self,
        table: &'static str,
        user_id: Uuid,
        hashed_token: Vec<u8>,
        expires_at: OffsetDateTime,
    ) -> Result<OneTimeTokenRecord, RepoError> {
        let sql = format!(
            "INSERT INTO {table} (id, user_id, hashed_token, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ONE_TIME_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OneTimeTokenRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(hashed_token)
            .bind(expires_at)
            .bind(OffsetDateTime::now_utc())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.into())
    }

    async fn one_time_tokens(
        &self,
        table: &'static str,
        user_id: Uuid,
    ) -> Result<Vec<OneTimeTokenRecord>, RepoError> {
        let sql = format!(
            "SELECT {ONE_TIME_COLUMNS} FROM {table} WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, OneTimeTokenRow>(&sql)
            .bind(user_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(OneTimeTokenRecord::from).collect())
    }
}
