//! Idempotent bootstrap of the permission catalogue, built-in roles and the first administrator.

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::permissions::{SUPER_ADMIN_ROLE, catalogue, default_roles};
use crate::domain::slug::{derive_slug, next_free_slug};

use super::{PostgresRepositories, map_sqlx_error};

/// The administrator account created on first seed. The password is already hashed.
#[derive(Debug, Clone)]
pub struct SeedAdmin {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: u64,
    pub roles_created: u64,
    pub admin_created: bool,
}

pub async fn seed(repos: &PostgresRepositories, admin: &SeedAdmin) -> Result<SeedReport, RepoError> {
    let mut report = SeedReport::default();
    let now = OffsetDateTime::now_utc();
    let mut tx = repos.begin().await.map_err(map_sqlx_error)?;

    for permission in catalogue() {
        let inserted = sqlx::query(
            "INSERT INTO permissions (name, created_at) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(permission.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        report.permissions_created += inserted.rows_affected();
    }

    let mut super_admin_role = None;
    for (name, permissions) in default_roles() {
        let created: Option<Uuid> = sqlx::query_scalar(
            "INSERT INTO roles (id, name, created_at, updated_at) VALUES ($1, $2, $3, $3) \
             ON CONFLICT (name) DO NOTHING RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let role_id = match created {
            Some(id) => {
                report.roles_created += 1;
                id
            }
            None => sqlx::query_scalar("SELECT id FROM roles WHERE name = $1")
                .bind(name)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?,
        };

        let names: Vec<String> = permissions.iter().map(|p| p.as_str().to_string()).collect();
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission) \
             SELECT $1, name FROM unnest($2::text[]) AS name ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(names)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if name == SUPER_ADMIN_ROLE {
            super_admin_role = Some(role_id);
        }
    }
    tx.commit().await.map_err(map_sqlx_error)?;

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&admin.email)
        .fetch_optional(repos.pool())
        .await
        .map_err(map_sqlx_error)?;

    let admin_id = match existing {
        Some(id) => id,
        None => {
            let base = derive_slug(&admin.name).map_err(|err| RepoError::InvalidInput {
                message: err.to_string(),
            })?;
            let taken = repos.slugs_in_family("users", &base, None).await?;
            let slug = next_free_slug(&base, |candidate| taken.iter().any(|t| t == candidate));

            let id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO users (id, name, slug, email, password_hash, email_verified_at, \
                     created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $6, $6)",
            )
            .bind(id)
            .bind(&admin.name)
            .bind(slug)
            .bind(&admin.email)
            .bind(&admin.password_hash)
            .bind(now)
            .execute(repos.pool())
            .await
            .map_err(map_sqlx_error)?;
            report.admin_created = true;
            id
        }
    };

    if let Some(role_id) = super_admin_role {
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(admin_id)
        .bind(role_id)
        .execute(repos.pool())
        .await
        .map_err(map_sqlx_error)?;
    }

    info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        admin_created = report.admin_created,
        "seed completed"
    );
    Ok(report)
}
