use async_trait::async_trait;
use uuid::Uuid;

use crate::application::repos::{ReferenceKind, ReferenceRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl ReferenceRepo for PostgresRepositories {
    async fn exists(&self, kind: ReferenceKind, value: &str) -> Result<bool, RepoError> {
        let query = match kind {
            ReferenceKind::Category | ReferenceKind::Tag => {
                let Ok(id) = Uuid::parse_str(value) else {
                    return Ok(false);
                };
                let table = if kind == ReferenceKind::Category {
                    "categories"
                } else {
                    "tags"
                };
                let sql = format!(
                    "SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1 AND deleted_at IS NULL)"
                );
                return sqlx::query_scalar::<_, bool>(&sql)
                    .bind(id)
                    .fetch_one(self.pool())
                    .await
                    .map_err(map_sqlx_error);
            }
            ReferenceKind::Role => {
                "SELECT EXISTS (SELECT 1 FROM roles WHERE name = $1 AND deleted_at IS NULL)"
            }
            ReferenceKind::Permission => "SELECT EXISTS (SELECT 1 FROM permissions WHERE name = $1)",
        };

        sqlx::query_scalar::<_, bool>(query)
            .bind(value)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}
