//! Public news reads and the draft/publish workflow.

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{FeedScope, NewsFeedRepo, RepoError};
use crate::domain::entities::NewsRecord;
use crate::domain::lifecycle::LifecycleState;

use super::news::{NewsRow, SELECT_NEWS};
use super::{PostgresRepositories, map_sqlx_error};

const PUBLISHED: &str = " WHERE n.deleted_at IS NULL AND n.is_published";
const NEWEST_FIRST: &str = " ORDER BY n.published_at DESC NULLS LAST, n.created_at DESC";

#[async_trait]
impl NewsFeedRepo for PostgresRepositories {
    async fn scope_exists(&self, scope: FeedScope<'_>) -> Result<bool, RepoError> {
        let (table, slug) = match scope {
            FeedScope::Author(slug) => ("users", slug),
            FeedScope::Category(slug) => ("categories", slug),
            FeedScope::Tag(slug) => ("tags", slug),
        };
        let sql =
            format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE slug = $1 AND deleted_at IS NULL)");
        sqlx::query_scalar::<_, bool>(&sql)
            .bind(slug)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn list_published(&self, scope: FeedScope<'_>) -> Result<Vec<NewsRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_NEWS);
        qb.push(PUBLISHED);
        match scope {
            FeedScope::Author(slug) => {
                qb.push(" AND u.slug = ");
                qb.push_bind(slug.to_string());
            }
            FeedScope::Category(slug) => {
                qb.push(" AND c.slug = ");
                qb.push_bind(slug.to_string());
            }
            FeedScope::Tag(slug) => {
                qb.push(
                    " AND EXISTS (SELECT 1 FROM news_tags nt JOIN tags t ON t.id = nt.tag_id \
                     WHERE nt.news_id = n.id AND t.deleted_at IS NULL AND t.slug = ",
                );
                qb.push_bind(slug.to_string());
                qb.push(")");
            }
        }
        qb.push(NEWEST_FIRST);

        let rows = qb
            .build_query_as::<NewsRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(NewsRecord::from).collect())
    }

    async fn find_published(&self, slug: &str) -> Result<Option<NewsRecord>, RepoError> {
        let sql = format!("{SELECT_NEWS}{PUBLISHED} AND n.slug = $1");
        let row = sqlx::query_as::<_, NewsRow>(&sql)
            .bind(slug)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(NewsRecord::from))
    }

    async fn list_drafts(&self) -> Result<Vec<NewsRecord>, RepoError> {
        let sql = format!(
            "{SELECT_NEWS} WHERE n.deleted_at IS NULL AND NOT n.is_published \
             ORDER BY n.created_at DESC"
        );
        let rows = sqlx::query_as::<_, NewsRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(NewsRecord::from).collect())
    }

    async fn publish(&self, id: Uuid, at: OffsetDateTime) -> Result<Option<NewsRecord>, RepoError> {
        let result = sqlx::query(
            "UPDATE news SET is_published = TRUE, published_at = COALESCE(published_at, $2), \
                 updated_at = $2 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_news(id, LifecycleState::Active).await
    }
}
