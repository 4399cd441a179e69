use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{Draft, PurgeOutcome, RepoError, ResourceRepo};
use crate::application::resources::{News, NewsFields};
use crate::domain::entities::{AuthorRef, CategoryRef, NewsRecord, TagSummary};
use crate::domain::lifecycle::LifecycleState;

use super::{PostgresRepositories, like_pattern, map_sqlx_error, state_predicate, unknown_field};

/// News joined with author, category and active tags. Filters use the `n` alias.
pub(super) const SELECT_NEWS: &str = "SELECT n.id, n.title, n.slug, n.content, \
        n.image_url, n.image_name, n.is_published, n.published_at, \
        n.created_at, n.updated_at, n.deleted_at, \
        u.id AS author_id, u.name AS author_name, u.slug AS author_slug, \
        c.id AS category_id, c.category AS category_name, c.slug AS category_slug, \
        COALESCE(tg.ids, '{}') AS tag_ids, \
        COALESCE(tg.names, '{}') AS tag_names, \
        COALESCE(tg.slugs, '{}') AS tag_slugs \
    FROM news n \
    JOIN categories c ON c.id = n.category_id \
    LEFT JOIN users u ON u.id = n.user_id AND u.deleted_at IS NULL \
    LEFT JOIN LATERAL ( \
        SELECT array_agg(t.id ORDER BY t.tag) AS ids, \
               array_agg(t.tag ORDER BY t.tag) AS names, \
               array_agg(t.slug ORDER BY t.tag) AS slugs \
        FROM news_tags nt \
        JOIN tags t ON t.id = nt.tag_id AND t.deleted_at IS NULL \
        WHERE nt.news_id = n.id \
    ) tg ON TRUE";

#[derive(sqlx::FromRow)]
pub(super) struct NewsRow {
    id: Uuid,
    title: String,
    slug: String,
    content: String,
    image_url: Option<String>,
    image_name: Option<String>,
    is_published: bool,
    published_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
    author_id: Option<Uuid>,
    author_name: Option<String>,
    author_slug: Option<String>,
    category_id: Uuid,
    category_name: String,
    category_slug: String,
    tag_ids: Vec<Uuid>,
    tag_names: Vec<String>,
    tag_slugs: Vec<String>,
}

impl From<NewsRow> for NewsRecord {
    fn from(row: NewsRow) -> Self {
        let author = match (row.author_id, row.author_name, row.author_slug) {
            (Some(id), Some(name), Some(slug)) => Some(AuthorRef { id, name, slug }),
            _ => None,
        };
        let tags = row
            .tag_ids
            .into_iter()
            .zip(row.tag_names)
            .zip(row.tag_slugs)
            .map(|((id, tag), slug)| TagSummary { id, tag, slug })
            .collect();

        Self {
            id: row.id,
            title: row.title,
            slug: row.slug,
            content: row.content,
            image_url: row.image_url,
            image_name: row.image_name,
            author,
            category: CategoryRef {
                id: row.category_id,
                category: row.category_name,
                slug: row.category_slug,
            },
            tags,
            is_published: row.is_published,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

impl PostgresRepositories {
    pub(super) async fn find_news(
        &self,
        id: Uuid,
        state: LifecycleState,
    ) -> Result<Option<NewsRecord>, RepoError> {
        let sql = format!(
            "{SELECT_NEWS} WHERE n.id = $1 AND {}",
            state_predicate(state, Some("n"))
        );
        let row = sqlx::query_as::<_, NewsRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.map(NewsRecord::from))
    }

    async fn replace_news_tags(
        tx: &mut Transaction<'_, Postgres>,
        news_id: Uuid,
        tags: &[Uuid],
    ) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM news_tags WHERE news_id = $1")
            .bind(news_id)
            .execute(&mut **tx)
            .await
            .map_err(map_sqlx_error)?;
        sqlx::query(
            "INSERT INTO news_tags (news_id, tag_id) \
             SELECT $1, tag_id FROM unnest($2::uuid[]) AS tag_id ON CONFLICT DO NOTHING",
        )
        .bind(news_id)
        .bind(tags.to_vec())
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[async_trait]
impl ResourceRepo<News> for PostgresRepositories {
    async fn list(&self, state: LifecycleState) -> Result<Vec<NewsRecord>, RepoError> {
        let sql = format!(
            "{SELECT_NEWS} WHERE {} ORDER BY n.created_at DESC",
            state_predicate(state, Some("n"))
        );
        let rows = sqlx::query_as::<_, NewsRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(NewsRecord::from).collect())
    }

    async fn search(&self, term: &str) -> Result<Vec<NewsRecord>, RepoError> {
        let pattern = like_pattern(term);
        let mut qb = QueryBuilder::<Postgres>::new(SELECT_NEWS);
        qb.push(" WHERE n.deleted_at IS NULL AND (n.title ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR n.slug ILIKE ");
        qb.push_bind(pattern);
        qb.push(") ORDER BY n.created_at DESC");

        let rows = qb
            .build_query_as::<NewsRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.into_iter().map(NewsRecord::from).collect())
    }

    async fn find(&self, id: Uuid, state: LifecycleState) -> Result<Option<NewsRecord>, RepoError> {
        self.find_news(id, state).await
    }

    async fn insert(&self, draft: &Draft<NewsFields>) -> Result<NewsRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let fields = &draft.fields;
        let published_at = fields.is_published.then_some(now);

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        sqlx::query(
            "INSERT INTO news (id, title, slug, content, image_url, image_name, user_id, \
                 category_id, is_published, published_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)",
        )
        .bind(id)
        .bind(&fields.title)
        .bind(draft.slug.as_deref().unwrap_or_default())
        .bind(&fields.content)
        .bind(draft.image.as_ref().map(|blob| blob.url.clone()))
        .bind(draft.image.as_ref().map(|blob| blob.path.clone()))
        .bind(draft.actor)
        .bind(fields.category_id)
        .bind(fields.is_published)
        .bind(published_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        if let Some(tags) = &fields.tags {
            Self::replace_news_tags(&mut tx, id, tags).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        self.find_news(id, LifecycleState::Active)
            .await?
            .ok_or(RepoError::NotFound)
    }

    /// The author stays the original writer; `published_at` is kept while published.
    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<NewsFields>,
    ) -> Result<Option<NewsRecord>, RepoError> {
        let now = OffsetDateTime::now_utc();
        let fields = &draft.fields;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        let updated = sqlx::query(
            "UPDATE news SET title = $2, slug = $3, content = $4, \
                 image_url = COALESCE($5, image_url), image_name = COALESCE($6, image_name), \
                 category_id = $7, is_published = $8, \
                 published_at = CASE WHEN $8 THEN COALESCE(published_at, $9) ELSE NULL END, \
                 updated_at = $9 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(&fields.title)
        .bind(draft.slug.as_deref().unwrap_or_default())
        .bind(&fields.content)
        .bind(draft.image.as_ref().map(|blob| blob.url.clone()))
        .bind(draft.image.as_ref().map(|blob| blob.path.clone()))
        .bind(fields.category_id)
        .bind(fields.is_published)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }

        if let Some(tags) = &fields.tags {
            Self::replace_news_tags(&mut tx, id, tags).await?;
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        self.find_news(id, LifecycleState::Active).await
    }

    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        self.mark_deleted("news", id, at).await
    }

    async fn restore(&self, id: Uuid) -> Result<Option<NewsRecord>, RepoError> {
        if !self.clear_deleted("news", id).await? {
            return Ok(None);
        }
        self.find_news(id, LifecycleState::Active).await
    }

    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<NewsRecord>, RepoError> {
        let Some(record) = self.find_news(id, LifecycleState::Trashed).await? else {
            return Ok(PurgeOutcome::Missing);
        };

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;
        sqlx::query("DELETE FROM news_tags WHERE news_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if !Self::delete_trashed(&mut tx, "news", id).await? {
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
        self.slugs_in_family("news", base, excluding).await
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
