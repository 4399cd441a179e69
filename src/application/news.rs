//! Drafts, publishing and the public news feeds.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::audit::{Actor, AuditService};
use crate::application::blobs::ImageUpload;
use crate::application::error::AppError;
use crate::application::lifecycle::ResourceService;
use crate::application::repos::{FeedScope, NewsFeedRepo};
use crate::application::resource::Resource;
use crate::application::resources::{News, NewsPayload};
use crate::domain::entities::{NewsRecord, NewsSummary, PublicNewsEntry};
use crate::domain::types::ListView;

#[derive(Clone)]
pub struct NewsDesk {
    news: ResourceService<News>,
    feed: Arc<dyn NewsFeedRepo>,
    audit: AuditService,
}

impl NewsDesk {
    pub fn new(
        news: ResourceService<News>,
        feed: Arc<dyn NewsFeedRepo>,
        audit: AuditService,
    ) -> Self {
        Self { news, feed, audit }
    }

    /// Create an article that stays off the public feeds until published.
    pub async fn draft(
        &self,
        actor: &Actor,
        mut payload: NewsPayload,
        image: Option<ImageUpload>,
    ) -> Result<NewsRecord, AppError> {
        payload.is_published = Some(false);
        self.news.create(actor, payload, image).await
    }

    /// Active unpublished articles, never cached.
    pub async fn drafts(&self) -> Result<Vec<NewsSummary>, AppError> {
        let records = self.feed.list_drafts().await?;
        Ok(records.iter().map(News::summarize).collect())
    }

    pub async fn publish(&self, actor: &Actor, id: Uuid) -> Result<NewsRecord, AppError> {
        let record = self
            .feed
            .publish(id, OffsetDateTime::now_utc())
            .await?
            .ok_or_else(|| AppError::not_found("News"))?;

        self.news.invalidate(&[ListView::Index]).await?;
        self.audit
            .record(
                &actor.label,
                "news.publish",
                "news",
                Some(&record.id.to_string()),
                Some(&News::summarize(&record)),
            )
            .await;
        Ok(record)
    }

    pub async fn by_author(&self, slug: &str) -> Result<Vec<PublicNewsEntry>, AppError> {
        self.scoped(FeedScope::Author(slug), "Author").await
    }

    pub async fn by_category(&self, slug: &str) -> Result<Vec<PublicNewsEntry>, AppError> {
        self.scoped(FeedScope::Category(slug), "Category").await
    }

    pub async fn by_tag(&self, slug: &str) -> Result<Vec<PublicNewsEntry>, AppError> {
        self.scoped(FeedScope::Tag(slug), "Tag").await
    }

    pub async fn by_slug(&self, slug: &str) -> Result<PublicNewsEntry, AppError> {
        self.feed
            .find_published(slug)
            .await?
            .map(PublicNewsEntry::from)
            .ok_or_else(|| AppError::not_found("News"))
    }

    async fn scoped(
        &self,
        scope: FeedScope<'_>,
        entity: &'static str,
    ) -> Result<Vec<PublicNewsEntry>, AppError> {
        if !self.feed.scope_exists(scope).await? {
            return Err(AppError::not_found(entity));
        }
        let records = self.feed.list_published(scope).await?;
        Ok(records.into_iter().map(PublicNewsEntry::from).collect())
    }
}
