use std::sync::Arc;
use std::time::Duration;

use crate::application::audit::AuditService;
use crate::application::auth::AuthService;
use crate::application::blobs::BlobStore;
use crate::application::cache::CacheStore;
use crate::application::lifecycle::{ResourceService, ServiceContext};
use crate::application::news::NewsDesk;
use crate::application::notify::Notifier;
use crate::application::repos::{
    AuditRepo, AuthRepo, NewsFeedRepo, ReferenceRepo, ResourceRepo,
};
use crate::application::resources::{
    Agendas, Announcements, Categories, Facilities, Galleries, News, Roles, Tags, Users,
};
use crate::config::{AuthSettings, Settings};
use crate::infra::db::PostgresRepositories;

/// Every persistence port the HTTP surface needs.
#[derive(Clone)]
pub struct Repositories {
    pub categories: Arc<dyn ResourceRepo<Categories>>,
    pub tags: Arc<dyn ResourceRepo<Tags>>,
    pub agendas: Arc<dyn ResourceRepo<Agendas>>,
    pub announcements: Arc<dyn ResourceRepo<Announcements>>,
    pub galleries: Arc<dyn ResourceRepo<Galleries>>,
    pub facilities: Arc<dyn ResourceRepo<Facilities>>,
    pub roles: Arc<dyn ResourceRepo<Roles>>,
    pub users: Arc<dyn ResourceRepo<Users>>,
    pub news: Arc<dyn ResourceRepo<News>>,
    pub feed: Arc<dyn NewsFeedRepo>,
    pub references: Arc<dyn ReferenceRepo>,
    pub auth: Arc<dyn AuthRepo>,
    pub audit: Arc<dyn AuditRepo>,
}

impl Repositories {
    pub fn postgres(db: PostgresRepositories) -> Self {
        let db = Arc::new(db);
        Self {
            categories: db.clone(),
            tags: db.clone(),
            agendas: db.clone(),
            announcements: db.clone(),
            galleries: db.clone(),
            facilities: db.clone(),
            roles: db.clone(),
            users: db.clone(),
            news: db.clone(),
            feed: db.clone(),
            references: db.clone(),
            auth: db.clone(),
            audit: db,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub cache_ttl: Duration,
    pub max_image_bytes: u64,
    pub max_request_bytes: usize,
    pub auth: AuthSettings,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cache_ttl: settings.cache.ttl,
            max_image_bytes: settings.uploads.max_image_bytes.get(),
            max_request_bytes: usize::try_from(settings.uploads.max_request_bytes.get())
                .unwrap_or(usize::MAX),
            auth: settings.auth.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub news_desk: NewsDesk,
    pub blobs: Arc<dyn BlobStore>,
    pub max_request_bytes: usize,
    pub categories: ResourceService<Categories>,
    pub tags: ResourceService<Tags>,
    pub agendas: ResourceService<Agendas>,
    pub announcements: ResourceService<Announcements>,
    pub galleries: ResourceService<Galleries>,
    pub facilities: ResourceService<Facilities>,
    pub roles: ResourceService<Roles>,
    pub users: ResourceService<Users>,
    pub news: ResourceService<News>,
}

impl AppState {
    pub fn new(
        repos: Repositories,
        cache: Arc<dyn CacheStore>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        options: AppOptions,
    ) -> Self {
        let audit = AuditService::new(repos.audit.clone());
        let ctx = ServiceContext {
            references: repos.references.clone(),
            cache,
            blobs: blobs.clone(),
            audit: audit.clone(),
            cache_ttl: options.cache_ttl,
            max_image_bytes: options.max_image_bytes,
        };

        let news = ResourceService::new(repos.news, ctx.clone());
        Self {
            auth: AuthService::new(repos.auth, notifier, audit.clone(), options.auth),
            news_desk: NewsDesk::new(news.clone(), repos.feed, audit),
            blobs,
            max_request_bytes: options.max_request_bytes,
            categories: ResourceService::new(repos.categories, ctx.clone()),
            tags: ResourceService::new(repos.tags, ctx.clone()),
            agendas: ResourceService::new(repos.agendas, ctx.clone()),
            announcements: ResourceService::new(repos.announcements, ctx.clone()),
            galleries: ResourceService::new(repos.galleries, ctx.clone()),
            facilities: ResourceService::new(repos.facilities, ctx.clone()),
            roles: ResourceService::new(repos.roles, ctx.clone()),
            users: ResourceService::new(repos.users, ctx),
            news,
        }
    }
}
