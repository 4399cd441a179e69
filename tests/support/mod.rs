//! In-memory adapters shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

use schoolboard::application::audit::AuditService;
use schoolboard::application::blobs::BlobStore;
use schoolboard::application::cache::CacheStore;
use schoolboard::application::lifecycle::ServiceContext;
use schoolboard::application::notify::Notifier;
use schoolboard::application::passwords::hash_password;
use schoolboard::application::repos::{
    AuditRepo, AuthRepo, Draft, FeedScope, NewAccessToken, NewsFeedRepo, PurgeOutcome,
    ReferenceKind, ReferenceRepo, RepoError, ResourceRepo,
};
use schoolboard::application::resource::Resource;
use schoolboard::application::resources::{Categories, Galleries, News, Roles};
use schoolboard::config::AuthSettings;
use schoolboard::domain::entities::{
    AccessTokenRecord, AuditLogRecord, CategoryRecord, CategoryRef, NewsRecord,
    OneTimeTokenRecord, RoleRecord, ShowcaseRecord, TagSummary, UserCredentials, UserRecord,
};
use schoolboard::domain::lifecycle::LifecycleState;
use schoolboard::domain::permissions::{AuthorizationSnapshot, Permission};
use schoolboard::domain::slug::in_family;
use schoolboard::domain::types::ResourceKind;
use schoolboard::infra::blobs::LocalBlobStore;
use schoolboard::infra::cache::MemoryCache;
use schoolboard::infra::http::{self, AppOptions, AppState, Repositories};

pub const MAX_IMAGE_BYTES: u64 = 64 * 1024;

/// Category storage that counts how often listings reach it.
#[derive(Default)]
pub struct MemoryCategories {
    rows: Mutex<Vec<CategoryRecord>>,
    references: Mutex<HashMap<Uuid, i64>>,
    list_calls: AtomicUsize,
}

impl MemoryCategories {
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Pretend `count` news rows point at category `id`.
    pub async fn mark_referenced(&self, id: Uuid, count: i64) {
        self.references.lock().await.insert(id, count);
    }

    pub async fn row(&self, id: Uuid) -> Option<CategoryRecord> {
        self.rows.lock().await.iter().find(|row| row.id == id).cloned()
    }
}

fn state_of(row: &CategoryRecord) -> LifecycleState {
    LifecycleState::of(row.deleted_at)
}

#[async_trait]
impl ResourceRepo<Categories> for MemoryCategories {
    async fn list(&self, state: LifecycleState) -> Result<Vec<CategoryRecord>, RepoError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.lock().await;
        Ok(rows.iter().filter(|row| state_of(row) == state).cloned().collect())
    }

    async fn search(&self, term: &str) -> Result<Vec<CategoryRecord>, RepoError> {
        let needle = term.to_lowercase();
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|row| row.deleted_at.is_none())
            .filter(|row| row.category.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn find(
        &self,
        id: Uuid,
        state: LifecycleState,
    ) -> Result<Option<CategoryRecord>, RepoError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|row| row.id == id && state_of(row) == state)
            .cloned())
    }

    async fn insert(
        &self,
        draft: &Draft<<Categories as Resource>::Fields>,
    ) -> Result<CategoryRecord, RepoError> {
        let mut rows = self.rows.lock().await;
        if rows.iter().any(|row| row.category == draft.fields.category) {
            return Err(RepoError::Duplicate {
                constraint: "categories_category_key".into(),
            });
        }
        let now = OffsetDateTime::now_utc();
        let record = CategoryRecord {
            id: Uuid::new_v4(),
            category: draft.fields.category.clone(),
            slug: draft.slug.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<<Categories as Resource>::Fields>,
    ) -> Result<Option<CategoryRecord>, RepoError> {
        let mut rows = self.rows.lock().await;
        let Some(row) = rows
            .iter_mut()
            .find(|row| row.id == id && row.deleted_at.is_none())
        else {
            return Ok(None);
        };
        row.category = draft.fields.category.clone();
        if let Some(slug) = &draft.slug {
            row.slug = slug.clone();
        }
        row.updated_at = OffsetDateTime::now_utc();
        Ok(Some(row.clone()))
    }

    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        let mut rows = self.rows.lock().await;
        match rows
            .iter_mut()
            .find(|row| row.id == id && row.deleted_at.is_none())
        {
            Some(row) => {
                row.deleted_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn restore(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError> {
        let mut rows = self.rows.lock().await;
        Ok(rows
            .iter_mut()
            .find(|row| row.id == id && row.deleted_at.is_some())
            .map(|row| {
                row.deleted_at = None;
                row.clone()
            }))
    }

    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<CategoryRecord>, RepoError> {
        if let Some(count) = self.references.lock().await.get(&id).copied() {
            return Ok(PurgeOutcome::Referenced {
                by: ResourceKind::News,
                count,
            });
        }
        let mut rows = self.rows.lock().await;
        match rows
            .iter()
            .position(|row| row.id == id && row.deleted_at.is_some())
        {
            Some(index) => Ok(PurgeOutcome::Purged(rows.remove(index))),
            None => Ok(PurgeOutcome::Missing),
        }
    }

    async fn slug_family(
        &self,
        base: &str,
        excluding: Option<Uuid>,
    ) -> Result<Vec<String>, RepoError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|row| in_family(base, &row.slug) && Some(row.id) != excluding)
            .map(|row| row.slug.clone())
            .collect())
    }

    async fn value_exists(
        &self,
        field: &'static str,
        value: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        if field != "category" {
            return Err(RepoError::InvalidInput {
                message: format!("unknown field `{field}`"),
            });
        }
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .any(|row| row.category == value && Some(row.id) != excluding))
    }
}

/// Storage for resource types a test never touches.
pub struct EmptyRepo;

#[async_trait]
impl<R: Resource> ResourceRepo<R> for EmptyRepo {
    async fn list(&self, _state: LifecycleState) -> Result<Vec<R::Record>, RepoError> {
        Ok(Vec::new())
    }

    async fn search(&self, _term: &str) -> Result<Vec<R::Record>, RepoError> {
        Ok(Vec::new())
    }

    async fn find(
        &self,
        _id: Uuid,
        _state: LifecycleState,
    ) -> Result<Option<R::Record>, RepoError> {
        Ok(None)
    }

    async fn insert(&self, _draft: &Draft<R::Fields>) -> Result<R::Record, RepoError> {
        Err(RepoError::Persistence("writes are not supported".into()))
    }

    async fn update(
        &self,
        _id: Uuid,
        _draft: &Draft<R::Fields>,
    ) -> Result<Option<R::Record>, RepoError> {
        Ok(None)
    }

    async fn soft_delete(&self, _id: Uuid, _at: OffsetDateTime) -> Result<bool, RepoError> {
        Ok(false)
    }

    async fn restore(&self, _id: Uuid) -> Result<Option<R::Record>, RepoError> {
        Ok(None)
    }

    async fn purge(&self, _id: Uuid) -> Result<PurgeOutcome<R::Record>, RepoError> {
        Ok(PurgeOutcome::Missing)
    }

    async fn value_exists(
        &self,
        _field: &'static str,
        _value: &str,
        _excluding: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        Ok(false)
    }
}

/// How a resource's record is built from a draft inside [`MemoryRows`].
pub trait MemoryRecord: Resource {
    fn build(id: Uuid, draft: &Draft<Self::Fields>, existing: Option<&Self::Record>) -> Self::Record;

    fn set_deleted_at(record: &mut Self::Record, at: Option<OffsetDateTime>);

    fn slug(_record: &Self::Record) -> Option<&str> {
        None
    }
}

/// Row storage for any [`MemoryRecord`] resource, with switches that make
/// reads or writes fail like an unreachable database.
pub struct MemoryRows<R: Resource> {
    rows: Mutex<Vec<R::Record>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl<R: Resource> Default for MemoryRows<R> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
        }
    }
}

impl<R: Resource> MemoryRows<R> {
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Inserts and updates that reached the store, failed ones included.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    fn read(&self) -> Result<(), RepoError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence(
                "connection to server at 10.0.0.5 refused".into(),
            ));
        }
        Ok(())
    }

    fn write(&self) -> Result<(), RepoError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("disk full".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: MemoryRecord> ResourceRepo<R> for MemoryRows<R> {
    async fn list(&self, state: LifecycleState) -> Result<Vec<R::Record>, RepoError> {
        self.read()?;
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|row| LifecycleState::of(R::deleted_at(row)) == state)
            .cloned()
            .collect())
    }

    async fn search(&self, _term: &str) -> Result<Vec<R::Record>, RepoError> {
        self.list(LifecycleState::Active).await
    }

    async fn find(&self, id: Uuid, state: LifecycleState) -> Result<Option<R::Record>, RepoError> {
        self.read()?;
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|row| R::id(row) == id && LifecycleState::of(R::deleted_at(row)) == state)
            .cloned())
    }

    async fn insert(&self, draft: &Draft<R::Fields>) -> Result<R::Record, RepoError> {
        self.write()?;
        let record = R::build(Uuid::new_v4(), draft, None);
        self.rows.lock().await.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<R::Fields>,
    ) -> Result<Option<R::Record>, RepoError> {
        self.write()?;
        let mut rows = self.rows.lock().await;
        let Some(row) = rows
            .iter_mut()
            .find(|row| R::id(row) == id && R::deleted_at(row).is_none())
        else {
            return Ok(None);
        };
        *row = R::build(id, draft, Some(&*row));
        Ok(Some(row.clone()))
    }

    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError> {
        let mut rows = self.rows.lock().await;
        match rows
            .iter_mut()
            .find(|row| R::id(row) == id && R::deleted_at(row).is_none())
        {
            Some(row) => {
                R::set_deleted_at(row, Some(at));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn restore(&self, id: Uuid) -> Result<Option<R::Record>, RepoError> {
        let mut rows = self.rows.lock().await;
        Ok(rows
            .iter_mut()
            .find(|row| R::id(row) == id && R::deleted_at(row).is_some())
            .map(|row| {
                R::set_deleted_at(row, None);
                row.clone()
            }))
    }

    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<R::Record>, RepoError> {
        let mut rows = self.rows.lock().await;
        match rows
            .iter()
            .position(|row| R::id(row) == id && R::deleted_at(row).is_some())
        {
            Some(index) => Ok(PurgeOutcome::Purged(rows.remove(index))),
            None => Ok(PurgeOutcome::Missing),
        }
    }

    async fn slug_family(
        &self,
        base: &str,
        excluding: Option<Uuid>,
    ) -> Result<Vec<String>, RepoError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|row| Some(R::id(row)) != excluding)
            .filter_map(|row| R::slug(row))
            .filter(|slug| in_family(base, slug))
            .map(str::to_string)
            .collect())
    }

    async fn value_exists(
        &self,
        _field: &'static str,
        _value: &str,
        _excluding: Option<Uuid>,
    ) -> Result<bool, RepoError> {
        Ok(false)
    }
}

fn stamps<T>(existing: Option<&T>, created_at: impl Fn(&T) -> OffsetDateTime) -> (OffsetDateTime, OffsetDateTime) {
    let now = OffsetDateTime::now_utc();
    (existing.map(created_at).unwrap_or(now), now)
}

impl MemoryRecord for Galleries {
    fn build(id: Uuid, draft: &Draft<Self::Fields>, existing: Option<&ShowcaseRecord>) -> ShowcaseRecord {
        let (created_at, updated_at) = stamps(existing, |row| row.created_at);
        let (image_name, image_url) = match (&draft.image, existing) {
            (Some(blob), _) => (blob.path.clone(), blob.url.clone()),
            (None, Some(row)) => (row.image_name.clone(), row.image_url.clone()),
            (None, None) => (String::new(), String::new()),
        };
        ShowcaseRecord {
            id,
            title: draft.fields.title.clone(),
            description: draft.fields.description.clone(),
            image_url,
            image_name,
            created_at,
            updated_at,
            deleted_at: None,
        }
    }

    fn set_deleted_at(record: &mut ShowcaseRecord, at: Option<OffsetDateTime>) {
        record.deleted_at = at;
    }
}

impl MemoryRecord for News {
    fn build(id: Uuid, draft: &Draft<Self::Fields>, existing: Option<&NewsRecord>) -> NewsRecord {
        let (created_at, updated_at) = stamps(existing, |row| row.created_at);
        let fields = &draft.fields;
        let tags = match (&fields.tags, existing) {
            (Some(ids), _) => ids
                .iter()
                .map(|id| TagSummary {
                    id: *id,
                    tag: id.to_string(),
                    slug: id.to_string(),
                })
                .collect(),
            (None, Some(row)) => row.tags.clone(),
            (None, None) => Vec::new(),
        };
        let image = draft
            .image
            .as_ref()
            .map(|blob| (blob.path.clone(), blob.url.clone()))
            .or_else(|| existing.and_then(|row| row.image_name.clone().zip(row.image_url.clone())));
        NewsRecord {
            id,
            title: fields.title.clone(),
            slug: draft.slug.clone().unwrap_or_default(),
            content: fields.content.clone(),
            image_url: image.as_ref().map(|(_, url)| url.clone()),
            image_name: image.map(|(path, _)| path),
            author: None,
            category: CategoryRef {
                id: fields.category_id,
                category: fields.category_id.to_string(),
                slug: fields.category_id.to_string(),
            },
            tags,
            is_published: fields.is_published,
            published_at: fields.is_published.then_some(updated_at),
            created_at,
            updated_at,
            deleted_at: None,
        }
    }

    fn set_deleted_at(record: &mut NewsRecord, at: Option<OffsetDateTime>) {
        record.deleted_at = at;
    }

    fn slug(record: &NewsRecord) -> Option<&str> {
        Some(record.slug.as_str())
    }
}

impl MemoryRecord for Roles {
    fn build(id: Uuid, draft: &Draft<Self::Fields>, existing: Option<&RoleRecord>) -> RoleRecord {
        let (created_at, updated_at) = stamps(existing, |row| row.created_at);
        let permissions = match (&draft.fields.permissions, existing) {
            (Some(permissions), _) => permissions.clone(),
            (None, Some(row)) => row.permissions.clone(),
            (None, None) => Vec::new(),
        };
        RoleRecord {
            id,
            name: draft.fields.name.clone(),
            permissions,
            created_at,
            updated_at,
            deleted_at: None,
        }
    }

    fn set_deleted_at(record: &mut RoleRecord, at: Option<OffsetDateTime>) {
        record.deleted_at = at;
    }
}

#[derive(Default)]
pub struct MemoryReferences {
    known: Mutex<Vec<(ReferenceKind, String)>>,
}

impl MemoryReferences {
    pub async fn add(&self, kind: ReferenceKind, value: impl Into<String>) {
        self.known.lock().await.push((kind, value.into()));
    }
}

#[async_trait]
impl ReferenceRepo for MemoryReferences {
    async fn exists(&self, kind: ReferenceKind, value: &str) -> Result<bool, RepoError> {
        let known = self.known.lock().await;
        Ok(known
            .iter()
            .any(|(known_kind, known_value)| *known_kind == kind && known_value == value))
    }
}

#[derive(Default)]
pub struct RecordingAudit {
    entries: Mutex<Vec<AuditLogRecord>>,
}

impl RecordingAudit {
    pub async fn actions(&self) -> Vec<String> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|entry| entry.action.clone())
            .collect()
    }
}

#[async_trait]
impl AuditRepo for RecordingAudit {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError> {
        self.entries.lock().await.push(record);
        Ok(())
    }
}

struct StoredUser {
    credentials: UserCredentials,
    snapshot: AuthorizationSnapshot,
}

#[derive(Default)]
pub struct MemoryAuth {
    users: Mutex<Vec<StoredUser>>,
    tokens: Mutex<Vec<AccessTokenRecord>>,
    resets: Mutex<Vec<OneTimeTokenRecord>>,
    verifications: Mutex<Vec<OneTimeTokenRecord>>,
    fail_token_lookups: AtomicBool,
    reset_completions: AtomicUsize,
}

impl MemoryAuth {
    /// Register an active, verified user holding `permissions` as direct grants.
    pub async fn add_user(&self, email: &str, password: &str, permissions: Vec<Permission>) -> Uuid {
        self.insert_user(email, password, permissions, Some(OffsetDateTime::now_utc()))
            .await
    }

    /// Register a user who has not confirmed their email address yet.
    pub async fn add_unverified_user(
        &self,
        email: &str,
        password: &str,
        permissions: Vec<Permission>,
    ) -> Uuid {
        self.insert_user(email, password, permissions, None).await
    }

    async fn insert_user(
        &self,
        email: &str,
        password: &str,
        permissions: Vec<Permission>,
        email_verified_at: Option<OffsetDateTime>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let password_hash = hash_password(password).expect("hash password");
        self.users.lock().await.push(StoredUser {
            credentials: UserCredentials {
                id,
                name: email.split('@').next().unwrap_or(email).to_string(),
                email: email.to_string(),
                password_hash,
                email_verified_at,
            },
            snapshot: AuthorizationSnapshot {
                direct: permissions,
                roles: Vec::new(),
            },
        });
        id
    }

    /// Make every token lookup fail as if the database were down.
    pub fn fail_token_lookups(&self) {
        self.fail_token_lookups.store(true, Ordering::SeqCst);
    }

    /// How many password resets were committed through the single atomic call.
    pub fn reset_completions(&self) -> usize {
        self.reset_completions.load(Ordering::SeqCst)
    }

    pub async fn is_verified(&self, user_id: Uuid) -> bool {
        self.users
            .lock()
            .await
            .iter()
            .any(|user| user.credentials.id == user_id && user.credentials.email_verified_at.is_some())
    }

    pub async fn verification_count(&self, user_id: Uuid) -> usize {
        self.verifications
            .lock()
            .await
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .count()
    }

    pub async fn token_count(&self, user_id: Uuid) -> usize {
        self.tokens
            .lock()
            .await
            .iter()
            .filter(|token| token.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl AuthRepo for MemoryAuth {
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, RepoError> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|user| user.credentials.email.eq_ignore_ascii_case(email))
            .map(|user| user.credentials.clone()))
    }

    async fn find_credentials(&self, user_id: Uuid) -> Result<Option<UserCredentials>, RepoError> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|user| user.credentials.id == user_id)
            .map(|user| user.credentials.clone()))
    }

    async fn authorization_snapshot(
        &self,
        user_id: Uuid,
    ) -> Result<AuthorizationSnapshot, RepoError> {
        let users = self.users.lock().await;
        Ok(users
            .iter()
            .find(|user| user.credentials.id == user_id)
            .map(|user| user.snapshot.clone())
            .unwrap_or_default())
    }

    async fn create_token(&self, token: NewAccessToken) -> Result<AccessTokenRecord, RepoError> {
        let record = AccessTokenRecord {
            id: Uuid::new_v4(),
            user_id: token.user_id,
            prefix: token.prefix,
            hashed_secret: token.hashed_secret,
            expires_at: token.expires_at,
            revoked_at: None,
            last_used_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        self.tokens.lock().await.push(record.clone());
        Ok(record)
    }

    async fn find_token_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<AccessTokenRecord>, RepoError> {
        if self.fail_token_lookups.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence(
                "pool timed out while waiting for an open connection".into(),
            ));
        }
        let tokens = self.tokens.lock().await;
        Ok(tokens.iter().find(|token| token.prefix == prefix).cloned())
    }

    async fn touch_token(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.iter_mut().find(|token| token.id == id) {
            token.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn revoke_token(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.iter_mut().find(|token| token.id == id) {
            token.revoked_at = Some(at);
        }
        Ok(())
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), RepoError> {
        let mut users = self.users.lock().await;
        let user = users
            .iter_mut()
            .find(|user| user.credentials.id == user_id)
            .ok_or(RepoError::NotFound)?;
        user.credentials.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn create_password_reset(
        &self,
        user_id: Uuid,
        hashed_token: Vec<u8>,
        expires_at: OffsetDateTime,
    ) -> Result<OneTimeTokenRecord, RepoError> {
        let record = OneTimeTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            hashed_token,
            expires_at,
            created_at: OffsetDateTime::now_utc(),
        };
        self.resets.lock().await.push(record.clone());
        Ok(record)
    }

    async fn password_resets(&self, user_id: Uuid) -> Result<Vec<OneTimeTokenRecord>, RepoError> {
        let resets = self.resets.lock().await;
        Ok(resets
            .iter()
            .filter(|reset| reset.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        password_hash: &str,
        at: OffsetDateTime,
    ) -> Result<(), RepoError> {
        let mut users = self.users.lock().await;
        let mut resets = self.resets.lock().await;
        let mut tokens = self.tokens.lock().await;
        let user = users
            .iter_mut()
            .find(|user| user.credentials.id == user_id)
            .ok_or(RepoError::NotFound)?;
        user.credentials.password_hash = password_hash.to_string();
        resets.retain(|reset| reset.user_id != user_id);
        for token in tokens.iter_mut().filter(|token| token.user_id == user_id) {
            token.revoked_at.get_or_insert(at);
        }
        self.reset_completions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn create_email_verification(
        &self,
        user_id: Uuid,
        hashed_token: Vec<u8>,
        expires_at: OffsetDateTime,
    ) -> Result<OneTimeTokenRecord, RepoError> {
        let record = OneTimeTokenRecord {
            id: Uuid::new_v4(),
            user_id,
            hashed_token,
            expires_at,
            created_at: OffsetDateTime::now_utc(),
        };
        self.verifications.lock().await.push(record.clone());
        Ok(record)
    }

    async fn email_verifications(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OneTimeTokenRecord>, RepoError> {
        let verifications = self.verifications.lock().await;
        Ok(verifications
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn mark_email_verified(&self, user_id: Uuid, at: OffsetDateTime) -> Result<(), RepoError> {
        let mut users = self.users.lock().await;
        let user = users
            .iter_mut()
            .find(|user| user.credentials.id == user_id)
            .ok_or(RepoError::NotFound)?;
        user.credentials.email_verified_at.get_or_insert(at);
        self.verifications
            .lock()
            .await
            .retain(|entry| entry.user_id != user_id);
        Ok(())
    }
}

/// A feed with no authors, categories, tags or articles.
pub struct EmptyFeed;

#[async_trait]
impl NewsFeedRepo for EmptyFeed {
    async fn scope_exists(&self, _scope: FeedScope<'_>) -> Result<bool, RepoError> {
        Ok(false)
    }

    async fn list_published(&self, _scope: FeedScope<'_>) -> Result<Vec<NewsRecord>, RepoError> {
        Ok(Vec::new())
    }

    async fn find_published(&self, _slug: &str) -> Result<Option<NewsRecord>, RepoError> {
        Ok(None)
    }

    async fn list_drafts(&self) -> Result<Vec<NewsRecord>, RepoError> {
        Ok(Vec::new())
    }

    async fn publish(
        &self,
        _id: Uuid,
        _at: OffsetDateTime,
    ) -> Result<Option<NewsRecord>, RepoError> {
        Ok(None)
    }
}

/// Collects reset tokens and verification links instead of mailing them.
#[derive(Default)]
pub struct OutboxNotifier {
    pub reset_tokens: Mutex<Vec<(String, String)>>,
    pub registrations: Mutex<Vec<String>>,
    /// `(email, link)` pairs from registrations and resends.
    pub verify_links: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn user_registered(&self, user: &UserRecord, verify_link: &str) {
        self.registrations.lock().await.push(user.email.clone());
        self.verify_links
            .lock()
            .await
            .push((user.email.clone(), verify_link.to_string()));
    }

    async fn verification_requested(&self, email: &str, _name: &str, verify_link: &str) {
        self.verify_links
            .lock()
            .await
            .push((email.to_string(), verify_link.to_string()));
    }

    async fn password_reset_requested(&self, email: &str, _name: &str, token: &str) {
        self.reset_tokens
            .lock()
            .await
            .push((email.to_string(), token.to_string()));
    }
}

pub fn auth_settings() -> AuthSettings {
    AuthSettings {
        token_ttl: time::Duration::minutes(60),
        remember_ttl: time::Duration::days(7),
        password_reset_ttl: time::Duration::minutes(60),
        email_verification_ttl: time::Duration::minutes(60),
    }
}

pub fn blob_store(dir: &TempDir) -> LocalBlobStore {
    LocalBlobStore::new(
        dir.path().to_path_buf(),
        Url::parse("http://localhost/uploads/").expect("base url"),
    )
    .expect("blob store")
}

/// Collaborators for a service under test, exposing the concrete doubles.
pub struct Harness {
    pub categories: Arc<MemoryCategories>,
    pub galleries: Arc<MemoryRows<Galleries>>,
    pub news: Arc<MemoryRows<News>>,
    pub roles: Arc<MemoryRows<Roles>>,
    pub references: Arc<MemoryReferences>,
    pub audit: Arc<RecordingAudit>,
    pub cache: MemoryCache,
    pub blobs: Arc<LocalBlobStore>,
    pub uploads: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let uploads = tempfile::tempdir().expect("tempdir");
        Self {
            categories: Arc::new(MemoryCategories::default()),
            galleries: Arc::new(MemoryRows::default()),
            news: Arc::new(MemoryRows::default()),
            roles: Arc::new(MemoryRows::default()),
            references: Arc::new(MemoryReferences::default()),
            audit: Arc::new(RecordingAudit::default()),
            cache: MemoryCache::new(),
            blobs: Arc::new(blob_store(&uploads)),
            uploads,
        }
    }

    pub fn context(&self) -> ServiceContext {
        ServiceContext {
            references: self.references.clone(),
            cache: Arc::new(self.cache.clone()),
            blobs: self.blobs.clone(),
            audit: AuditService::new(self.audit.clone()),
            cache_ttl: Duration::from_secs(60),
            max_image_bytes: MAX_IMAGE_BYTES,
        }
    }
}

/// The full router over in-memory storage.
pub struct TestApp {
    pub router: Router,
    pub harness: Harness,
    pub auth: Arc<MemoryAuth>,
    pub notifier: Arc<OutboxNotifier>,
}

impl TestApp {
    pub fn new() -> Self {
        let harness = Harness::new();
        let auth = Arc::new(MemoryAuth::default());
        let notifier = Arc::new(OutboxNotifier::default());

        let empty = Arc::new(EmptyRepo);
        let repos = Repositories {
            categories: harness.categories.clone(),
            tags: empty.clone(),
            agendas: empty.clone(),
            announcements: empty.clone(),
            galleries: harness.galleries.clone(),
            facilities: empty.clone(),
            roles: harness.roles.clone(),
            users: empty,
            news: harness.news.clone(),
            feed: Arc::new(EmptyFeed),
            references: harness.references.clone(),
            auth: auth.clone(),
            audit: harness.audit.clone(),
        };

        let cache: Arc<dyn CacheStore> = Arc::new(harness.cache.clone());
        let blobs: Arc<dyn BlobStore> = harness.blobs.clone();
        let state = AppState::new(
            repos,
            cache,
            blobs,
            notifier.clone(),
            AppOptions {
                cache_ttl: Duration::from_secs(60),
                max_image_bytes: MAX_IMAGE_BYTES,
                max_request_bytes: 1024 * 1024,
                auth: auth_settings(),
            },
        );

        Self {
            router: http::build_router(state),
            harness,
            auth,
            notifier,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (u16, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        read_json(response).await
    }

    /// Log in through the API and return the bearer token.
    pub async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .send(json_request(
                "POST",
                "/auth/login",
                None,
                serde_json::json!({ "email": email, "password": password }),
            ))
            .await;
        assert_eq!(status, 200, "login failed: {body}");
        body["data"]["token"]
            .as_str()
            .expect("token in login response")
            .to_string()
    }
}

pub async fn read_json(response: Response<Body>) -> (u16, Value) {
    let status = response.status().as_u16();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, body)
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn bare_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}
