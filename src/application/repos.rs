//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::blobs::StoredBlob;
use crate::application::resource::Resource;
use crate::domain::entities::{
    AccessTokenRecord, AuditLogRecord, NewsRecord, OneTimeTokenRecord, UserCredentials,
};
use crate::domain::lifecycle::LifecycleState;
use crate::domain::permissions::AuthorizationSnapshot;
use crate::domain::types::ResourceKind;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Validated input for an insert or update, with everything derived by the
/// lifecycle service already filled in.
#[derive(Debug, Clone)]
pub struct Draft<F> {
    pub fields: F,
    pub slug: Option<String>,
    /// A newly stored image; `None` on update keeps the current one.
    pub image: Option<StoredBlob>,
    pub actor: Uuid,
}

/// Result of physically removing a trashed row.
#[derive(Debug, Clone, PartialEq)]
pub enum PurgeOutcome<T> {
    Purged(T),
    Missing,
    /// Other rows still point at this one through a restricting foreign key.
    Referenced { by: ResourceKind, count: i64 },
}

/// Storage of one resource type with soft-delete support.
#[async_trait]
pub trait ResourceRepo<R: Resource>: Send + Sync {
    async fn list(&self, state: LifecycleState) -> Result<Vec<R::Record>, RepoError>;

    /// Case-insensitive substring match over the resource's search fields, active rows only.
    async fn search(&self, term: &str) -> Result<Vec<R::Record>, RepoError>;

    async fn find(&self, id: Uuid, state: LifecycleState) -> Result<Option<R::Record>, RepoError>;

    async fn insert(&self, draft: &Draft<R::Fields>) -> Result<R::Record, RepoError>;

    async fn update(
        &self,
        id: Uuid,
        draft: &Draft<R::Fields>,
    ) -> Result<Option<R::Record>, RepoError>;

    /// Returns `false` when no active row matched.
    async fn soft_delete(&self, id: Uuid, at: OffsetDateTime) -> Result<bool, RepoError>;

    async fn restore(&self, id: Uuid) -> Result<Option<R::Record>, RepoError>;

    async fn purge(&self, id: Uuid) -> Result<PurgeOutcome<R::Record>, RepoError>;

    /// Slugs equal to `base` or of the form `base-<n>` held by rows other than
    /// `excluding`, active or trashed. Resources without slugs keep the default.
    async fn slug_family(
        &self,
        _base: &str,
        _excluding: Option<Uuid>,
    ) -> Result<Vec<String>, RepoError> {
        Ok(Vec::new())
    }

    /// Whether any row other than `excluding`, active or trashed, has `value` in `field`.
    async fn value_exists(
        &self,
        field: &'static str,
        value: &str,
        excluding: Option<Uuid>,
    ) -> Result<bool, RepoError>;
}

/// Targets of reference checks on submitted payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Active category by id.
    Category,
    /// Active tag by id.
    Tag,
    /// Active role by name.
    Role,
    /// Permission by name.
    Permission,
}

#[async_trait]
pub trait ReferenceRepo: Send + Sync {
    async fn exists(&self, kind: ReferenceKind, value: &str) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn append_log(&self, record: AuditLogRecord) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewAccessToken {
    pub user_id: Uuid,
    pub prefix: String,
    pub hashed_secret: Vec<u8>,
    pub expires_at: OffsetDateTime,
}

#[async_trait]
pub trait AuthRepo: Send + Sync {
    /// Credentials of an active user.
    async fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, RepoError>;

    async fn find_credentials(&self, user_id: Uuid) -> Result<Option<UserCredentials>, RepoError>;

    async fn authorization_snapshot(
        &self,
        user_id: Uuid,
    ) -> Result<AuthorizationSnapshot, RepoError>;

    async fn create_token(&self, token: NewAccessToken) -> Result<AccessTokenRecord, RepoError>;

    async fn find_token_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<AccessTokenRecord>, RepoError>;

    async fn touch_token(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError>;

    async fn revoke_token(&self, id: Uuid, at: OffsetDateTime) -> Result<(), RepoError>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), RepoError>;

    async fn create_password_reset(
        &self,
        user_id: Uuid,
        hashed_token: Vec<u8>,
        expires_at: OffsetDateTime,
    ) -> Result<OneTimeTokenRecord, RepoError>;

    async fn password_resets(&self, user_id: Uuid) -> Result<Vec<OneTimeTokenRecord>, RepoError>;

    /// Store the new hash, drop every reset token and revoke every access
    /// token of the user, all or nothing.
    async fn complete_password_reset(
        &self,
        user_id: Uuid,
        password_hash: &str,
        at: OffsetDateTime,
    ) -> Result<(), RepoError>;

    async fn create_email_verification(
        &self,
        user_id: Uuid,
        hashed_token: Vec<u8>,
        expires_at: OffsetDateTime,
    ) -> Result<OneTimeTokenRecord, RepoError>;

    async fn email_verifications(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OneTimeTokenRecord>, RepoError>;

    /// Set `email_verified_at` once and drop the user's verification tokens.
    async fn mark_email_verified(&self, user_id: Uuid, at: OffsetDateTime)
    -> Result<(), RepoError>;
}

/// Which owner a public news listing is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedScope<'a> {
    Author(&'a str),
    Category(&'a str),
    Tag(&'a str),
}

#[async_trait]
pub trait NewsFeedRepo: Send + Sync {
    /// Whether the author, category or tag slug names an active row.
    async fn scope_exists(&self, scope: FeedScope<'_>) -> Result<bool, RepoError>;

    /// Published, active news in `scope`, newest first.
    async fn list_published(&self, scope: FeedScope<'_>) -> Result<Vec<NewsRecord>, RepoError>;

    async fn find_published(&self, slug: &str) -> Result<Option<NewsRecord>, RepoError>;

    async fn list_drafts(&self) -> Result<Vec<NewsRecord>, RepoError>;

    /// Mark an active draft as published; `None` when no active row matched.
    async fn publish(&self, id: Uuid, at: OffsetDateTime) -> Result<Option<NewsRecord>, RepoError>;
}
