//! Listing cache abstraction.
//!
//! Listings are cached as JSON strings under `<plural>.index` and
//! `<plural>.trashed`. Entries are dropped, never patched, when a mutation
//! makes them stale.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::types::{ListView, ResourceKind};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache command failed: {0}")]
    Command(String),
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Drop several keys in one round trip. No atomicity is implied.
    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError>;
}

pub fn cache_key(kind: ResourceKind, view: ListView) -> String {
    format!("{}.{}", kind.plural(), view.as_str())
}
