use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::application::repos::{AuditRepo, RepoError};
use crate::domain::entities::AuditLogRecord;

/// Who performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub label: String,
}

impl Actor {
    pub fn new(user_id: Uuid, label: impl Into<String>) -> Self {
        Self {
            user_id,
            label: label.into(),
        }
    }
}

/// Append-only activity trail. Failures are logged and swallowed so a broken
/// audit table never fails the mutation it describes.
#[derive(Clone)]
pub struct AuditService {
    repo: Arc<dyn AuditRepo>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepo>) -> Self {
        Self { repo }
    }

    pub async fn record<S>(
        &self,
        actor: &str,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
        payload: Option<&S>,
    ) where
        S: Serialize,
    {
        if let Err(err) = self
            .try_record(actor, action, entity_type, entity_id, payload)
            .await
        {
            warn!(
                target = "schoolboard::audit",
                action = action,
                entity_type = entity_type,
                entity_id = entity_id.unwrap_or(""),
                error = %err,
                "failed to append audit log"
            );
        }
    }

    async fn try_record<S>(
        &self,
        actor: &str,
        action: &str,
        entity_type: &str,
        entity_id: Option<&str>,
        payload: Option<&S>,
    ) -> Result<(), RepoError>
    where
        S: Serialize,
    {
        let payload_text = match payload {
            Some(value) => Some(serde_json::to_string(value).map_err(RepoError::from_persistence)?),
            None => None,
        };

        let record = AuditLogRecord {
            id: Uuid::new_v4(),
            actor: actor.to_string(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(|value| value.to_string()),
            payload_text,
            created_at: OffsetDateTime::now_utc(),
        };

        self.repo.append_log(record).await
    }
}
