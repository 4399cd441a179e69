//! Soft-delete lifecycle as an explicit state machine.
//!
//! Rows start `Active`, move to `Trashed` on delete, back to `Active` on
//! restore, and to `Purged` on force delete. Purged rows no longer exist, so
//! every transition out of `Purged` is rejected.

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Active,
    Trashed,
    Purged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Update,
    SoftDelete,
    Restore,
    Purge,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::SoftDelete => "delete",
            Self::Restore => "restore",
            Self::Purge => "force_delete",
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("cannot {transition} a row in state {from:?}", transition = .transition.as_str())]
pub struct TransitionError {
    pub from: LifecycleState,
    pub transition: Transition,
}

impl LifecycleState {
    /// Derive the state of a stored row from its deletion timestamp.
    pub fn of(deleted_at: Option<OffsetDateTime>) -> Self {
        match deleted_at {
            Some(_) => Self::Trashed,
            None => Self::Active,
        }
    }

    pub fn apply(self, transition: Transition) -> Result<LifecycleState, TransitionError> {
        match (self, transition) {
            (Self::Active, Transition::Update) => Ok(Self::Active),
            (Self::Active, Transition::SoftDelete) => Ok(Self::Trashed),
            (Self::Trashed, Transition::Restore) => Ok(Self::Active),
            (Self::Trashed, Transition::Purge) => Ok(Self::Purged),
            (from, transition) => Err(TransitionError { from, transition }),
        }
    }
}
