//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod lifecycle;
pub mod permissions;
pub mod slug;
pub mod types;
pub mod validation;
