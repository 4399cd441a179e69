//! The per-resource contract plugged into the lifecycle service.
//!
//! A [`Resource`] describes one resource type: its records, its listing
//! projection, how a submitted payload is validated, which fields must be
//! unique, where the slug comes from, which other rows the payload points at
//! and whether it carries an image. Everything else (caching, soft delete,
//! restore, purge, slug uniqueness, rollback of stored images) lives once in
//! [`crate::application::lifecycle::ResourceService`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::ReferenceKind;
use crate::domain::types::ResourceKind;
use crate::domain::validation::FieldErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRule {
    None,
    Optional,
    RequiredOnCreate,
}

/// A value that must not already exist in `field` for another row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueValue {
    pub field: &'static str,
    pub value: String,
}

/// A payload entry that must name an existing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Field path reported on failure, e.g. `tags.0`.
    pub field: String,
    pub kind: ReferenceKind,
    pub value: String,
}

pub trait Resource: Send + Sync + Sized + 'static {
    const KIND: ResourceKind;
    const IMAGE: ImageRule = ImageRule::None;
    /// Other resource types whose listings embed data from this one.
    const DEPENDENTS: &'static [ResourceKind] = &[];

    type Record: Serialize + Clone + Send + Sync + 'static;
    type Summary: Serialize + DeserializeOwned + Send + Sync + 'static;
    type Payload: DeserializeOwned + Send + 'static;
    type Fields: Clone + Send + Sync + 'static;

    /// Check required fields and formats. `existing` is `None` on create.
    fn validate(
        payload: Self::Payload,
        existing: Option<&Self::Record>,
    ) -> Result<Self::Fields, FieldErrors>;

    fn summarize(record: &Self::Record) -> Self::Summary;

    fn id(record: &Self::Record) -> Uuid;

    fn deleted_at(record: &Self::Record) -> Option<OffsetDateTime>;

    fn unique_values(_fields: &Self::Fields) -> Vec<UniqueValue> {
        Vec::new()
    }

    /// Current stored value of a unique field, compared before checking the store.
    fn current_value<'a>(_record: &'a Self::Record, _field: &str) -> Option<&'a str> {
        None
    }

    /// Field name and text the slug is derived from.
    fn slug_source(_fields: &Self::Fields) -> Option<(&'static str, &str)> {
        None
    }

    fn references(_fields: &Self::Fields) -> Vec<Reference> {
        Vec::new()
    }

    /// Blob path of the stored image, if any.
    fn image_path(_record: &Self::Record) -> Option<&str> {
        None
    }

    /// Whether [`Resource::finalize`] has work to do for `fields`.
    fn needs_finalize(_fields: &Self::Fields) -> bool {
        false
    }

    /// CPU-heavy last step before a write, such as password hashing. Runs on
    /// the blocking pool once every other check has passed.
    fn finalize(fields: Self::Fields) -> Result<Self::Fields, FieldErrors> {
        Ok(fields)
    }
}
