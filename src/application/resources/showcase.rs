//! Galleries and facilities: a title, a description and a required image.

use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::resource::{ImageRule, Resource};
use crate::domain::entities::{ShowcaseRecord, ShowcaseSummary};
use crate::domain::types::ResourceKind;
use crate::domain::validation::FieldErrors;

pub struct Galleries;

pub struct Facilities;

#[derive(Debug, Default, Deserialize)]
pub struct ShowcasePayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowcaseFields {
    pub title: String,
    pub description: String,
}

fn validate(payload: ShowcasePayload) -> Result<ShowcaseFields, FieldErrors> {
    let mut errors = FieldErrors::new();
    let title = errors.required("title", payload.title);
    let description = errors.required("description", payload.description);
    match (title, description) {
        (Some(title), Some(description)) => Ok(ShowcaseFields { title, description }),
        _ => Err(errors),
    }
}

fn summarize(record: &ShowcaseRecord) -> ShowcaseSummary {
    ShowcaseSummary {
        id: record.id,
        title: record.title.clone(),
        description: record.description.clone(),
        image_url: record.image_url.clone(),
    }
}

macro_rules! showcase_resource {
    ($name:ident, $kind:expr) => {
        impl Resource for $name {
            const KIND: ResourceKind = $kind;
            const IMAGE: ImageRule = ImageRule::RequiredOnCreate;

            type Record = ShowcaseRecord;
            type Summary = ShowcaseSummary;
            type Payload = ShowcasePayload;
            type Fields = ShowcaseFields;

            fn validate(
                payload: ShowcasePayload,
                _existing: Option<&ShowcaseRecord>,
            ) -> Result<ShowcaseFields, FieldErrors> {
                validate(payload)
            }

            fn summarize(record: &ShowcaseRecord) -> ShowcaseSummary {
                summarize(record)
            }

            fn id(record: &ShowcaseRecord) -> Uuid {
                record.id
            }

            fn deleted_at(record: &ShowcaseRecord) -> Option<OffsetDateTime> {
                record.deleted_at
            }

            fn image_path(record: &ShowcaseRecord) -> Option<&str> {
                Some(record.image_name.as_str())
            }
        }
    };
}

showcase_resource!(Galleries, ResourceKind::Gallery);
showcase_resource!(Facilities, ResourceKind::Facility);
