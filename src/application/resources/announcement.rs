use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::resource::Resource;
use crate::domain::entities::{AnnouncementRecord, AnnouncementSummary};
use crate::domain::types::ResourceKind;
use crate::domain::validation::FieldErrors;

pub struct Announcements;

#[derive(Debug, Default, Deserialize)]
pub struct AnnouncementPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementFields {
    pub title: String,
    pub description: String,
}

impl Resource for Announcements {
    const KIND: ResourceKind = ResourceKind::Announcement;

    type Record = AnnouncementRecord;
    type Summary = AnnouncementSummary;
    type Payload = AnnouncementPayload;
    type Fields = AnnouncementFields;

    fn validate(
        payload: AnnouncementPayload,
        _existing: Option<&AnnouncementRecord>,
    ) -> Result<AnnouncementFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = errors.required("title", payload.title);
        let description = errors.required("description", payload.description);
        match (title, description) {
            (Some(title), Some(description)) => Ok(AnnouncementFields { title, description }),
            _ => Err(errors),
        }
    }

    fn summarize(record: &AnnouncementRecord) -> AnnouncementSummary {
        AnnouncementSummary {
            id: record.id,
            title: record.title.clone(),
            slug: record.slug.clone(),
            description: record.description.clone(),
        }
    }

    fn id(record: &AnnouncementRecord) -> Uuid {
        record.id
    }

    fn deleted_at(record: &AnnouncementRecord) -> Option<OffsetDateTime> {
        record.deleted_at
    }

    fn slug_source(fields: &AnnouncementFields) -> Option<(&'static str, &str)> {
        Some(("title", fields.title.as_str()))
    }
}
