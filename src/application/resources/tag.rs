use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::resource::{Resource, UniqueValue};
use crate::domain::entities::{TagRecord, TagSummary};
use crate::domain::types::ResourceKind;
use crate::domain::validation::FieldErrors;

const TAG: &str = "tag";

pub struct Tags;

#[derive(Debug, Default, Deserialize)]
pub struct TagPayload {
    #[serde(default)]
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFields {
    pub tag: String,
}

impl Resource for Tags {
    const KIND: ResourceKind = ResourceKind::Tag;
    const DEPENDENTS: &'static [ResourceKind] = &[ResourceKind::News];

    type Record = TagRecord;
    type Summary = TagSummary;
    type Payload = TagPayload;
    type Fields = TagFields;

    fn validate(payload: TagPayload, _existing: Option<&TagRecord>) -> Result<TagFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        match errors.required(TAG, payload.tag) {
            Some(tag) => Ok(TagFields { tag }),
            None => Err(errors),
        }
    }

    fn summarize(record: &TagRecord) -> TagSummary {
        TagSummary {
            id: record.id,
            tag: record.tag.clone(),
            slug: record.slug.clone(),
        }
    }

    fn id(record: &TagRecord) -> Uuid {
        record.id
    }

    fn deleted_at(record: &TagRecord) -> Option<OffsetDateTime> {
        record.deleted_at
    }

    fn unique_values(fields: &TagFields) -> Vec<UniqueValue> {
        vec![UniqueValue {
            field: TAG,
            value: fields.tag.clone(),
        }]
    }

    fn current_value<'a>(record: &'a TagRecord, field: &str) -> Option<&'a str> {
        (field == TAG).then_some(record.tag.as_str())
    }

    fn slug_source(fields: &TagFields) -> Option<(&'static str, &str)> {
        Some((TAG, fields.tag.as_str()))
    }
}
