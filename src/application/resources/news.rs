use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{clean_list, list_references, parse_id};
use crate::application::repos::ReferenceKind;
use crate::application::resource::{ImageRule, Reference, Resource};
use crate::domain::entities::{NewsRecord, NewsSummary};
use crate::domain::types::ResourceKind;
use crate::domain::validation::{FieldErrors, flexible_bool};

const CATEGORY_ID: &str = "category_id";

pub struct News;

#[derive(Debug, Default, Deserialize)]
pub struct NewsPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_published: Option<bool>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsFields {
    pub title: String,
    pub content: String,
    pub category_id: Uuid,
    pub is_published: bool,
    /// `None` keeps the current tags on update.
    pub tags: Option<Vec<Uuid>>,
}

impl Resource for News {
    const KIND: ResourceKind = ResourceKind::News;
    const IMAGE: ImageRule = ImageRule::Optional;

    type Record = NewsRecord;
    type Summary = NewsSummary;
    type Payload = NewsPayload;
    type Fields = NewsFields;

    fn validate(payload: NewsPayload, existing: Option<&NewsRecord>) -> Result<NewsFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = errors.required("title", payload.title);
        let content = errors.required("content", payload.content);
        let category_id = errors
            .required(CATEGORY_ID, payload.category_id)
            .and_then(|raw| parse_id(CATEGORY_ID, &raw, &mut errors));

        let tags = payload.tags.map(|values| {
            clean_list(values)
                .iter()
                .enumerate()
                .filter_map(|(index, raw)| parse_id(&format!("tags.{index}"), raw, &mut errors))
                .collect::<Vec<_>>()
        });

        let is_published = payload
            .is_published
            .or(existing.map(|record| record.is_published))
            .unwrap_or(false);

        match (title, content, category_id) {
            (Some(title), Some(content), Some(category_id)) if errors.is_empty() => Ok(NewsFields {
                title,
                content,
                category_id,
                is_published,
                tags,
            }),
            _ => Err(errors),
        }
    }

    fn summarize(record: &NewsRecord) -> NewsSummary {
        NewsSummary {
            id: record.id,
            title: record.title.clone(),
            slug: record.slug.clone(),
            image_url: record.image_url.clone(),
            category: record.category.category.clone(),
            author: record.author.as_ref().map(|author| author.name.clone()),
            tags: record.tags.clone(),
            is_published: record.is_published,
            published_at: record.published_at,
        }
    }

    fn id(record: &NewsRecord) -> Uuid {
        record.id
    }

    fn deleted_at(record: &NewsRecord) -> Option<OffsetDateTime> {
        record.deleted_at
    }

    fn slug_source(fields: &NewsFields) -> Option<(&'static str, &str)> {
        Some(("title", fields.title.as_str()))
    }

    fn references(fields: &NewsFields) -> Vec<Reference> {
        let mut references = vec![Reference {
            field: CATEGORY_ID.to_string(),
            kind: ReferenceKind::Category,
            value: fields.category_id.to_string(),
        }];
        if let Some(tags) = &fields.tags {
            let ids: Vec<String> = tags.iter().map(Uuid::to_string).collect();
            references.extend(list_references(
                "tags",
                ReferenceKind::Tag,
                ids.iter().map(String::as_str),
            ));
        }
        references
    }

    fn image_path(record: &NewsRecord) -> Option<&str> {
        record.image_name.as_deref()
    }
}
