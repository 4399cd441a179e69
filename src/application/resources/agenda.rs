use serde::Deserialize;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::application::resource::Resource;
use crate::domain::entities::{AgendaRecord, AgendaSummary};
use crate::domain::types::ResourceKind;
use crate::domain::validation::{FieldErrors, parse_date};

pub struct Agendas;

#[derive(Debug, Default, Deserialize)]
pub struct AgendaPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgendaFields {
    pub title: String,
    pub description: String,
    pub date: Date,
}

impl Resource for Agendas {
    const KIND: ResourceKind = ResourceKind::Agenda;

    type Record = AgendaRecord;
    type Summary = AgendaSummary;
    type Payload = AgendaPayload;
    type Fields = AgendaFields;

    fn validate(
        payload: AgendaPayload,
        _existing: Option<&AgendaRecord>,
    ) -> Result<AgendaFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = errors.required("title", payload.title);
        let description = errors.required("description", payload.description);
        let date = errors
            .required("date", payload.date)
            .and_then(|raw| parse_date("date", &raw, &mut errors));

        match (title, description, date) {
            (Some(title), Some(description), Some(date)) if errors.is_empty() => Ok(AgendaFields {
                title,
                description,
                date,
            }),
            _ => Err(errors),
        }
    }

    fn summarize(record: &AgendaRecord) -> AgendaSummary {
        AgendaSummary {
            id: record.id,
            title: record.title.clone(),
            slug: record.slug.clone(),
            date: record.date,
        }
    }

    fn id(record: &AgendaRecord) -> Uuid {
        record.id
    }

    fn deleted_at(record: &AgendaRecord) -> Option<OffsetDateTime> {
        record.deleted_at
    }

    fn slug_source(fields: &AgendaFields) -> Option<(&'static str, &str)> {
        Some(("title", fields.title.as_str()))
    }
}
