//! [`Resource`](crate::application::resource::Resource) implementations for
//! the nine managed resource types.

mod agenda;
mod announcement;
mod category;
mod news;
mod role;
mod showcase;
mod tag;
mod user;

pub use agenda::{AgendaFields, AgendaPayload, Agendas};
pub use announcement::{AnnouncementFields, AnnouncementPayload, Announcements};
pub use category::{Categories, CategoryFields, CategoryPayload};
pub use news::{News, NewsFields, NewsPayload};
pub use role::{RoleFields, RolePayload, Roles};
pub use showcase::{Facilities, Galleries, ShowcaseFields, ShowcasePayload};
pub use tag::{TagFields, TagPayload, Tags};
pub use user::{UserFields, UserPayload, Users};

use uuid::Uuid;

use crate::application::repos::ReferenceKind;
use crate::application::resource::Reference;
use crate::domain::validation::FieldErrors;

/// Trim every entry and drop blanks.
fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Parse a submitted identifier; a malformed id is reported like a missing row.
fn parse_id(field: &str, raw: &str, errors: &mut FieldErrors) -> Option<Uuid> {
    match Uuid::parse_str(raw.trim()) {
        Ok(id) => Some(id),
        Err(_) => {
            errors.invalid_selection(field);
            None
        }
    }
}

/// One reference per list entry, reported as `<field>.<index>`.
fn list_references<'a, I>(field: &str, kind: ReferenceKind, values: I) -> Vec<Reference>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| Reference {
            field: format!("{field}.{index}"),
            kind,
            value: value.to_string(),
        })
        .collect()
}
