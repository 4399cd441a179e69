use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::resource::{Resource, UniqueValue};
use crate::domain::entities::{CategoryRecord, CategorySummary};
use crate::domain::types::ResourceKind;
use crate::domain::validation::FieldErrors;

const CATEGORY: &str = "category";

pub struct Categories;

#[derive(Debug, Default, Deserialize)]
pub struct CategoryPayload {
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFields {
    pub category: String,
}

impl Resource for Categories {
    const KIND: ResourceKind = ResourceKind::Category;
    const DEPENDENTS: &'static [ResourceKind] = &[ResourceKind::News];

    type Record = CategoryRecord;
    type Summary = CategorySummary;
    type Payload = CategoryPayload;
    type Fields = CategoryFields;

    fn validate(
        payload: CategoryPayload,
        _existing: Option<&CategoryRecord>,
    ) -> Result<CategoryFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        match errors.required(CATEGORY, payload.category) {
            Some(category) => Ok(CategoryFields { category }),
            None => Err(errors),
        }
    }

    fn summarize(record: &CategoryRecord) -> CategorySummary {
        CategorySummary {
            id: record.id,
            category: record.category.clone(),
            slug: record.slug.clone(),
        }
    }

    fn id(record: &CategoryRecord) -> Uuid {
        record.id
    }

    fn deleted_at(record: &CategoryRecord) -> Option<OffsetDateTime> {
        record.deleted_at
    }

    fn unique_values(fields: &CategoryFields) -> Vec<UniqueValue> {
        vec![UniqueValue {
            field: CATEGORY,
            value: fields.category.clone(),
        }]
    }

    fn current_value<'a>(record: &'a CategoryRecord, field: &str) -> Option<&'a str> {
        (field == CATEGORY).then_some(record.category.as_str())
    }

    fn slug_source(fields: &CategoryFields) -> Option<(&'static str, &str)> {
        Some((CATEGORY, fields.category.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_is_required_and_trimmed() {
        let errors = Categories::validate(CategoryPayload::default(), None).unwrap_err();
        assert_eq!(
            errors.get("category"),
            Some(&["The category field is required.".to_string()][..])
        );

        let fields = Categories::validate(
            CategoryPayload {
                category: Some("  Sports ".into()),
            },
            None,
        )
        .expect("valid");
        assert_eq!(fields.category, "Sports");
    }
}
