//! Field-level validation messages returned with 422 responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use time::Date;
use time::macros::format_description;

/// Messages keyed by the offending field, e.g. `{"category": ["The category field is required."]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn merge(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// `Ok(value)` when nothing was recorded, the collected errors otherwise.
    pub fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }

    /// Require a non-blank string field and return it trimmed.
    pub fn required(&mut self, field: &str, value: Option<String>) -> Option<String> {
        match value.map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => Some(v),
            _ => {
                self.add(field, required_message(field));
                None
            }
        }
    }

    pub fn taken(&mut self, field: &str) {
        self.add(field, format!("The {} has already been taken.", humanize(field)));
    }

    pub fn invalid_selection(&mut self, field: &str) {
        self.add(field, format!("The selected {field} is invalid."));
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "invalid fields: {}", fields.join(", "))
    }
}

pub fn required_message(field: &str) -> String {
    format!("The {} field is required.", humanize(field))
}

fn humanize(field: &str) -> String {
    field.replace('_', " ")
}

/// Accept a date in `YYYY-MM-DD` form.
pub fn parse_date(field: &str, raw: &str, errors: &mut FieldErrors) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    match Date::parse(raw.trim(), &format) {
        Ok(date) => Some(date),
        Err(_) => {
            errors.add(field, format!("The {} field must be a valid date.", humanize(field)));
            None
        }
    }
}

pub fn format_date(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format).unwrap_or_default()
}

/// Minimal shape check: one `@`, non-empty local part, a dotted domain.
pub fn is_valid_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn check_password(field: &str, password: &str, errors: &mut FieldErrors) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            field,
            format!(
                "The {} field must be at least {MIN_PASSWORD_LEN} characters.",
                humanize(field)
            ),
        );
    }
}

/// Deserialize a boolean sent as `true/false`, `1/0` or their string forms.
pub fn flexible_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Int(i64),
        Text(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    let value = match raw {
        None => return Ok(None),
        Some(Raw::Bool(value)) => value,
        Some(Raw::Int(1)) => true,
        Some(Raw::Int(0)) => false,
        Some(Raw::Text(text)) => match text.trim() {
            "true" | "1" => true,
            "false" | "0" => false,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "`{other}` is not a boolean"
                )));
            }
        },
        Some(Raw::Int(other)) => {
            return Err(serde::de::Error::custom(format!(
                "`{other}` is not a boolean"
            )));
        }
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Flag {
        #[serde(default, deserialize_with = "flexible_bool")]
        on: Option<bool>,
    }

    fn flag(json: &str) -> Option<bool> {
        serde_json::from_str::<Flag>(json).unwrap().on
    }

    #[test]
    fn required_trims_and_reports_blank_values() {
        let mut errors = FieldErrors::new();
        assert_eq!(
            errors.required("category", Some("  Sports ".into())),
            Some("Sports".into())
        );
        assert_eq!(errors.required("title", Some("   ".into())), None);
        assert_eq!(errors.required("category_id", None), None);
        assert_eq!(
            errors.get("category_id"),
            Some(&["The category id field is required.".to_string()][..])
        );
        assert!(errors.contains("title"));
    }

    #[test]
    fn errors_serialize_as_field_map() {
        let mut errors = FieldErrors::new();
        errors.taken("category");
        errors.invalid_selection("tags.0");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "category": ["The category has already been taken."],
                "tags.0": ["The selected tags.0 is invalid."]
            })
        );
    }

    #[test]
    fn booleans_accept_numeric_and_textual_forms() {
        assert_eq!(flag(r#"{"on": true}"#), Some(true));
        assert_eq!(flag(r#"{"on": 0}"#), Some(false));
        assert_eq!(flag(r#"{"on": "1"}"#), Some(true));
        assert_eq!(flag(r#"{"on": "false"}"#), Some(false));
        assert_eq!(flag(r#"{}"#), None);
        assert!(serde_json::from_str::<Flag>(r#"{"on": "maybe"}"#).is_err());
    }

    #[test]
    fn dates_must_be_calendar_days() {
        let mut errors = FieldErrors::new();
        let date = parse_date("date", "2024-08-17", &mut errors).unwrap();
        assert_eq!(format_date(date), "2024-08-17");
        assert!(parse_date("date", "2024-02-30", &mut errors).is_none());
        assert!(errors.contains("date"));
    }

    #[test]
    fn email_shape_check() {
        assert!(is_valid_email("guru@sekolah.sch.id"));
        assert!(!is_valid_email("guru@localhost"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("a b@x.io"));
    }
}
