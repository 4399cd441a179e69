//! Request bodies for create and update calls, sent as JSON or as multipart forms.

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::application::blobs::ImageUpload;
use crate::application::error::AppError;
use crate::domain::error::DomainError;

/// A submitted payload plus the uploaded image, if any.
#[derive(Debug, Default)]
pub struct ResourceForm {
    pub fields: Value,
    pub image: Option<ImageUpload>,
}

impl ResourceForm {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        serde_json::from_value(self.fields.clone())
            .map_err(|err| DomainError::validation(err.to_string()).into())
    }
}

impl<S> FromRequest<S> for ResourceForm
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(request, state)
                .await
                .map_err(|err| DomainError::validation(err.body_text()))?;
            return read_multipart(multipart).await;
        }

        let bytes = Bytes::from_request(request, state)
            .await
            .map_err(|err| DomainError::validation(err.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self {
                fields: Value::Object(Map::new()),
                image: None,
            });
        }

        let fields: Value = serde_json::from_slice(&bytes)
            .map_err(|err| DomainError::validation(format!("malformed JSON body: {err}")))?;
        if !fields.is_object() {
            return Err(DomainError::validation("request body must be a JSON object").into());
        }
        Ok(Self {
            fields,
            image: None,
        })
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<ResourceForm, AppError> {
    let mut fields = Map::new();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| DomainError::validation(format!("invalid multipart payload: {err}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if let Some(file_name) = field.file_name().map(str::to_string) {
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|err| DomainError::validation(format!("failed to read upload: {err}")))?;
            if !bytes.is_empty() {
                image = Some(ImageUpload {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|err| DomainError::validation(format!("failed to read field: {err}")))?;
        insert_field(&mut fields, &name, text);
    }

    Ok(ResourceForm {
        fields: Value::Object(fields),
        image,
    })
}

/// `tags[]` and `tags[0]` accumulate into an array under `tags`; plain names overwrite.
fn insert_field(fields: &mut Map<String, Value>, name: &str, value: String) {
    match array_key(name) {
        Some(key) => {
            let entry = fields
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => items.push(Value::String(value)),
                other => *other = Value::Array(vec![Value::String(value)]),
            }
        }
        None => {
            fields.insert(name.to_string(), Value::String(value));
        }
    }
}

fn array_key(name: &str) -> Option<&str> {
    let open = name.find('[')?;
    let inner = name[open..].strip_prefix('[')?.strip_suffix(']')?;
    if inner.is_empty() || inner.bytes().all(|b| b.is_ascii_digit()) {
        Some(&name[..open])
    } else {
        None
    }
}
