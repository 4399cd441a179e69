//! Blob storage for uploaded images.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::validation::FieldErrors;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob path `{0}`")]
    InvalidPath(String),
    #[error("blob `{0}` not found")]
    NotFound(String),
    #[error("blob storage failure: {0}")]
    Io(#[from] std::io::Error),
}

/// An image received with a create or update request.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Where a stored blob lives and how it is reached from outside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    /// Path relative to the storage root; persisted as the row's `image_name`.
    pub path: String,
    pub url: String,
    pub size_bytes: u64,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, namespace: &str, upload: &ImageUpload) -> Result<StoredBlob, BlobError>;

    async fn read(&self, path: &str) -> Result<Bytes, BlobError>;

    /// Deleting a missing blob succeeds.
    async fn delete(&self, path: &str) -> Result<(), BlobError>;

    fn url_for(&self, path: &str) -> String;
}

const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Check an uploaded image against the accepted formats and size limit,
/// recording failures under `field`.
pub fn check_image(field: &str, upload: &ImageUpload, max_bytes: u64, errors: &mut FieldErrors) {
    if upload.bytes.len() as u64 > max_bytes {
        errors.add(
            field,
            format!(
                "The {field} field must not be greater than {} kilobytes.",
                max_bytes / 1024
            ),
        );
        return;
    }

    let declared_ok = upload
        .content_type
        .as_deref()
        .map(|value| ALLOWED_IMAGE_TYPES.contains(&value))
        .unwrap_or(true);
    let detected = imagesize::image_type(&upload.bytes).ok();
    let sniffed_ok = matches!(
        detected,
        Some(imagesize::ImageType::Jpeg) | Some(imagesize::ImageType::Png)
    );

    if !declared_ok || !sniffed_ok {
        errors.add(
            field,
            format!("The {field} field must be a file of type: jpeg, png, jpg."),
        );
    }
}
