//! Filesystem-backed blob storage for uploaded images.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use time::OffsetDateTime;
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::application::blobs::{BlobError, BlobStore, ImageUpload, StoredBlob};

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base: Url,
}

impl LocalBlobStore {
    /// Storage rooted at `root`, created if missing. Stored blobs are served under `public_base`.
    pub fn new(root: PathBuf, public_base: Url) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, public_base })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a stored blob; rejects absolute paths and `..`.
    pub fn resolve(&self, stored_path: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(stored_path);
        if stored_path.is_empty()
            || relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(BlobError::InvalidPath(stored_path.to_string()));
        }

        Ok(self.root.join(relative))
    }

    fn build_stored_path(namespace: &str, original_name: &str) -> String {
        let (year, month, _) = OffsetDateTime::now_utc().to_calendar_date();
        let namespace = match slugify(namespace) {
            value if value.is_empty() => "misc".to_string(),
            value => value,
        };
        let identifier = Uuid::new_v4();
        let filename = sanitize_filename(original_name);
        format!("{namespace}/{year}/{:02}/{identifier}-{filename}", month as u8)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, namespace: &str, upload: &ImageUpload) -> Result<StoredBlob, BlobError> {
        let stored_path = Self::build_stored_path(namespace, &upload.file_name);
        let absolute = self.resolve(&stored_path)?;

        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&absolute).await?;
        if let Err(err) = file.write_all(&upload.bytes).await {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(err.into());
        }
        file.flush().await?;

        debug!(
            path = %stored_path,
            size_bytes = upload.bytes.len(),
            sha256 = %hex::encode(Sha256::digest(&upload.bytes)),
            "blob stored"
        );

        Ok(StoredBlob {
            url: self.url_for(&stored_path),
            path: stored_path,
            size_bytes: upload.bytes.len() as u64,
        })
    }

    async fn read(&self, path: &str) -> Result<Bytes, BlobError> {
        let absolute = self.resolve(path)?;
        match fs::read(absolute).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<(), BlobError> {
        let absolute = self.resolve(path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn url_for(&self, path: &str) -> String {
        self.public_base
            .join(path)
            .map(String::from)
            .unwrap_or_else(|_| {
                format!("{}/{path}", self.public_base.as_str().trim_end_matches('/'))
            })
    }
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}
