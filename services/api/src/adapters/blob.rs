//! services/api/src/adapters/blob.rs
//!
//! A `BlobStorage` adapter that writes avatars to a local directory. The API
//! serves that directory back under `/avatars`.

use async_trait::async_trait;
use bytes::Bytes;
use reminders_core::domain::ValidationError;
use reminders_core::ports::{BlobStorage, PortError, PortResult};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, public_base_url: String) -> Self {
        Self {
            root,
            public_base_url,
        }
    }
}

fn extension_for(content_type: &str) -> PortResult<&'static str> {
    match content_type {
        "image/png" => Ok("png"),
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/gif" => Ok("gif"),
        "image/webp" => Ok("webp"),
        other => Err(ValidationError::UnsupportedFileType(other.to_string()).into()),
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStore {
    async fn upload_avatar(
        &self,
        user_id: Uuid,
        data: Bytes,
        content_type: &str,
    ) -> PortResult<String> {
        let extension = extension_for(content_type)?;
        // A fresh name per upload so browsers never show a cached old avatar.
        let file_name = format!("{}-{}.{}", user_id, Uuid::new_v4(), extension);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::write(self.root.join(&file_name), &data)
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        info!("Stored avatar {} ({} bytes)", file_name, data.len());
        Ok(format!("{}/avatars/{}", self.public_base_url, file_name))
    }
}
