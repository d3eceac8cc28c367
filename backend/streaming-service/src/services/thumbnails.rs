//! Thumbnail storage
//!
//! Uploaded thumbnails are pushed to S3-compatible object storage and the
//! resulting public URL is written onto the stream row.

use crate::config::S3Config;
use crate::error::{AppError, Result};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use uuid::Uuid;

/// Maximum accepted thumbnail size (5 MiB)
pub const MAX_THUMBNAIL_BYTES: usize = 5 * 1024 * 1024;

/// File extension for an accepted thumbnail content type
pub fn thumbnail_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[derive(Clone)]
pub struct ThumbnailStorage {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl ThumbnailStorage {
    pub async fn new(config: &S3Config) -> Self {
        let aws_config = aws_config::load_from_env().await;
        let client = match &config.endpoint {
            Some(endpoint) => {
                let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
                    .endpoint_url(endpoint)
                    .force_path_style(true)
                    .build();
                Client::from_conf(s3_config)
            }
            None => Client::new(&aws_config),
        };

        Self {
            client,
            bucket: config.bucket.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upload thumbnail bytes and return the public URL
    pub async fn upload(
        &self,
        stream_id: Uuid,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let ext = thumbnail_extension(content_type).ok_or_else(|| {
            AppError::BadRequest("Thumbnail must be png, jpeg or webp".to_string())
        })?;
        if bytes.len() > MAX_THUMBNAIL_BYTES {
            return Err(AppError::BadRequest("Thumbnail too large".to_string()));
        }

        let key = format!("thumbnails/{}/{}.{}", stream_id, Uuid::new_v4(), ext);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Thumbnail upload failed: {e}")))?;

        Ok(format!("{}/{}", self.public_base_url, key))
    }
}
