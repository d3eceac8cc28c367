/// Stream handlers - owner-facing configuration and lifecycle endpoints
use actix_web::{web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::middleware::UserId;
use crate::models::{ConfigureStreamRequest, UpdateStreamRequest};
use crate::services::thumbnails::MAX_THUMBNAIL_BYTES;
use crate::services::{LifecycleService, ThumbnailStorage};

/// Configure the caller's idle stream slot before going live
pub async fn setup_stream(
    lifecycle: web::Data<LifecycleService>,
    user: UserId,
    req: web::Json<ConfigureStreamRequest>,
) -> Result<HttpResponse> {
    req.validate()?;
    let stream = lifecycle.configure_stream(user.0, &req).await?;
    Ok(HttpResponse::Ok().json(stream))
}

/// Get the caller's current (non-ended) stream, or null when none is set up
pub async fn get_current_stream(
    lifecycle: web::Data<LifecycleService>,
    user: UserId,
) -> Result<HttpResponse> {
    let stream = lifecycle.current_stream(user.0).await?;
    Ok(HttpResponse::Ok().json(stream))
}

/// Edit title/description/category/chat toggle on a non-ended stream
pub async fn update_stream(
    lifecycle: web::Data<LifecycleService>,
    stream_id: web::Path<Uuid>,
    user: UserId,
    req: web::Json<UpdateStreamRequest>,
) -> Result<HttpResponse> {
    req.validate()?;
    let stream = lifecycle
        .update_stream(stream_id.into_inner(), user.0, &req)
        .await?;
    Ok(HttpResponse::Ok().json(stream))
}

/// End the caller's live stream
pub async fn end_stream(
    lifecycle: web::Data<LifecycleService>,
    stream_id: web::Path<Uuid>,
    user: UserId,
) -> Result<HttpResponse> {
    let stream = lifecycle.end_stream(stream_id.into_inner(), user.0).await?;
    Ok(HttpResponse::Ok().json(stream))
}

/// Upload a stream thumbnail (multipart form, single image field)
pub async fn upload_thumbnail(
    lifecycle: web::Data<LifecycleService>,
    thumbnails: web::Data<ThumbnailStorage>,
    stream_id: web::Path<Uuid>,
    user: UserId,
    mut payload: actix_multipart::Multipart,
) -> Result<HttpResponse> {
    let stream_id = stream_id.into_inner();

    // Ownership is checked before touching object storage.
    lifecycle.owned_stream(stream_id, user.0).await?;

    let mut field = payload
        .try_next()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart payload: {e}")))?
        .ok_or_else(|| AppError::BadRequest("Thumbnail file is required".to_string()))?;

    let content_type = field
        .content_type()
        .map(|m| m.to_string())
        .ok_or_else(|| AppError::BadRequest("Thumbnail content type is required".to_string()))?;

    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk =
            chunk.map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?;
        if bytes.len() + chunk.len() > MAX_THUMBNAIL_BYTES {
            return Err(AppError::BadRequest("Thumbnail too large".to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }
    if bytes.is_empty() {
        return Err(AppError::BadRequest("Thumbnail file is empty".to_string()));
    }

    let url = thumbnails.upload(stream_id, &content_type, bytes).await?;
    let stream = lifecycle.set_thumbnail(stream_id, user.0, &url).await?;
    Ok(HttpResponse::Ok().json(stream))
}
