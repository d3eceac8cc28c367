/// Stream key handlers - owner-facing key issuance and rotation
use actix_web::{web, HttpResponse};

use crate::config::Config;
use crate::error::Result;
use crate::middleware::UserId;
use crate::models::StreamKeyResponse;
use crate::services::StreamKeyService;

/// Get the caller's stream key, generating one on first request
pub async fn get_stream_key(
    keys: web::Data<StreamKeyService>,
    config: web::Data<Config>,
    user: UserId,
) -> Result<HttpResponse> {
    let stream_key = keys.get_or_create(user.0).await?;
    let ingest_url = format!("{}/{}", config.ingest.rtmp_base_url, stream_key);
    Ok(HttpResponse::Ok().json(StreamKeyResponse {
        stream_key,
        ingest_url,
    }))
}

/// Rotate the caller's stream key, invalidating the previous one
pub async fn reset_stream_key(
    keys: web::Data<StreamKeyService>,
    config: web::Data<Config>,
    user: UserId,
) -> Result<HttpResponse> {
    let stream_key = keys.reset(user.0).await?;
    let ingest_url = format!("{}/{}", config.ingest.rtmp_base_url, stream_key);
    Ok(HttpResponse::Ok().json(StreamKeyResponse {
        stream_key,
        ingest_url,
    }))
}
