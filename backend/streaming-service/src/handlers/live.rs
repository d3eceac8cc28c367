/// Public live endpoints - discovery and anonymous viewer accounting
use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::config::Config;
use crate::db::DynStreamStore;
use crate::error::{AppError, Result};
use crate::models::{LiveStreamResponse, LiveStreamsQuery, ViewerCountResponse};
use crate::services::ViewerService;

const DEFAULT_DISCOVERY_LIMIT: i64 = 20;
const MAX_DISCOVERY_LIMIT: i64 = 100;

/// List live streams, most-watched first, optionally filtered by category
pub async fn list_live_streams(
    store: web::Data<DynStreamStore>,
    config: web::Data<Config>,
    query: web::Query<LiveStreamsQuery>,
) -> Result<HttpResponse> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DISCOVERY_LIMIT)
        .clamp(1, MAX_DISCOVERY_LIMIT);
    let category = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let streams: Vec<LiveStreamResponse> = store
        .list_live(category, limit)
        .await?
        .into_iter()
        .map(|details| LiveStreamResponse::new(details, &config.ingest.hls_cdn_url))
        .collect();
    Ok(HttpResponse::Ok().json(streams))
}

/// Get a single stream with its broadcaster and playback URL
pub async fn get_live_stream(
    store: web::Data<DynStreamStore>,
    config: web::Data<Config>,
    stream_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let details = store
        .get_stream_details(stream_id.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Stream not found".to_string()))?;
    Ok(HttpResponse::Ok().json(LiveStreamResponse::new(
        details,
        &config.ingest.hls_cdn_url,
    )))
}

/// Anonymous viewer join: bumps the viewer gauge on a live stream
pub async fn join_stream(
    viewers: web::Data<ViewerService>,
    stream_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let viewer_count = viewers.join(stream_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ViewerCountResponse { viewer_count }))
}

/// Anonymous viewer leave: decrements the gauge, clamped at zero
pub async fn leave_stream(
    viewers: web::Data<ViewerService>,
    stream_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let viewer_count = viewers.leave(stream_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ViewerCountResponse { viewer_count }))
}
