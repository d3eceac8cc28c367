/// Data models for streaming-service
///
/// This module defines structures for:
/// - Stream: a broadcaster's persistent broadcast slot and its lifecycle
/// - Broadcaster: public subset of the owning account
/// - Request/response payloads for the HTTP API
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// ========================================
// Stream lifecycle
// ========================================

/// Stream status in the broadcast lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Idle,
    Live,
    Ended,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Live => "live",
            Self::Ended => "ended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "live" => Some(Self::Live),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

/// Stream database entity
///
/// One row per broadcast slot: an idle row is configured before going live,
/// flips to live on ingest, and becomes immutable history once ended.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stream {
    pub id: Uuid,
    pub account_id: Uuid,
    pub channel_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub thumbnail_url: Option<String>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub viewer_count: i32,
    pub peak_viewers: i32,
    pub total_views: i64,
    pub duration_seconds: i32,
    pub chat_enabled: bool,
    pub record_stream: bool,
    pub vod_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stream {
    pub fn status(&self) -> Option<StreamStatus> {
        StreamStatus::from_str(&self.status)
    }

    pub fn is_live(&self) -> bool {
        self.status == StreamStatus::Live.as_str()
    }

    pub fn is_ended(&self) -> bool {
        self.status == StreamStatus::Ended.as_str()
    }
}

/// Public subset of the owning account embedded in discovery responses.
/// Never carries the stream key.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Broadcaster {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Stream plus its broadcaster, as returned by public endpoints
#[derive(Debug, Clone, Serialize)]
pub struct StreamDetails {
    #[serde(flatten)]
    pub stream: Stream,
    pub broadcaster: Broadcaster,
}

/// Public live-stream payload: details plus the HLS playback URL
#[derive(Debug, Serialize)]
pub struct LiveStreamResponse {
    #[serde(flatten)]
    pub details: StreamDetails,
    pub playback_url: String,
}

impl LiveStreamResponse {
    pub fn new(details: StreamDetails, hls_cdn_url: &str) -> Self {
        let playback_url = format!(
            "{}/{}/index.m3u8",
            hls_cdn_url.trim_end_matches('/'),
            details.stream.id
        );
        Self {
            details,
            playback_url,
        }
    }
}

// ========================================
// Request payloads
// ========================================

/// Pre-broadcast stream configuration (owner API)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfigureStreamRequest {
    #[validate(length(min = 1, max = 140))]
    pub title: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(max = 64))]
    pub category: Option<String>,
    pub chat_enabled: Option<bool>,
    pub record_stream: Option<bool>,
    pub channel_id: Option<Uuid>,
}

/// In-flight metadata edit (owner API); never touches status or timestamps
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateStreamRequest {
    #[validate(length(min = 1, max = 140))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(max = 64))]
    pub category: Option<String>,
    pub chat_enabled: Option<bool>,
}

/// Discovery query parameters
#[derive(Debug, Deserialize)]
pub struct LiveStreamsQuery {
    pub category: Option<String>,
    pub limit: Option<i64>,
}

// ========================================
// Response payloads
// ========================================

#[derive(Debug, Serialize)]
pub struct StreamKeyResponse {
    pub stream_key: String,
    pub ingest_url: String,
}

#[derive(Debug, Serialize)]
pub struct ViewerCountResponse {
    pub viewer_count: i32,
}
