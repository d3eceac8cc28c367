//! RTMP webhook handlers
//!
//! The media server (nginx-rtmp or node-media-server style) calls these
//! endpoints on publish and publish-done events. Responses are plain
//! statuses: 200 admits the connection, 403 refuses it. The done hook always
//! answers 200 because the encoder is already gone.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::error;

use crate::error::AppError;
use crate::services::IngestGate;

#[derive(Debug, Deserialize)]
pub struct RtmpHookQuery {
    pub app: Option<String>,
    pub name: Option<String>,
    pub addr: Option<String>,
    pub clientid: Option<String>,
}

impl RtmpHookQuery {
    /// Reassemble the publish path; the stream key is its final segment.
    fn publish_path(&self) -> String {
        format!(
            "/{}/{}",
            self.app.as_deref().unwrap_or("live"),
            self.name.as_deref().unwrap_or_default()
        )
    }

    fn remote(&self) -> &str {
        self.addr.as_deref().unwrap_or("unknown")
    }
}

/// Pre-publish hook: admit or reject the incoming stream
pub async fn rtmp_auth(
    gate: web::Data<IngestGate>,
    query: web::Query<RtmpHookQuery>,
) -> HttpResponse {
    match gate.admit(&query.publish_path(), query.remote()).await {
        Ok(_) => HttpResponse::Ok().finish(),
        Err(AppError::Rejected(_)) => HttpResponse::Forbidden().finish(),
        Err(err) => {
            error!(error = %err, "ingest admission failed");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Done-publish hook: best-effort teardown of the publisher's live stream
pub async fn rtmp_done(
    gate: web::Data<IngestGate>,
    query: web::Query<RtmpHookQuery>,
) -> HttpResponse {
    gate.teardown(&query.publish_path(), query.remote()).await;
    HttpResponse::Ok().finish()
}
