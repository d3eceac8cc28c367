//! Ingest gate
//!
//! The RTMP media server calls back into this service on publish and
//! publish-done events. The gate validates the presented stream key before
//! admitting the connection and drives the lifecycle manager on both edges.

use crate::db::DynStreamStore;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::Stream;
use crate::services::LifecycleService;
use tracing::{info, warn};

/// Extract the stream key from a publish path such as `/live/<key>`
pub fn stream_key_from_path(path: &str) -> Option<&str> {
    path.rsplit('/').find(|segment| !segment.is_empty())
}

#[derive(Clone)]
pub struct IngestGate {
    store: DynStreamStore,
    lifecycle: LifecycleService,
}

impl IngestGate {
    pub fn new(store: DynStreamStore, lifecycle: LifecycleService) -> Self {
        Self { store, lifecycle }
    }

    /// Validate the presented key and transition the owner's stream to live.
    ///
    /// An unknown key is a security rejection: logged, no state changes, and
    /// the publish connection is refused.
    pub async fn admit(&self, path: &str, remote: &str) -> Result<Stream> {
        let Some(key) = stream_key_from_path(path) else {
            metrics::observe_ingest_auth(false);
            warn!(%path, %remote, "ingest rejected: no stream key in publish path");
            return Err(AppError::Rejected("Missing stream key".to_string()));
        };

        let Some(account_id) = self.store.account_id_for_key(key).await? else {
            metrics::observe_ingest_auth(false);
            warn!(%remote, "ingest rejected: unknown stream key");
            return Err(AppError::Rejected("Invalid stream key".to_string()));
        };

        let stream = self.lifecycle.go_live(account_id).await?;
        metrics::observe_ingest_auth(true);
        info!(%account_id, stream_id = %stream.id, %remote, "ingest admitted");
        Ok(stream)
    }

    /// Symmetric teardown on publish-done.
    ///
    /// Best-effort: the encoder is already gone, so failures are logged and
    /// swallowed rather than propagated back into the media pipeline.
    pub async fn teardown(&self, path: &str, remote: &str) {
        let Some(key) = stream_key_from_path(path) else {
            warn!(%path, %remote, "ingest teardown with no stream key in path");
            return;
        };

        let account_id = match self.store.account_id_for_key(key).await {
            Ok(Some(account_id)) => account_id,
            Ok(None) => {
                warn!(%remote, "ingest teardown for unknown stream key");
                return;
            }
            Err(err) => {
                warn!(%remote, error = %err, "ingest teardown key lookup failed");
                return;
            }
        };

        match self.lifecycle.end_active(account_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!(%account_id, %remote, "ingest teardown: no live stream to end");
            }
            Err(err) => {
                warn!(%account_id, %remote, error = %err, "ingest teardown failed");
            }
        }
    }
}
