//! Viewer accounting
//!
//! Join/leave are high-frequency anonymous operations from many independent
//! viewers; every mutation is a single atomic counter update in the store.

use crate::db::{DynStreamStore, JoinOutcome};
use crate::error::{AppError, Result};
use crate::metrics;
use uuid::Uuid;

#[derive(Clone)]
pub struct ViewerService {
    store: DynStreamStore,
}

impl ViewerService {
    pub fn new(store: DynStreamStore) -> Self {
        Self { store }
    }

    /// Count a viewer in: bumps the gauge, the peak and the total-views
    /// counter, returning the new gauge value. Only valid on live streams.
    pub async fn join(&self, stream_id: Uuid) -> Result<i32> {
        match self.store.join_stream(stream_id).await? {
            JoinOutcome::Joined(count) => {
                metrics::observe_viewer_event("join");
                Ok(count)
            }
            JoinOutcome::Missing => Err(AppError::NotFound("Stream not found".to_string())),
            JoinOutcome::NotLive => Err(AppError::InvalidState("Stream is not live".to_string())),
        }
    }

    /// Count a viewer out, clamped at zero. No status check: leaving an
    /// ended stream is harmless.
    pub async fn leave(&self, stream_id: Uuid) -> Result<i32> {
        let count = self
            .store
            .leave_stream(stream_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stream not found".to_string()))?;
        metrics::observe_viewer_event("leave");
        Ok(count)
    }
}
