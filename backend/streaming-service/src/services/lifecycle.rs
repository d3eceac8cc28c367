//! Stream lifecycle management
//!
//! Owns the idle -> live -> ended state machine. Ingest-driven transitions
//! (go_live / end_active) are idempotent and quiet; owner-driven transitions
//! validate ownership and current status and fail loudly on bad preconditions.

use crate::db::{DynStreamStore, IdleUpsert, LiveTransition};
use crate::error::{AppError, Result};
use crate::models::{ConfigureStreamRequest, Stream, UpdateStreamRequest};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct LifecycleService {
    store: DynStreamStore,
}

impl LifecycleService {
    pub fn new(store: DynStreamStore) -> Self {
        Self { store }
    }

    /// Transition the account's slot to live (ingest-driven, idempotent).
    ///
    /// Reuses the configured idle row when one exists, otherwise creates a
    /// live row lazily. A concurrent second call observes the already-live
    /// row and is a no-op returning the same row.
    pub async fn go_live(&self, account_id: Uuid) -> Result<Stream> {
        let LiveTransition { stream, newly_live } = self
            .store
            .go_live(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

        if newly_live {
            info!(%account_id, stream_id = %stream.id, title = %stream.title, "stream is now live");
        } else {
            info!(%account_id, stream_id = %stream.id, "go-live no-op: stream already live");
        }
        Ok(stream)
    }

    /// End the account's live stream if any (ingest-driven teardown).
    ///
    /// Missing live row is a quiet no-op: network teardown is unreliable and
    /// must never fail loudly.
    pub async fn end_active(&self, account_id: Uuid) -> Result<Option<Stream>> {
        let ended = self.store.end_active(account_id).await?;
        if let Some(stream) = &ended {
            info!(
                %account_id,
                stream_id = %stream.id,
                duration_seconds = stream.duration_seconds,
                peak_viewers = stream.peak_viewers,
                "stream ended"
            );
        }
        Ok(ended)
    }

    /// Fetch a stream, enforcing that the requester owns it.
    pub async fn owned_stream(&self, stream_id: Uuid, requester_id: Uuid) -> Result<Stream> {
        let stream = self
            .store
            .get_stream(stream_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Stream not found".to_string()))?;

        if stream.account_id != requester_id {
            return Err(AppError::Forbidden(
                "You do not own this stream".to_string(),
            ));
        }
        Ok(stream)
    }

    /// End a stream on the owner's explicit request.
    ///
    /// Unlike ingest teardown this validates ownership and requires the
    /// stream to be live; stopping an idle or already-ended stream signals a
    /// client bug and surfaces as an error.
    pub async fn end_stream(&self, stream_id: Uuid, requester_id: Uuid) -> Result<Stream> {
        let stream = self.owned_stream(stream_id, requester_id).await?;
        if !stream.is_live() {
            return Err(AppError::InvalidState("Stream is not live".to_string()));
        }

        // The guarded write re-checks status; a concurrent teardown winning
        // the race surfaces as the same InvalidState.
        let ended = self
            .store
            .finish_stream(stream_id)
            .await?
            .ok_or_else(|| AppError::InvalidState("Stream is not live".to_string()))?;

        info!(
            stream_id = %ended.id,
            account_id = %ended.account_id,
            duration_seconds = ended.duration_seconds,
            "stream ended by owner"
        );
        Ok(ended)
    }

    /// Configure the account's idle slot before going live.
    pub async fn configure_stream(
        &self,
        account_id: Uuid,
        settings: &ConfigureStreamRequest,
    ) -> Result<Stream> {
        match self.store.upsert_idle(account_id, settings).await? {
            IdleUpsert::Applied(stream) => Ok(stream),
            IdleUpsert::CurrentlyLive => Err(AppError::InvalidState(
                "Stream is live; use the update endpoint for in-flight edits".to_string(),
            )),
        }
    }

    /// In-flight metadata edit; never touches status, timestamps or counters.
    pub async fn update_stream(
        &self,
        stream_id: Uuid,
        requester_id: Uuid,
        patch: &UpdateStreamRequest,
    ) -> Result<Stream> {
        let stream = self.owned_stream(stream_id, requester_id).await?;
        if stream.is_ended() {
            return Err(AppError::InvalidState(
                "Ended streams are immutable".to_string(),
            ));
        }

        self.store
            .update_metadata(stream_id, patch)
            .await?
            .ok_or_else(|| AppError::InvalidState("Ended streams are immutable".to_string()))
    }

    /// The account's current non-ended slot, if any.
    pub async fn current_stream(&self, account_id: Uuid) -> Result<Option<Stream>> {
        self.store.current_for_account(account_id).await
    }

    /// Attach an uploaded thumbnail to a non-ended stream the requester owns.
    pub async fn set_thumbnail(
        &self,
        stream_id: Uuid,
        requester_id: Uuid,
        url: &str,
    ) -> Result<Stream> {
        self.owned_stream(stream_id, requester_id).await?;
        self.store
            .set_thumbnail(stream_id, url)
            .await?
            .ok_or_else(|| AppError::InvalidState("Ended streams are immutable".to_string()))
    }
}
