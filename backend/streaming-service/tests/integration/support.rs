//! Shared test support: an in-memory `StreamStore` mirroring the atomic
//! contract of the Postgres implementation (every mutation happens under a
//! single lock, so the guarded-update semantics hold exactly).

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use streaming_service::db::{
    DynStreamStore, IdleUpsert, JoinOutcome, KeyLookup, KeyWrite, LiveTransition, StreamStore,
};
use streaming_service::error::Result;
use streaming_service::models::{
    Broadcaster, ConfigureStreamRequest, Stream, StreamDetails, StreamStatus, UpdateStreamRequest,
};
use streaming_service::services::{
    IngestGate, LifecycleService, StreamKeyService, ViewerService,
};

#[derive(Debug, Clone)]
pub struct MemoryAccount {
    pub id: Uuid,
    pub username: String,
    pub stream_key: Option<String>,
    pub is_live: bool,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, MemoryAccount>,
    streams: Vec<Stream>,
}

pub struct MemoryStreamStore {
    inner: Mutex<Inner>,
}

impl MemoryStreamStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
        })
    }

    pub async fn add_account(&self, username: &str) -> Uuid {
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().await;
        inner.accounts.insert(
            id,
            MemoryAccount {
                id,
                username: username.to_string(),
                stream_key: None,
                is_live: false,
            },
        );
        id
    }

    pub async fn account(&self, account_id: Uuid) -> Option<MemoryAccount> {
        self.inner.lock().await.accounts.get(&account_id).cloned()
    }

    pub async fn stream(&self, stream_id: Uuid) -> Option<Stream> {
        self.inner
            .lock()
            .await
            .streams
            .iter()
            .find(|s| s.id == stream_id)
            .cloned()
    }

    pub async fn streams_for_account(&self, account_id: Uuid) -> Vec<Stream> {
        self.inner
            .lock()
            .await
            .streams
            .iter()
            .filter(|s| s.account_id == account_id)
            .cloned()
            .collect()
    }

    /// Shift a stream's started_at into the past to exercise duration math.
    pub async fn backdate_started_at(&self, stream_id: Uuid, seconds: i64) {
        let mut inner = self.inner.lock().await;
        if let Some(stream) = inner.streams.iter_mut().find(|s| s.id == stream_id) {
            stream.started_at = Some(Utc::now() - Duration::seconds(seconds));
        }
    }
}

fn blank_stream(account_id: Uuid, title: String, status: StreamStatus) -> Stream {
    let now = Utc::now();
    Stream {
        id: Uuid::new_v4(),
        account_id,
        channel_id: None,
        title,
        description: None,
        category: None,
        thumbnail_url: None,
        status: status.as_str().to_string(),
        started_at: None,
        ended_at: None,
        viewer_count: 0,
        peak_viewers: 0,
        total_views: 0,
        duration_seconds: 0,
        chat_enabled: true,
        record_stream: true,
        vod_url: None,
        created_at: now,
        updated_at: now,
    }
}

fn end_stream_row(stream: &mut Stream) {
    let now = Utc::now();
    stream.status = StreamStatus::Ended.as_str().to_string();
    stream.ended_at = Some(now);
    stream.duration_seconds = stream
        .started_at
        .map(|started| (now - started).num_seconds().max(0) as i32)
        .unwrap_or(0);
    stream.viewer_count = 0;
    stream.updated_at = now;
}

fn details_for(inner: &Inner, stream: &Stream) -> StreamDetails {
    let broadcaster = inner
        .accounts
        .get(&stream.account_id)
        .map(|account| Broadcaster {
            id: account.id,
            username: account.username.clone(),
            display_name: None,
            avatar_url: None,
        })
        .unwrap_or(Broadcaster {
            id: stream.account_id,
            username: "unknown".to_string(),
            display_name: None,
            avatar_url: None,
        });
    StreamDetails {
        stream: stream.clone(),
        broadcaster,
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn stream_key(&self, account_id: Uuid) -> Result<KeyLookup> {
        let inner = self.inner.lock().await;
        Ok(match inner.accounts.get(&account_id) {
            None => KeyLookup::NoAccount,
            Some(account) => match &account.stream_key {
                Some(key) => KeyLookup::Present(key.clone()),
                None => KeyLookup::Missing,
            },
        })
    }

    async fn install_stream_key(&self, account_id: Uuid, key: &str) -> Result<KeyWrite> {
        let mut inner = self.inner.lock().await;
        if inner
            .accounts
            .values()
            .any(|a| a.stream_key.as_deref() == Some(key))
        {
            return Ok(KeyWrite::Collision);
        }
        match inner.accounts.get_mut(&account_id) {
            Some(account) if account.stream_key.is_none() => {
                account.stream_key = Some(key.to_string());
                Ok(KeyWrite::Written)
            }
            _ => Ok(KeyWrite::Skipped),
        }
    }

    async fn replace_stream_key(&self, account_id: Uuid, key: &str) -> Result<KeyWrite> {
        let mut inner = self.inner.lock().await;
        if inner
            .accounts
            .values()
            .any(|a| a.id != account_id && a.stream_key.as_deref() == Some(key))
        {
            return Ok(KeyWrite::Collision);
        }
        match inner.accounts.get_mut(&account_id) {
            Some(account) => {
                account.stream_key = Some(key.to_string());
                Ok(KeyWrite::Written)
            }
            None => Ok(KeyWrite::Skipped),
        }
    }

    async fn account_id_for_key(&self, key: &str) -> Result<Option<Uuid>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .accounts
            .values()
            .find(|a| a.stream_key.as_deref() == Some(key))
            .map(|a| a.id))
    }

    async fn go_live(&self, account_id: Uuid) -> Result<Option<LiveTransition>> {
        let mut inner = self.inner.lock().await;
        if !inner.accounts.contains_key(&account_id) {
            return Ok(None);
        }

        if let Some(stream) = inner
            .streams
            .iter_mut()
            .find(|s| s.account_id == account_id && s.status == "idle")
        {
            let now = Utc::now();
            stream.status = StreamStatus::Live.as_str().to_string();
            stream.started_at = Some(now);
            stream.ended_at = None;
            stream.viewer_count = 0;
            stream.peak_viewers = 0;
            stream.duration_seconds = 0;
            stream.updated_at = now;
            let stream = stream.clone();
            if let Some(account) = inner.accounts.get_mut(&account_id) {
                account.is_live = true;
            }
            return Ok(Some(LiveTransition {
                stream,
                newly_live: true,
            }));
        }

        if let Some(stream) = inner
            .streams
            .iter()
            .find(|s| s.account_id == account_id && s.status == "live")
        {
            let stream = stream.clone();
            if let Some(account) = inner.accounts.get_mut(&account_id) {
                account.is_live = true;
            }
            return Ok(Some(LiveTransition {
                stream,
                newly_live: false,
            }));
        }

        let username = inner
            .accounts
            .get(&account_id)
            .map(|a| a.username.clone())
            .unwrap_or_default();
        let mut stream = blank_stream(
            account_id,
            format!("{username}'s live stream"),
            StreamStatus::Live,
        );
        stream.started_at = Some(Utc::now());
        inner.streams.push(stream.clone());
        if let Some(account) = inner.accounts.get_mut(&account_id) {
            account.is_live = true;
        }
        Ok(Some(LiveTransition {
            stream,
            newly_live: true,
        }))
    }

    async fn end_active(&self, account_id: Uuid) -> Result<Option<Stream>> {
        let mut inner = self.inner.lock().await;
        let ended = inner
            .streams
            .iter_mut()
            .find(|s| s.account_id == account_id && s.status == "live")
            .map(|stream| {
                end_stream_row(stream);
                stream.clone()
            });
        if let Some(account) = inner.accounts.get_mut(&account_id) {
            account.is_live = false;
        }
        Ok(ended)
    }

    async fn finish_stream(&self, stream_id: Uuid) -> Result<Option<Stream>> {
        let mut inner = self.inner.lock().await;
        let ended = inner
            .streams
            .iter_mut()
            .find(|s| s.id == stream_id && s.status == "live")
            .map(|stream| {
                end_stream_row(stream);
                stream.clone()
            });
        if let Some(stream) = &ended {
            let account_id = stream.account_id;
            if let Some(account) = inner.accounts.get_mut(&account_id) {
                account.is_live = false;
            }
        }
        Ok(ended)
    }

    async fn upsert_idle(
        &self,
        account_id: Uuid,
        settings: &ConfigureStreamRequest,
    ) -> Result<IdleUpsert> {
        let mut inner = self.inner.lock().await;
        if inner
            .streams
            .iter()
            .any(|s| s.account_id == account_id && s.status == "live")
        {
            return Ok(IdleUpsert::CurrentlyLive);
        }

        if let Some(stream) = inner
            .streams
            .iter_mut()
            .find(|s| s.account_id == account_id && s.status == "idle")
        {
            stream.title = settings.title.clone();
            stream.description = settings.description.clone();
            stream.category = settings.category.clone();
            stream.chat_enabled = settings.chat_enabled.unwrap_or(true);
            stream.record_stream = settings.record_stream.unwrap_or(true);
            stream.channel_id = settings.channel_id;
            stream.updated_at = Utc::now();
            return Ok(IdleUpsert::Applied(stream.clone()));
        }

        let mut stream = blank_stream(account_id, settings.title.clone(), StreamStatus::Idle);
        stream.description = settings.description.clone();
        stream.category = settings.category.clone();
        stream.chat_enabled = settings.chat_enabled.unwrap_or(true);
        stream.record_stream = settings.record_stream.unwrap_or(true);
        stream.channel_id = settings.channel_id;
        inner.streams.push(stream.clone());
        Ok(IdleUpsert::Applied(stream))
    }

    async fn update_metadata(
        &self,
        stream_id: Uuid,
        patch: &UpdateStreamRequest,
    ) -> Result<Option<Stream>> {
        let mut inner = self.inner.lock().await;
        let updated = inner
            .streams
            .iter_mut()
            .find(|s| s.id == stream_id && s.status != "ended")
            .map(|stream| {
                if let Some(title) = &patch.title {
                    stream.title = title.clone();
                }
                if let Some(description) = &patch.description {
                    stream.description = Some(description.clone());
                }
                if let Some(category) = &patch.category {
                    stream.category = Some(category.clone());
                }
                if let Some(chat_enabled) = patch.chat_enabled {
                    stream.chat_enabled = chat_enabled;
                }
                stream.updated_at = Utc::now();
                stream.clone()
            });
        Ok(updated)
    }

    async fn set_thumbnail(&self, stream_id: Uuid, url: &str) -> Result<Option<Stream>> {
        let mut inner = self.inner.lock().await;
        let updated = inner
            .streams
            .iter_mut()
            .find(|s| s.id == stream_id && s.status != "ended")
            .map(|stream| {
                stream.thumbnail_url = Some(url.to_string());
                stream.updated_at = Utc::now();
                stream.clone()
            });
        Ok(updated)
    }

    async fn get_stream(&self, stream_id: Uuid) -> Result<Option<Stream>> {
        Ok(self.stream(stream_id).await)
    }

    async fn get_stream_details(&self, stream_id: Uuid) -> Result<Option<StreamDetails>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .streams
            .iter()
            .find(|s| s.id == stream_id)
            .map(|s| details_for(&inner, s)))
    }

    async fn current_for_account(&self, account_id: Uuid) -> Result<Option<Stream>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .streams
            .iter()
            .find(|s| s.account_id == account_id && s.status != "ended")
            .cloned())
    }

    async fn list_live(&self, category: Option<&str>, limit: i64) -> Result<Vec<StreamDetails>> {
        let inner = self.inner.lock().await;
        let mut live: Vec<&Stream> = inner
            .streams
            .iter()
            .filter(|s| s.status == "live")
            .filter(|s| category.map_or(true, |c| s.category.as_deref() == Some(c)))
            .collect();
        live.sort_by(|a, b| b.viewer_count.cmp(&a.viewer_count));
        Ok(live
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|s| details_for(&inner, s))
            .collect())
    }

    async fn join_stream(&self, stream_id: Uuid) -> Result<JoinOutcome> {
        let mut inner = self.inner.lock().await;
        let Some(stream) = inner.streams.iter_mut().find(|s| s.id == stream_id) else {
            return Ok(JoinOutcome::Missing);
        };
        if stream.status != "live" {
            return Ok(JoinOutcome::NotLive);
        }
        stream.viewer_count += 1;
        stream.peak_viewers = stream.peak_viewers.max(stream.viewer_count);
        stream.total_views += 1;
        stream.updated_at = Utc::now();
        Ok(JoinOutcome::Joined(stream.viewer_count))
    }

    async fn leave_stream(&self, stream_id: Uuid) -> Result<Option<i32>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .streams
            .iter_mut()
            .find(|s| s.id == stream_id)
            .map(|stream| {
                stream.viewer_count = (stream.viewer_count - 1).max(0);
                stream.updated_at = Utc::now();
                stream.viewer_count
            }))
    }
}

/// Wire the full service stack over a store.
pub fn services(
    store: &Arc<MemoryStreamStore>,
) -> (StreamKeyService, LifecycleService, IngestGate, ViewerService) {
    let store: DynStreamStore = store.clone();
    let keys = StreamKeyService::new(store.clone());
    let lifecycle = LifecycleService::new(store.clone());
    let gate = IngestGate::new(store.clone(), lifecycle.clone());
    let viewers = ViewerService::new(store);
    (keys, lifecycle, gate, viewers)
}
