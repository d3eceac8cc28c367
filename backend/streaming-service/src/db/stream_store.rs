/// Stream store - persistent state behind the lifecycle and viewer accounting
///
/// All counter and status mutations are expressed as atomic database-level
/// operations (guarded UPDATE statements), never fetch-mutate-write, so any
/// number of API processes can run concurrently without lost updates.
use crate::error::{AppError, Result};
use crate::models::{
    Broadcaster, ConfigureStreamRequest, Stream, StreamDetails, UpdateStreamRequest,
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle used by the service layer
pub type DynStreamStore = Arc<dyn StreamStore>;

/// Outcome of a stream key read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLookup {
    NoAccount,
    Missing,
    Present(String),
}

/// Outcome of a stream key write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWrite {
    Written,
    /// No row matched (account missing, or key already present on install)
    Skipped,
    /// Generated key collided with another account's key
    Collision,
}

/// Outcome of `go_live`
#[derive(Debug, Clone)]
pub struct LiveTransition {
    pub stream: Stream,
    /// False when a concurrent or repeated call found the row already live
    pub newly_live: bool,
}

/// Outcome of an idle-row upsert
#[derive(Debug, Clone)]
pub enum IdleUpsert {
    Applied(Stream),
    /// The account's current slot is live; configuration is not allowed
    CurrentlyLive,
}

/// Outcome of a viewer join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(i32),
    NotLive,
    Missing,
}

#[async_trait]
pub trait StreamStore: Send + Sync {
    // Stream keys (embedded in the account record)
    async fn stream_key(&self, account_id: Uuid) -> Result<KeyLookup>;
    async fn install_stream_key(&self, account_id: Uuid, key: &str) -> Result<KeyWrite>;
    async fn replace_stream_key(&self, account_id: Uuid, key: &str) -> Result<KeyWrite>;
    async fn account_id_for_key(&self, key: &str) -> Result<Option<Uuid>>;

    // Lifecycle transitions (status and account flag move in one transaction)
    async fn go_live(&self, account_id: Uuid) -> Result<Option<LiveTransition>>;
    async fn end_active(&self, account_id: Uuid) -> Result<Option<Stream>>;
    async fn finish_stream(&self, stream_id: Uuid) -> Result<Option<Stream>>;
    async fn upsert_idle(
        &self,
        account_id: Uuid,
        settings: &ConfigureStreamRequest,
    ) -> Result<IdleUpsert>;
    async fn update_metadata(
        &self,
        stream_id: Uuid,
        patch: &UpdateStreamRequest,
    ) -> Result<Option<Stream>>;
    async fn set_thumbnail(&self, stream_id: Uuid, url: &str) -> Result<Option<Stream>>;

    // Reads
    async fn get_stream(&self, stream_id: Uuid) -> Result<Option<Stream>>;
    async fn get_stream_details(&self, stream_id: Uuid) -> Result<Option<StreamDetails>>;
    async fn current_for_account(&self, account_id: Uuid) -> Result<Option<Stream>>;
    async fn list_live(&self, category: Option<&str>, limit: i64) -> Result<Vec<StreamDetails>>;

    // Viewer accounting (single-statement atomic counter mutations)
    async fn join_stream(&self, stream_id: Uuid) -> Result<JoinOutcome>;
    async fn leave_stream(&self, stream_id: Uuid) -> Result<Option<i32>>;
}

const STREAM_COLUMNS: &str = "id, account_id, channel_id, title, description, category, \
     thumbnail_url, status, started_at, ended_at, viewer_count, peak_viewers, total_views, \
     duration_seconds, chat_enabled, record_stream, vod_url, created_at, updated_at";

/// Row shape for stream + broadcaster joins
#[derive(sqlx::FromRow)]
struct StreamWithBroadcasterRow {
    #[sqlx(flatten)]
    stream: Stream,
    broadcaster_id: Uuid,
    broadcaster_username: String,
    broadcaster_display_name: Option<String>,
    broadcaster_avatar_url: Option<String>,
}

impl From<StreamWithBroadcasterRow> for StreamDetails {
    fn from(row: StreamWithBroadcasterRow) -> Self {
        StreamDetails {
            stream: row.stream,
            broadcaster: Broadcaster {
                id: row.broadcaster_id,
                username: row.broadcaster_username,
                display_name: row.broadcaster_display_name,
                avatar_url: row.broadcaster_avatar_url,
            },
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Postgres-backed stream store
#[derive(Clone)]
pub struct PgStreamStore {
    pool: PgPool,
}

impl PgStreamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamStore for PgStreamStore {
    async fn stream_key(&self, account_id: Uuid) -> Result<KeyLookup> {
        let row = sqlx::query_scalar::<_, Option<String>>(
            "SELECT stream_key FROM accounts WHERE id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            None => KeyLookup::NoAccount,
            Some(None) => KeyLookup::Missing,
            Some(Some(key)) => KeyLookup::Present(key),
        })
    }

    async fn install_stream_key(&self, account_id: Uuid, key: &str) -> Result<KeyWrite> {
        let result = sqlx::query(
            "UPDATE accounts SET stream_key = $2 WHERE id = $1 AND stream_key IS NULL",
        )
        .bind(account_id)
        .bind(key)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(KeyWrite::Written),
            Ok(_) => Ok(KeyWrite::Skipped),
            Err(err) if is_unique_violation(&err) => Ok(KeyWrite::Collision),
            Err(err) => Err(err.into()),
        }
    }

    async fn replace_stream_key(&self, account_id: Uuid, key: &str) -> Result<KeyWrite> {
        let result = sqlx::query("UPDATE accounts SET stream_key = $2 WHERE id = $1")
            .bind(account_id)
            .bind(key)
            .execute(&self.pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() == 1 => Ok(KeyWrite::Written),
            Ok(_) => Ok(KeyWrite::Skipped),
            Err(err) if is_unique_violation(&err) => Ok(KeyWrite::Collision),
            Err(err) => Err(err.into()),
        }
    }

    async fn account_id_for_key(&self, key: &str) -> Result<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM accounts WHERE stream_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn go_live(&self, account_id: Uuid) -> Result<Option<LiveTransition>> {
        let mut tx = self.pool.begin().await?;

        // Reuse the account's idle slot when one exists.
        let reuse_sql = format!(
            "UPDATE streams SET status = 'live', started_at = NOW(), ended_at = NULL, \
             viewer_count = 0, peak_viewers = 0, duration_seconds = 0, updated_at = NOW() \
             WHERE account_id = $1 AND status = 'idle' \
             RETURNING {STREAM_COLUMNS}"
        );
        let reused = sqlx::query_as::<_, Stream>(&reuse_sql)
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(stream) = reused {
            sqlx::query("UPDATE accounts SET is_live = TRUE WHERE id = $1")
                .bind(account_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(Some(LiveTransition {
                stream,
                newly_live: true,
            }));
        }

        // Idempotent admit: a concurrent caller may have won the transition.
        let sql = format!(
            "SELECT {STREAM_COLUMNS} FROM streams WHERE account_id = $1 AND status = 'live'"
        );
        if let Some(stream) = sqlx::query_as::<_, Stream>(&sql)
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?
        {
            sqlx::query("UPDATE accounts SET is_live = TRUE WHERE id = $1")
                .bind(account_id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(Some(LiveTransition {
                stream,
                newly_live: false,
            }));
        }

        // No slot yet: create one lazily with a title derived from the account.
        let username = sqlx::query_scalar::<_, String>("SELECT username FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(username) = username else {
            return Ok(None);
        };

        let sql = format!(
            "INSERT INTO streams (id, account_id, title, status, started_at) \
             VALUES ($1, $2, $3, 'live', NOW()) \
             ON CONFLICT (account_id) WHERE status <> 'ended' DO NOTHING \
             RETURNING {STREAM_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Stream>(&sql)
            .bind(Uuid::new_v4())
            .bind(account_id)
            .bind(format!("{username}'s live stream"))
            .fetch_optional(&mut *tx)
            .await?;

        let (stream, newly_live) = match inserted {
            Some(stream) => (stream, true),
            None => {
                // Lost the insert race. The winner's row may be an idle slot
                // from a concurrent configure; reuse it before concluding the
                // account is already live.
                if let Some(stream) = sqlx::query_as::<_, Stream>(&reuse_sql)
                    .bind(account_id)
                    .fetch_optional(&mut *tx)
                    .await?
                {
                    (stream, true)
                } else {
                    let sql = format!(
                        "SELECT {STREAM_COLUMNS} FROM streams \
                         WHERE account_id = $1 AND status = 'live'"
                    );
                    let stream = sqlx::query_as::<_, Stream>(&sql)
                        .bind(account_id)
                        .fetch_optional(&mut *tx)
                        .await?
                        .ok_or_else(|| {
                            AppError::Internal("live slot vanished during go-live".to_string())
                        })?;
                    (stream, false)
                }
            }
        };

        sqlx::query("UPDATE accounts SET is_live = TRUE WHERE id = $1")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(LiveTransition { stream, newly_live }))
    }

    async fn end_active(&self, account_id: Uuid) -> Result<Option<Stream>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE streams SET status = 'ended', ended_at = NOW(), viewer_count = 0, \
             duration_seconds = COALESCE(GREATEST(FLOOR(EXTRACT(EPOCH FROM (NOW() - started_at)))::INT, 0), 0), \
             updated_at = NOW() \
             WHERE account_id = $1 AND status = 'live' \
             RETURNING {STREAM_COLUMNS}"
        );
        let ended = sqlx::query_as::<_, Stream>(&sql)
            .bind(account_id)
            .fetch_optional(&mut *tx)
            .await?;

        // Clear the denormalized flag unconditionally so it can never drift
        // from the status column across a partial teardown.
        sqlx::query("UPDATE accounts SET is_live = FALSE WHERE id = $1")
            .bind(account_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(ended)
    }

    async fn finish_stream(&self, stream_id: Uuid) -> Result<Option<Stream>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE streams SET status = 'ended', ended_at = NOW(), viewer_count = 0, \
             duration_seconds = COALESCE(GREATEST(FLOOR(EXTRACT(EPOCH FROM (NOW() - started_at)))::INT, 0), 0), \
             updated_at = NOW() \
             WHERE id = $1 AND status = 'live' \
             RETURNING {STREAM_COLUMNS}"
        );
        let ended = sqlx::query_as::<_, Stream>(&sql)
            .bind(stream_id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(stream) = &ended {
            sqlx::query("UPDATE accounts SET is_live = FALSE WHERE id = $1")
                .bind(stream.account_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(ended)
    }

    async fn upsert_idle(
        &self,
        account_id: Uuid,
        settings: &ConfigureStreamRequest,
    ) -> Result<IdleUpsert> {
        let mut tx = self.pool.begin().await?;

        let update_sql = format!(
            "UPDATE streams SET title = $2, description = $3, category = $4, \
             chat_enabled = COALESCE($5, TRUE), record_stream = COALESCE($6, TRUE), \
             channel_id = $7, updated_at = NOW() \
             WHERE account_id = $1 AND status = 'idle' \
             RETURNING {STREAM_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Stream>(&update_sql)
            .bind(account_id)
            .bind(&settings.title)
            .bind(&settings.description)
            .bind(&settings.category)
            .bind(settings.chat_enabled)
            .bind(settings.record_stream)
            .bind(settings.channel_id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(stream) = updated {
            tx.commit().await?;
            return Ok(IdleUpsert::Applied(stream));
        }

        let sql = format!(
            "INSERT INTO streams (id, account_id, title, description, category, chat_enabled, \
             record_stream, channel_id, status) \
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, TRUE), COALESCE($7, TRUE), $8, 'idle') \
             ON CONFLICT (account_id) WHERE status <> 'ended' DO NOTHING \
             RETURNING {STREAM_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Stream>(&sql)
            .bind(Uuid::new_v4())
            .bind(account_id)
            .bind(&settings.title)
            .bind(&settings.description)
            .bind(&settings.category)
            .bind(settings.chat_enabled)
            .bind(settings.record_stream)
            .bind(settings.channel_id)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(stream) = inserted {
            tx.commit().await?;
            return Ok(IdleUpsert::Applied(stream));
        }

        // Lost the insert race. The conflicting row may be a concurrent
        // configure's idle slot; retry the idle update before concluding the
        // slot is live.
        let updated = sqlx::query_as::<_, Stream>(&update_sql)
            .bind(account_id)
            .bind(&settings.title)
            .bind(&settings.description)
            .bind(&settings.category)
            .bind(settings.chat_enabled)
            .bind(settings.record_stream)
            .bind(settings.channel_id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;

        match updated {
            Some(stream) => Ok(IdleUpsert::Applied(stream)),
            None => Ok(IdleUpsert::CurrentlyLive),
        }
    }

    async fn update_metadata(
        &self,
        stream_id: Uuid,
        patch: &UpdateStreamRequest,
    ) -> Result<Option<Stream>> {
        let sql = format!(
            "UPDATE streams SET title = COALESCE($2, title), \
             description = COALESCE($3, description), \
             category = COALESCE($4, category), \
             chat_enabled = COALESCE($5, chat_enabled), \
             updated_at = NOW() \
             WHERE id = $1 AND status <> 'ended' \
             RETURNING {STREAM_COLUMNS}"
        );
        let stream = sqlx::query_as::<_, Stream>(&sql)
            .bind(stream_id)
            .bind(&patch.title)
            .bind(&patch.description)
            .bind(&patch.category)
            .bind(patch.chat_enabled)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stream)
    }

    async fn set_thumbnail(&self, stream_id: Uuid, url: &str) -> Result<Option<Stream>> {
        let sql = format!(
            "UPDATE streams SET thumbnail_url = $2, updated_at = NOW() \
             WHERE id = $1 AND status <> 'ended' \
             RETURNING {STREAM_COLUMNS}"
        );
        let stream = sqlx::query_as::<_, Stream>(&sql)
            .bind(stream_id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stream)
    }

    async fn get_stream(&self, stream_id: Uuid) -> Result<Option<Stream>> {
        let sql = format!("SELECT {STREAM_COLUMNS} FROM streams WHERE id = $1");
        let stream = sqlx::query_as::<_, Stream>(&sql)
            .bind(stream_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stream)
    }

    async fn get_stream_details(&self, stream_id: Uuid) -> Result<Option<StreamDetails>> {
        let sql = format!(
            "SELECT {}, a.id AS broadcaster_id, a.username AS broadcaster_username, \
             a.display_name AS broadcaster_display_name, a.avatar_url AS broadcaster_avatar_url \
             FROM streams s JOIN accounts a ON a.id = s.account_id \
             WHERE s.id = $1",
            qualified_stream_columns()
        );
        let row = sqlx::query_as::<_, StreamWithBroadcasterRow>(&sql)
            .bind(stream_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(StreamDetails::from))
    }

    async fn current_for_account(&self, account_id: Uuid) -> Result<Option<Stream>> {
        let sql = format!(
            "SELECT {STREAM_COLUMNS} FROM streams \
             WHERE account_id = $1 AND status <> 'ended'"
        );
        let stream = sqlx::query_as::<_, Stream>(&sql)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stream)
    }

    async fn list_live(&self, category: Option<&str>, limit: i64) -> Result<Vec<StreamDetails>> {
        let sql = format!(
            "SELECT {}, a.id AS broadcaster_id, a.username AS broadcaster_username, \
             a.display_name AS broadcaster_display_name, a.avatar_url AS broadcaster_avatar_url \
             FROM streams s JOIN accounts a ON a.id = s.account_id \
             WHERE s.status = 'live' AND ($1::TEXT IS NULL OR s.category = $1) \
             ORDER BY s.viewer_count DESC \
             LIMIT $2",
            qualified_stream_columns()
        );
        let rows = sqlx::query_as::<_, StreamWithBroadcasterRow>(&sql)
            .bind(category)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(StreamDetails::from).collect())
    }

    async fn join_stream(&self, stream_id: Uuid) -> Result<JoinOutcome> {
        // Increment, peak update and total-views bump in one guarded statement
        // so concurrent joins can never lose updates.
        let count = sqlx::query_scalar::<_, i32>(
            "UPDATE streams SET viewer_count = viewer_count + 1, \
             peak_viewers = GREATEST(peak_viewers, viewer_count + 1), \
             total_views = total_views + 1, updated_at = NOW() \
             WHERE id = $1 AND status = 'live' \
             RETURNING viewer_count",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(count) = count {
            return Ok(JoinOutcome::Joined(count));
        }

        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM streams WHERE id = $1)")
                .bind(stream_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(if exists {
            JoinOutcome::NotLive
        } else {
            JoinOutcome::Missing
        })
    }

    async fn leave_stream(&self, stream_id: Uuid) -> Result<Option<i32>> {
        // Floored at zero: unmatched leaves from crashed clients must never
        // drive the gauge negative.
        let count = sqlx::query_scalar::<_, i32>(
            "UPDATE streams SET viewer_count = GREATEST(viewer_count - 1, 0), \
             updated_at = NOW() \
             WHERE id = $1 \
             RETURNING viewer_count",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(count)
    }
}

fn qualified_stream_columns() -> String {
    STREAM_COLUMNS
        .split(", ")
        .map(|col| format!("s.{}", col.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
