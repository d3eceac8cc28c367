//! Lifecycle state machine: configure, go-live, end, edit.

use crate::support::{services, MemoryStreamStore};
use streaming_service::error::AppError;
use streaming_service::models::{ConfigureStreamRequest, UpdateStreamRequest};
use uuid::Uuid;

fn configure(title: &str, category: Option<&str>) -> ConfigureStreamRequest {
    ConfigureStreamRequest {
        title: title.to_string(),
        description: None,
        category: category.map(str::to_string),
        chat_enabled: None,
        record_stream: None,
        channel_id: None,
    }
}

#[tokio::test]
async fn go_live_reuses_the_configured_idle_slot() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let idle = lifecycle
        .configure_stream(account_id, &configure("Speedrun night", Some("gaming")))
        .await
        .unwrap();
    assert_eq!(idle.status, "idle");
    assert!(idle.started_at.is_none());

    let live = lifecycle.go_live(account_id).await.unwrap();
    assert_eq!(live.id, idle.id);
    assert_eq!(live.title, "Speedrun night");
    assert_eq!(live.status, "live");
    assert!(live.started_at.is_some());
    assert_eq!(live.viewer_count, 0);
}

#[tokio::test]
async fn go_live_without_configuration_creates_a_default_slot() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let live = lifecycle.go_live(account_id).await.unwrap();
    assert_eq!(live.title, "alice's live stream");
    assert_eq!(live.status, "live");
}

#[tokio::test]
async fn go_live_is_idempotent() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let first = lifecycle.go_live(account_id).await.unwrap();
    let second = lifecycle.go_live(account_id).await.unwrap();
    assert_eq!(first.id, second.id);

    // Still exactly one row for the account.
    assert_eq!(store.streams_for_account(account_id).await.len(), 1);
}

#[tokio::test]
async fn go_live_for_unknown_account_is_not_found() {
    let store = MemoryStreamStore::new();
    let (_, lifecycle, _, _) = services(&store);

    let err = lifecycle.go_live(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn owner_end_records_duration_and_clears_the_flag() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let live = lifecycle.go_live(account_id).await.unwrap();
    store.backdate_started_at(live.id, 125).await;

    let ended = lifecycle.end_stream(live.id, account_id).await.unwrap();
    assert_eq!(ended.status, "ended");
    assert!(ended.ended_at.is_some());
    assert_eq!(ended.duration_seconds, 125);
    assert_eq!(ended.viewer_count, 0);
    assert!(!store.account(account_id).await.unwrap().is_live);
}

#[tokio::test]
async fn ending_twice_is_an_invalid_state() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let live = lifecycle.go_live(account_id).await.unwrap();
    lifecycle.end_stream(live.id, account_id).await.unwrap();

    let err = lifecycle.end_stream(live.id, account_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn ending_an_idle_stream_is_an_invalid_state() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let idle = lifecycle
        .configure_stream(account_id, &configure("Soon", None))
        .await
        .unwrap();

    let err = lifecycle.end_stream(idle.id, account_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn only_the_owner_can_end_a_stream() {
    let store = MemoryStreamStore::new();
    let alice = store.add_account("alice").await;
    let mallory = store.add_account("mallory").await;
    let (_, lifecycle, _, _) = services(&store);

    let live = lifecycle.go_live(alice).await.unwrap();

    let err = lifecycle.end_stream(live.id, mallory).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Stream is untouched.
    assert_eq!(store.stream(live.id).await.unwrap().status, "live");
}

#[tokio::test]
async fn configure_while_live_is_refused() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    lifecycle.go_live(account_id).await.unwrap();

    let err = lifecycle
        .configure_stream(account_id, &configure("New title", None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn update_edits_metadata_in_flight() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let live = lifecycle.go_live(account_id).await.unwrap();
    let patch = UpdateStreamRequest {
        title: Some("Now with commentary".to_string()),
        category: Some("irl".to_string()),
        ..Default::default()
    };

    let updated = lifecycle
        .update_stream(live.id, account_id, &patch)
        .await
        .unwrap();
    assert_eq!(updated.title, "Now with commentary");
    assert_eq!(updated.category.as_deref(), Some("irl"));
    // Status and timestamps are untouched by metadata edits.
    assert_eq!(updated.status, "live");
    assert_eq!(updated.started_at, live.started_at);
}

#[tokio::test]
async fn ended_streams_are_immutable() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let live = lifecycle.go_live(account_id).await.unwrap();
    lifecycle.end_stream(live.id, account_id).await.unwrap();

    let patch = UpdateStreamRequest {
        title: Some("Too late".to_string()),
        ..Default::default()
    };
    let err = lifecycle
        .update_stream(live.id, account_id, &patch)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn configuring_after_an_end_starts_a_fresh_slot() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let first = lifecycle.go_live(account_id).await.unwrap();
    lifecycle.end_stream(first.id, account_id).await.unwrap();

    let next = lifecycle
        .configure_stream(account_id, &configure("Round two", None))
        .await
        .unwrap();
    assert_ne!(next.id, first.id);
    assert_eq!(next.status, "idle");

    // The ended row survives as history; only one row is non-ended.
    let rows = store.streams_for_account(account_id).await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.iter().filter(|s| s.status != "ended").count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn go_live_racing_a_configure_never_fails() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let configure_task = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            // Either lands first (idle slot created, then reused by go-live)
            // or loses the race and is refused because the slot is live.
            match lifecycle
                .configure_stream(account_id, &configure("Racing setup", None))
                .await
            {
                Ok(_) | Err(AppError::InvalidState(_)) => {}
                Err(err) => panic!("unexpected configure error: {err}"),
            }
        })
    };
    let go_live_task = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.go_live(account_id).await })
    };

    configure_task.await.unwrap();
    let live = go_live_task.await.unwrap().unwrap();
    assert_eq!(live.status, "live");

    let non_ended = store
        .streams_for_account(account_id)
        .await
        .iter()
        .filter(|s| s.status != "ended")
        .count();
    assert_eq!(non_ended, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_configures_settle_on_one_idle_slot() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let lifecycle = lifecycle.clone();
        tasks.push(tokio::spawn(async move {
            lifecycle
                .configure_stream(account_id, &configure(&format!("Take {i}"), None))
                .await
        }));
    }
    for task in tasks {
        // No configure may be misreported as a live-slot conflict.
        let stream = task.await.unwrap().unwrap();
        assert_eq!(stream.status, "idle");
    }

    let rows = store.streams_for_account(account_id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, "idle");
}

#[tokio::test]
async fn current_stream_returns_the_non_ended_slot() {
    let store = MemoryStreamStore::new();
    let account_id = store.add_account("alice").await;
    let (_, lifecycle, _, _) = services(&store);

    assert!(lifecycle.current_stream(account_id).await.unwrap().is_none());

    let idle = lifecycle
        .configure_stream(account_id, &configure("Soon", None))
        .await
        .unwrap();
    let current = lifecycle.current_stream(account_id).await.unwrap().unwrap();
    assert_eq!(current.id, idle.id);

    lifecycle.go_live(account_id).await.unwrap();
    lifecycle.end_stream(idle.id, account_id).await.unwrap();
    assert!(lifecycle.current_stream(account_id).await.unwrap().is_none());
}
