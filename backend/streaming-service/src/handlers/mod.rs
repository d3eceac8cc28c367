//! HTTP handlers for Streaming Service
//!
//! This module contains HTTP handlers for:
//! - Stream key management (owner API)
//! - Stream configuration and lifecycle (owner API)
//! - Live discovery and viewer join/leave (public API)
//! - RTMP webhook integration (media server callbacks)

pub mod ingest_hooks;
pub mod live;
pub mod stream_keys;
pub mod streams;

// Re-export handlers for convenience
pub use ingest_hooks::{rtmp_auth, rtmp_done};
pub use live::{get_live_stream, join_stream, leave_stream, list_live_streams};
pub use stream_keys::{get_stream_key, reset_stream_key};
pub use streams::{
    end_stream, get_current_stream, setup_stream, update_stream, upload_thumbnail,
};
