//! Service Layer for Streaming Service
//!
//! This module contains business logic for streaming operations:
//! - Stream key issuance and reset
//! - Ingest admission (RTMP publish gate)
//! - Stream lifecycle management (idle -> live -> ended)
//! - Viewer accounting
//! - Thumbnail storage

pub mod ingest;
pub mod lifecycle;
pub mod stream_keys;
pub mod thumbnails;
pub mod viewers;

// Re-export commonly used types
pub use ingest::IngestGate;
pub use lifecycle::LifecycleService;
pub use stream_keys::StreamKeyService;
pub use thumbnails::ThumbnailStorage;
pub use viewers::ViewerService;
