//! Streaming Service
//!
//! Microservice for live broadcasting: stream keys, RTMP ingest admission,
//! the idle/live/ended stream lifecycle, viewer accounting and discovery.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
