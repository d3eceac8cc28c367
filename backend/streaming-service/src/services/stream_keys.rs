//! Stream key issuance
//!
//! Each account carries at most one opaque stream key used to authenticate
//! RTMP publish attempts. Keys are 20 random bytes, hex-encoded, unique
//! across all accounts; resetting invalidates the previous key immediately.

use crate::db::{DynStreamStore, KeyLookup, KeyWrite};
use crate::error::{AppError, Result};
use rand::RngCore;
use tracing::info;
use uuid::Uuid;

const STREAM_KEY_BYTES: usize = 20;

/// A unique-constraint collision triggers a fresh draw up to this many times.
const MAX_GENERATION_ATTEMPTS: usize = 3;

/// Generate a cryptographically random stream key (40 hex chars)
pub fn generate_stream_key() -> String {
    let mut bytes = [0u8; STREAM_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Clone)]
pub struct StreamKeyService {
    store: DynStreamStore,
}

impl StreamKeyService {
    pub fn new(store: DynStreamStore) -> Self {
        Self { store }
    }

    /// Return the account's key, generating and persisting one if absent
    pub async fn get_or_create(&self, account_id: Uuid) -> Result<String> {
        match self.store.stream_key(account_id).await? {
            KeyLookup::Present(key) => return Ok(key),
            KeyLookup::NoAccount => {
                return Err(AppError::NotFound("Account not found".to_string()))
            }
            KeyLookup::Missing => {}
        }

        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let key = generate_stream_key();
            match self.store.install_stream_key(account_id, &key).await? {
                KeyWrite::Written => {
                    info!(%account_id, "issued new stream key");
                    return Ok(key);
                }
                KeyWrite::Collision => continue,
                KeyWrite::Skipped => {
                    // A concurrent request installed a key first; use theirs.
                    if let KeyLookup::Present(existing) = self.store.stream_key(account_id).await? {
                        return Ok(existing);
                    }
                    return Err(AppError::NotFound("Account not found".to_string()));
                }
            }
        }

        Err(AppError::Internal(
            "could not generate a unique stream key".to_string(),
        ))
    }

    /// Rotate the account's key; the old key stops admitting ingest at once
    pub async fn reset(&self, account_id: Uuid) -> Result<String> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let key = generate_stream_key();
            match self.store.replace_stream_key(account_id, &key).await? {
                KeyWrite::Written => {
                    info!(%account_id, "stream key reset");
                    return Ok(key);
                }
                KeyWrite::Collision => continue,
                KeyWrite::Skipped => {
                    return Err(AppError::NotFound("Account not found".to_string()))
                }
            }
        }

        Err(AppError::Internal(
            "could not generate a unique stream key".to_string(),
        ))
    }
}
