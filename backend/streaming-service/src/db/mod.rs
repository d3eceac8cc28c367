/// Database access layer
///
/// The streaming state (streams table plus the denormalized account live
/// flag and stream keys) sits behind the `StreamStore` trait so the service
/// layer can run against Postgres in production and an in-memory store in
/// tests. Every mutation the Postgres implementation performs is a single
/// guarded SQL statement, or one transaction where the stream status and
/// the account's `is_live` flag must move in lockstep.
pub mod stream_store;

pub use stream_store::{
    DynStreamStore, IdleUpsert, JoinOutcome, KeyLookup, KeyWrite, LiveTransition, PgStreamStore,
    StreamStore,
};
