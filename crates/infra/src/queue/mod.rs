//! Redis-backed time-indexed queue and per-key metadata.
//!
//! ## Key layout (per namespace `ns`)
//!
//! - `{ns}`: sorted set, member = entry key, score = due unix seconds
//! - `{ns}:seq`: hash, entry key -> insertion sequence (tie ordering)
//! - `{ns}:seq_counter`: string counter feeding `{ns}:seq`
//! - `{ns}:meta:{key}`: hash of metadata fields for one entry

#[cfg(feature = "redis")]
pub mod redis_hash;
#[cfg(feature = "redis")]
pub mod redis_sorted_set;

#[cfg(feature = "redis")]
pub use redis_hash::RedisMetadataStore;
#[cfg(feature = "redis")]
pub use redis_sorted_set::RedisTimeIndexedQueue;

/// Namespace of the card delivery queue.
pub const CARD_DELIVERY_NAMESPACE: &str = "fleetpay:card_delivery";

/// Namespace of the statement generation queue.
pub const STATEMENT_NAMESPACE: &str = "fleetpay:statements";

#[cfg(feature = "redis")]
pub(crate) fn map_redis_error(
    operation: &str,
    err: redis::RedisError,
) -> fleetpay_scheduler::QueueError {
    use fleetpay_scheduler::QueueError;

    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
        QueueError::Unavailable(format!("redis {operation}: {err}"))
    } else {
        QueueError::Storage(format!("redis {operation}: {err}"))
    }
}
