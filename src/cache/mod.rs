//! In-memory response cache.
//!
//! # Data Flow
//! ```text
//! Request handler (cache miss, origin closed cleanly)
//!     → store.rs insert (evict least recently used until the entry fits)
//!     → entry.rs CacheEntry linked into the collection
//!
//! Request handler (new request)
//!     → store.rs lookup (refresh last access on hit)
//!     → CachedResponse streamed back to the client
//! ```
//!
//! # Design Decisions
//! - One mutex guards the whole collection; lookups and mutations never interleave
//! - Eviction scans for the smallest last-access tick (true LRU, O(n))
//! - Keys are the raw request bytes, never normalized
//! - No TTL: entries leave only through eviction

pub mod entry;
pub mod store;

pub use entry::{CacheEntry, CachedResponse};
pub use store::{CacheStats, InsertOutcome, ResponseCache};
