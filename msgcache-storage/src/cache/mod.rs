//! Message cache with commit-gated invalidation.
//!
//! Lookups walk a language's fallback chain and are answered from a
//! per-language store that is populated lazily from a [`ContentSource`].
//! Edits are visible to the writing process at once, and reconciled with the
//! content source only after the surrounding transaction commits.
//!
//! # Consistency
//!
//! A write made inside a transaction is provisional. The store serves it so
//! the writer reads its own write, but the authoritative value is read back
//! exactly once per committed transaction and key. A rolled back write is
//! never trusted again: the entry is re-read from the source on next use.
//!
//! # Example
//!
//! ```ignore
//! let queue = DeferredUpdateQueue::new();
//! let txn = queue.begin()?;
//! cache.replace("Go/ru", "Вперёд", &txn).await?;
//! txn.commit().await?;
//!
//! let text = cache.get("go", &LanguageCode::parse("ab")?, true).await;
//! ```

pub mod coordinator;
pub mod deferred;
pub mod fallback;
pub mod memory;
pub mod message_cache;
pub mod store;
pub mod traits;

pub use coordinator::{CoordinatorStats, InvalidationCoordinator};
pub use deferred::{AutoCommit, CommitReport, DeferredUpdateQueue, Transaction};
pub use fallback::FallbackResolver;
pub use memory::{InMemoryContentSource, InMemoryLocalisation, StaticFallbackGraph};
pub use message_cache::{MessageCache, MessageCacheStats};
pub use store::{MessageStore, StoreStats};
pub use traits::{ContentSource, DeferredUpdate, FallbackGraph, Localisation, TransactionContext};
