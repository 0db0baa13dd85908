//! MSGCACHE Storage - Message Store and Invalidation
//!
//! Runtime side of the message cache: the per-language store, fallback
//! resolution, the transaction-aware invalidation coordinator and the
//! [`MessageCache`] facade. Key and title handling live in msgcache-core.

pub mod cache;

// Re-export cache types for embedders
pub use cache::{
    AutoCommit, CommitReport, ContentSource, CoordinatorStats, DeferredUpdate,
    DeferredUpdateQueue, FallbackGraph, FallbackResolver, InMemoryContentSource,
    InMemoryLocalisation, InvalidationCoordinator, Localisation, MessageCache, MessageCacheStats,
    MessageStore, StaticFallbackGraph, StoreStats, Transaction, TransactionContext,
};

pub use msgcache_core::{
    normalize_key, CachedText, LanguageCode, MessageCacheConfig, MessageKey, MsgCacheError,
    MsgCacheResult, PageChange,
};
