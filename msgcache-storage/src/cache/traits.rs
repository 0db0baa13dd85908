//! Collaborator traits consumed by the message cache.
//!
//! The cache does not own page storage, the fallback graph, built-in
//! localisation or transaction dispatch. Each is reached through one of the
//! traits below so that any backend can be plugged in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use msgcache_core::{LanguageCode, MessageKey, MsgCacheResult, TransactionEpoch};

/// Authoritative source of message page content.
///
/// # Implementation Requirements
///
/// - `load_language` returns every customized message of one language; keys
///   missing from the result are treated as known-absent
/// - `fetch` reads exactly one message and must reflect committed writes
/// - both may block on I/O; the cache never holds a lock across them
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Load all messages stored for a language.
    async fn load_language(&self, lang: &LanguageCode)
        -> MsgCacheResult<HashMap<MessageKey, String>>;

    /// Read one message. `Ok(None)` means the page does not exist.
    async fn fetch(&self, key: &MessageKey, lang: &LanguageCode) -> MsgCacheResult<Option<String>>;
}

/// Language fallback graph.
pub trait FallbackGraph: Send + Sync {
    /// Direct fallbacks of `lang`, highest priority first.
    fn fallbacks_for(&self, lang: &LanguageCode) -> Vec<LanguageCode>;
}

/// Built-in (shipped) messages, consulted after page customizations.
pub trait Localisation: Send + Sync {
    fn message(&self, key: &MessageKey, lang: &LanguageCode) -> Option<String>;
}

/// Work that must only run once the enclosing transaction has committed.
#[async_trait]
pub trait DeferredUpdate: Send + Sync {
    /// Run the update. Failures are handled by the update itself.
    async fn run(&self);

    /// Called instead of `run` when the transaction rolls back.
    async fn cancel(&self) {}

    /// Called instead of `run` when the transaction is dropped while open.
    /// Runs inside `Drop`, so it must not block or await.
    fn abandon(&self) {}

    /// Short label used in logs.
    fn describe(&self) -> String;
}

/// Commit-gating primitive passed into every write.
///
/// When no transaction is open, `on_commit` must run the update before it
/// returns.
#[async_trait]
pub trait TransactionContext: Send + Sync {
    /// True while the transaction can still accept deferred work.
    fn is_open(&self) -> bool;

    /// Epoch of the transaction, `None` for auto-commit contexts.
    fn epoch(&self) -> Option<TransactionEpoch>;

    /// Schedule `update` for after commit, or run it now if nothing is open.
    async fn on_commit(&self, update: Arc<dyn DeferredUpdate>) -> MsgCacheResult<()>;
}
