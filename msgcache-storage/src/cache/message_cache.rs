//! Message cache facade.
//!
//! Composes key normalization, fallback resolution, the message store and
//! the invalidation coordinator behind the operations callers use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use msgcache_core::{
    figure_message, normalize_key, CachedText, FallbackChain, LanguageCode, MessageCacheConfig,
    MessageKey, MsgCacheResult, PageChange,
};

use super::coordinator::{CoordinatorStats, InvalidationCoordinator};
use super::fallback::FallbackResolver;
use super::store::{MessageStore, StoreStats};
use super::traits::{ContentSource, FallbackGraph, Localisation, TransactionContext};

/// Combined statistics of the store and the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageCacheStats {
    pub store: StoreStats,
    pub invalidation: CoordinatorStats,
}

struct CacheInner {
    config: MessageCacheConfig,
    enabled: AtomicBool,
    store: Arc<MessageStore>,
    resolver: FallbackResolver,
    coordinator: Arc<InvalidationCoordinator>,
    localisation: Arc<dyn Localisation>,
}

/// Localized message cache.
///
/// Cheap to clone; clones share one cache. There is no global instance:
/// construct one per composition root, and a fresh one per test.
///
/// # Example
///
/// ```ignore
/// let cache = MessageCache::new(config, source, graph, localisation)?;
///
/// let txn = queue.begin()?;
/// cache.replace("Go", "Allez!", &txn).await?;
/// assert_eq!(cache.get_content("go").await.as_deref(), Some("Allez!"));
/// txn.commit().await?; // resyncs "go" from the content source once
/// ```
#[derive(Clone)]
pub struct MessageCache {
    inner: Arc<CacheInner>,
}

impl MessageCache {
    /// Create a cache from validated configuration and its collaborators.
    pub fn new(
        config: MessageCacheConfig,
        source: Arc<dyn ContentSource>,
        graph: Arc<dyn FallbackGraph>,
        localisation: Arc<dyn Localisation>,
    ) -> MsgCacheResult<Self> {
        config.validate()?;
        let store = Arc::new(MessageStore::new(Arc::clone(&source)));
        let coordinator = Arc::new(InvalidationCoordinator::new(Arc::clone(&store), source));
        let resolver = FallbackResolver::new(graph, config.content_language.clone());
        tracing::debug!(
            content_language = %config.content_language,
            enabled = config.enabled,
            "message cache created"
        );
        Ok(Self {
            inner: Arc::new(CacheInner {
                enabled: AtomicBool::new(config.enabled),
                config,
                store,
                resolver,
                coordinator,
                localisation,
            }),
        })
    }

    pub fn config(&self) -> &MessageCacheConfig {
        &self.inner.config
    }

    pub fn content_language(&self) -> &LanguageCode {
        &self.inner.config.content_language
    }

    /// Serve page customizations again.
    pub fn enable(&self) {
        self.inner.enabled.store(true, Ordering::SeqCst);
    }

    /// Ignore page customizations; only built-in messages are served and
    /// writes are dropped.
    pub fn disable(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Fallback chain probed for `lang`.
    pub fn chain_for(&self, lang: &LanguageCode) -> FallbackChain {
        self.inner.resolver.chain_for(lang)
    }

    /// Look up a message, walking the fallback chain of `lang`.
    ///
    /// For each language of the chain the page customization is tried first
    /// (when `use_database` is set and the cache is enabled), then the
    /// built-in message. A key carrying a language suffix (`name/ru`) is
    /// finally tried in that language. Returns `None` when every candidate
    /// is absent.
    pub async fn get(&self, key: &str, lang: &LanguageCode, use_database: bool) -> Option<String> {
        let key = normalize_key(key);
        if key.is_empty() {
            return None;
        }
        let use_database = use_database && self.is_enabled();
        if use_database {
            self.inner.coordinator.reap_abandoned().await;
        }
        let chain = self.chain_for(lang);

        for code in &chain {
            if use_database {
                if let CachedText::Text(text) = self.inner.store.lookup(&key, code).await {
                    tracing::trace!(%key, requested = %lang, found = %code, "message from page");
                    return Some(text);
                }
            }
            if let Some(text) = self.inner.localisation.message(&key, code) {
                tracing::trace!(%key, requested = %lang, found = %code, "built-in message");
                return Some(text);
            }
        }
        if let Some(text) = self.get_full_key(&key, use_database).await {
            return Some(text);
        }
        tracing::trace!(%key, requested = %lang, "message not found");
        None
    }

    /// A key such as `name/ru` names its language; it is served from that
    /// language only, after the chain came up empty.
    async fn get_full_key(&self, key: &MessageKey, use_database: bool) -> Option<String> {
        if !key.as_str().contains('/') {
            return None;
        }
        let (base, code) = figure_message(key.as_str(), self.content_language()).ok()?;
        if base == *key {
            // Suffix is not a language code.
            return None;
        }
        if use_database {
            if let CachedText::Text(text) = self.inner.store.lookup(&base, &code).await {
                return Some(text);
            }
        }
        self.inner.localisation.message(&base, &code)
    }

    /// Look up a message in the content language.
    pub async fn get_content(&self, key: &str) -> Option<String> {
        let lang = self.content_language().clone();
        self.get(key, &lang, true).await
    }

    /// Page customization for exactly one language; no fallback, no
    /// built-in messages.
    pub async fn get_msg_from_namespace(&self, key: &str, lang: &LanguageCode) -> Option<String> {
        let key = normalize_key(key);
        if key.is_empty() {
            return None;
        }
        self.inner.coordinator.reap_abandoned().await;
        self.inner.store.lookup(&key, lang).await.into_option()
    }

    /// Record an edit of the message page `title` (`Go`, `Go/ru`).
    ///
    /// The new text is visible to this process at once; the authoritative
    /// resync runs after `txn` commits, or immediately if `txn` is not open.
    pub async fn replace(
        &self,
        title: &str,
        text: &str,
        txn: &dyn TransactionContext,
    ) -> MsgCacheResult<()> {
        self.apply(title, CachedText::from(text), txn).await
    }

    /// Record the deletion of the message page `title`.
    pub async fn delete(&self, title: &str, txn: &dyn TransactionContext) -> MsgCacheResult<()> {
        self.apply(title, CachedText::Absent, txn).await
    }

    /// Entry point for page-change notifications.
    pub async fn on_page_change(
        &self,
        change: &PageChange,
        txn: &dyn TransactionContext,
    ) -> MsgCacheResult<()> {
        self.apply(&change.title, CachedText::from(change.text.clone()), txn)
            .await
    }

    /// Populate the configured preload languages.
    /// Returns how many are loaded afterwards.
    pub async fn warm(&self) -> usize {
        let mut loaded = 0;
        for lang in &self.inner.config.preload_languages {
            if self.inner.store.preload(lang).await {
                loaded += 1;
            }
        }
        loaded
    }

    /// Drop all cached languages and memoized chains.
    ///
    /// Pending resyncs stay registered with their transactions, and their
    /// uncommitted writes are re-applied, so writers keep reading them.
    pub async fn clear(&self) {
        self.inner.coordinator.clear_store().await;
        self.inner.resolver.clear();
    }

    /// Entries written in transactions that have not finished yet.
    pub async fn pending_count(&self) -> usize {
        self.inner.coordinator.pending_count().await
    }

    pub async fn stats(&self) -> MessageCacheStats {
        MessageCacheStats {
            store: self.inner.store.stats().await,
            invalidation: self.inner.coordinator.stats().await,
        }
    }

    async fn apply(
        &self,
        title: &str,
        text: CachedText,
        txn: &dyn TransactionContext,
    ) -> MsgCacheResult<()> {
        let (key, lang) = figure_message(title, self.content_language())?;
        if !self.is_enabled() {
            tracing::debug!(%key, %lang, "message cache disabled, ignoring page change");
            return Ok(());
        }
        self.inner.coordinator.replace(key, lang, text, txn).await
    }
}

impl std::fmt::Debug for MessageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageCache")
            .field("content_language", self.content_language())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::deferred::AutoCommit;
    use crate::cache::memory::{InMemoryContentSource, InMemoryLocalisation, StaticFallbackGraph};

    fn lang(code: &str) -> LanguageCode {
        LanguageCode::parse(code).unwrap()
    }

    fn cache_with(source: Arc<InMemoryContentSource>, config: MessageCacheConfig) -> MessageCache {
        let graph = StaticFallbackGraph::new().with_fallbacks(lang("ab"), vec![lang("ru")]);
        let localisation = InMemoryLocalisation::new().with_message(lang("de"), "go", "Ausführen");
        MessageCache::new(config, source, Arc::new(graph), Arc::new(localisation)).unwrap()
    }

    #[tokio::test]
    async fn test_get_normalizes_key() {
        let source = Arc::new(InMemoryContentSource::new(lang("de")));
        source.put_page("Foo bar/ru", "ru value").unwrap();
        let cache = cache_with(source, MessageCacheConfig::new(lang("de")));

        assert_eq!(cache.get("Foo bar", &lang("ab"), true).await.as_deref(), Some("ru value"));
        assert_eq!(cache.get("foo_bar", &lang("ab"), true).await.as_deref(), Some("ru value"));
        assert_eq!(cache.get("", &lang("ab"), true).await, None);
    }

    #[tokio::test]
    async fn test_full_key_names_its_language() {
        let source = Arc::new(InMemoryContentSource::new(lang("de")));
        source.put_page("FullKey/ab", "ab").unwrap();
        source.put_page("FullKey/ru", "ru").unwrap();
        let cache = cache_with(source, MessageCacheConfig::new(lang("de")));

        assert_eq!(cache.get("FullKey/ru", &lang("ab"), true).await.as_deref(), Some("ru"));
        assert_eq!(cache.get("FullKey/ab", &lang("de"), true).await.as_deref(), Some("ab"));
        assert_eq!(cache.get("FullKey/not a code", &lang("ab"), true).await, None);
    }

    #[tokio::test]
    async fn test_use_database_false_serves_built_in() {
        let source = Arc::new(InMemoryContentSource::new(lang("de")));
        source.put_page("Go", "Los").unwrap();
        let cache = cache_with(source.clone(), MessageCacheConfig::new(lang("de")));

        assert_eq!(cache.get_content("go").await.as_deref(), Some("Los"));
        assert_eq!(cache.get("go", &lang("de"), false).await.as_deref(), Some("Ausführen"));
    }

    #[tokio::test]
    async fn test_disabled_cache_ignores_pages_and_writes() {
        let source = Arc::new(InMemoryContentSource::new(lang("de")));
        source.put_page("Go", "Los").unwrap();
        let cache = cache_with(
            source.clone(),
            MessageCacheConfig::new(lang("de")).with_enabled(false),
        );

        assert!(!cache.is_enabled());
        assert_eq!(cache.get_content("go").await.as_deref(), Some("Ausführen"));
        cache.replace("Go", "Allez!", &AutoCommit).await.unwrap();
        assert_eq!(cache.stats().await.invalidation.replaces, 0);
        assert_eq!(source.load_calls(), 0);

        cache.enable();
        assert_eq!(cache.get_content("go").await.as_deref(), Some("Los"));
    }

    #[tokio::test]
    async fn test_replace_rejects_empty_title() {
        let source = Arc::new(InMemoryContentSource::new(lang("de")));
        let cache = cache_with(source, MessageCacheConfig::new(lang("de")));
        assert!(cache.replace("", "x", &AutoCommit).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_makes_message_absent() {
        let source = Arc::new(InMemoryContentSource::new(lang("de")));
        source.put_page("Custom/ru", "value").unwrap();
        let cache = cache_with(source.clone(), MessageCacheConfig::new(lang("de")));
        assert_eq!(cache.get_msg_from_namespace("Custom", &lang("ru")).await.as_deref(), Some("value"));

        source.delete_page("Custom/ru").unwrap();
        cache.delete("Custom/ru", &AutoCommit).await.unwrap();
        assert_eq!(cache.get_msg_from_namespace("Custom", &lang("ru")).await, None);
    }

    #[tokio::test]
    async fn test_warm_populates_preload_languages() {
        let source = Arc::new(InMemoryContentSource::new(lang("de")));
        let cache = cache_with(
            source.clone(),
            MessageCacheConfig::new(lang("de")).with_preload_languages(vec![lang("de"), lang("ru")]),
        );
        assert_eq!(cache.warm().await, 2);
        assert_eq!(source.load_calls(), 2);
        assert_eq!(cache.stats().await.store.loaded_languages, 2);

        cache.clear().await;
        assert_eq!(cache.stats().await.store.loaded_languages, 0);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let source = Arc::new(InMemoryContentSource::new(lang("de")));
        let cache = cache_with(source.clone(), MessageCacheConfig::new(lang("de")));
        let other = cache.clone();

        source.put_page("Go", "Los").unwrap();
        cache.replace("Go", "Los", &AutoCommit).await.unwrap();
        assert_eq!(other.get_content("go").await.as_deref(), Some("Los"));
        other.disable();
        assert!(!cache.is_enabled());
    }
}
