//! In-memory collaborators.
//!
//! Reference implementations of [`ContentSource`], [`FallbackGraph`] and
//! [`Localisation`], used by tests and by embedders without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use msgcache_core::{
    figure_message, LanguageCode, MessageKey, MsgCacheError, MsgCacheResult, SourceError,
};

use super::traits::{ContentSource, FallbackGraph, Localisation};

type Pages = HashMap<LanguageCode, HashMap<MessageKey, String>>;

/// Message pages held in memory, addressed by page title.
///
/// Writes are durable as soon as they are made. The source can be switched
/// off with [`set_available`](Self::set_available) to simulate an outage.
#[derive(Debug)]
pub struct InMemoryContentSource {
    content_language: LanguageCode,
    pages: RwLock<Pages>,
    available: AtomicBool,
    load_calls: AtomicU64,
    fetch_calls: AtomicU64,
}

impl InMemoryContentSource {
    pub fn new(content_language: LanguageCode) -> Self {
        Self {
            content_language,
            pages: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            load_calls: AtomicU64::new(0),
            fetch_calls: AtomicU64::new(0),
        }
    }

    /// Create or overwrite the page `title` (`Go`, `Go/ru`).
    pub fn put_page(&self, title: &str, text: impl Into<String>) -> MsgCacheResult<()> {
        let (key, lang) = figure_message(title, &self.content_language)?;
        self.pages_mut()?
            .entry(lang)
            .or_default()
            .insert(key, text.into());
        Ok(())
    }

    /// Delete the page `title`. Returns true if it existed.
    pub fn delete_page(&self, title: &str) -> MsgCacheResult<bool> {
        let (key, lang) = figure_message(title, &self.content_language)?;
        Ok(self
            .pages_mut()?
            .get_mut(&lang)
            .and_then(|messages| messages.remove(&key))
            .is_some())
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of `load_language` calls served so far.
    pub fn load_calls(&self) -> u64 {
        self.load_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn pages_mut(&self) -> MsgCacheResult<std::sync::RwLockWriteGuard<'_, Pages>> {
        self.pages.write().map_err(|_| poisoned())
    }

    fn pages(&self) -> MsgCacheResult<std::sync::RwLockReadGuard<'_, Pages>> {
        self.pages.read().map_err(|_| poisoned())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

fn poisoned() -> MsgCacheError {
    MsgCacheError::Source(SourceError::Unavailable {
        reason: "page lock poisoned".to_string(),
    })
}

#[async_trait]
impl ContentSource for InMemoryContentSource {
    async fn load_language(
        &self,
        lang: &LanguageCode,
    ) -> MsgCacheResult<HashMap<MessageKey, String>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_available() {
            return Err(SourceError::LoadFailed {
                lang: lang.clone(),
                reason: "content source unavailable".to_string(),
            }
            .into());
        }
        Ok(self.pages()?.get(lang).cloned().unwrap_or_default())
    }

    async fn fetch(&self, key: &MessageKey, lang: &LanguageCode) -> MsgCacheResult<Option<String>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_available() {
            return Err(SourceError::FetchFailed {
                key: key.clone(),
                lang: lang.clone(),
                reason: "content source unavailable".to_string(),
            }
            .into());
        }
        Ok(self
            .pages()?
            .get(lang)
            .and_then(|messages| messages.get(key))
            .cloned())
    }
}

/// Fixed fallback graph.
#[derive(Debug, Clone, Default)]
pub struct StaticFallbackGraph {
    edges: HashMap<LanguageCode, Vec<LanguageCode>>,
}

impl StaticFallbackGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the direct fallbacks of `lang`, highest priority first.
    pub fn with_fallbacks(mut self, lang: LanguageCode, fallbacks: Vec<LanguageCode>) -> Self {
        self.edges.insert(lang, fallbacks);
        self
    }
}

impl FallbackGraph for StaticFallbackGraph {
    fn fallbacks_for(&self, lang: &LanguageCode) -> Vec<LanguageCode> {
        self.edges.get(lang).cloned().unwrap_or_default()
    }
}

/// Built-in messages held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLocalisation {
    messages: HashMap<(LanguageCode, MessageKey), String>,
}

impl InMemoryLocalisation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, lang: LanguageCode, key: &str, text: impl Into<String>) -> Self {
        self.messages.insert((lang, MessageKey::new(key)), text.into());
        self
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Localisation for InMemoryLocalisation {
    fn message(&self, key: &MessageKey, lang: &LanguageCode) -> Option<String> {
        self.messages.get(&(lang.clone(), key.clone())).cloned()
    }
}
