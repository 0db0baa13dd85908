//! Per-language message store.
//!
//! The store holds one slot per language. A slot is populated from the
//! [`ContentSource`] the first time any of its messages is looked up; after
//! that every lookup is answered from memory, including lookups of messages
//! that do not exist (cached as [`CachedText::Absent`]).
//!
//! Writes land in memory immediately. Only the invalidation coordinator in
//! this crate may write; readers outside the crate go through lookups.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use msgcache_core::{CachedText, LanguageCode, MessageKey, Timestamp};
use tokio::sync::RwLock;

use super::traits::ContentSource;

/// Statistics about store usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Lookups answered from memory.
    pub hits: u64,
    /// Lookups that had to go to the content source.
    pub misses: u64,
    /// Successful whole-language populations.
    pub populations: u64,
    /// Single-message reads of stale entries.
    pub point_fetches: u64,
    /// Failed reads against the content source.
    pub source_failures: u64,
    /// In-process overwrites.
    pub writes: u64,
    /// Languages currently populated.
    pub loaded_languages: u64,
    /// Entries held across all languages.
    pub entry_count: u64,
}

impl StoreStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    populations: AtomicU64,
    point_fetches: AtomicU64,
    source_failures: AtomicU64,
    writes: AtomicU64,
}

#[derive(Debug, Default)]
struct LanguageSlot {
    /// Set once the whole language has been read from the source.
    loaded_at: Option<Timestamp>,
    entries: HashMap<MessageKey, CachedText>,
    /// Entries that must be re-read before they are trusted again.
    stale: HashSet<MessageKey>,
}

impl LanguageSlot {
    fn is_loaded(&self) -> bool {
        self.loaded_at.is_some()
    }
}

enum Probe {
    Hit(CachedText),
    Stale,
    Unloaded,
}

/// Mapping of (language, key) to cached text.
pub struct MessageStore {
    source: Arc<dyn ContentSource>,
    languages: RwLock<HashMap<LanguageCode, LanguageSlot>>,
    counters: Counters,
}

impl MessageStore {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self {
            source,
            languages: RwLock::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Look up one message in one language.
    ///
    /// Populates the language on first use. Never fails: if the source is
    /// unreachable the last known value is returned, or `Absent` if there is
    /// none.
    pub async fn lookup(&self, key: &MessageKey, lang: &LanguageCode) -> CachedText {
        match self.probe(key, lang).await {
            Probe::Hit(text) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(%key, %lang, "message store hit");
                return text;
            }
            Probe::Stale => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                return self.refresh(key, lang).await;
            }
            Probe::Unloaded => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.populate(lang).await;
        match self.probe(key, lang).await {
            Probe::Hit(text) => text,
            Probe::Stale => self.refresh(key, lang).await,
            // Population failed; try again on the next lookup.
            Probe::Unloaded => CachedText::Absent,
        }
    }

    /// Returns true if the language has been populated.
    pub async fn is_loaded(&self, lang: &LanguageCode) -> bool {
        self.languages
            .read()
            .await
            .get(lang)
            .is_some_and(LanguageSlot::is_loaded)
    }

    /// Languages populated so far.
    pub async fn loaded_languages(&self) -> Vec<LanguageCode> {
        self.languages
            .read()
            .await
            .iter()
            .filter(|(_, slot)| slot.is_loaded())
            .map(|(lang, _)| lang.clone())
            .collect()
    }

    /// Populate a language ahead of its first lookup.
    /// Returns true if the language is loaded afterwards.
    pub async fn preload(&self, lang: &LanguageCode) -> bool {
        if !self.is_loaded(lang).await {
            self.populate(lang).await;
        }
        self.is_loaded(lang).await
    }

    /// Drop every cached language.
    pub async fn clear(&self) {
        self.languages.write().await.clear();
        tracing::debug!("message store cleared");
    }

    /// Get store statistics.
    pub async fn stats(&self) -> StoreStats {
        let languages = self.languages.read().await;
        StoreStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            populations: self.counters.populations.load(Ordering::Relaxed),
            point_fetches: self.counters.point_fetches.load(Ordering::Relaxed),
            source_failures: self.counters.source_failures.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            loaded_languages: languages.values().filter(|s| s.is_loaded()).count() as u64,
            entry_count: languages.values().map(|s| s.entries.len() as u64).sum(),
        }
    }

    /// Overwrite one entry in process. Visible to every later lookup.
    pub(crate) async fn write(&self, key: &MessageKey, lang: &LanguageCode, text: CachedText) {
        let mut languages = self.languages.write().await;
        let slot = languages.entry(lang.clone()).or_default();
        slot.stale.remove(key);
        slot.entries.insert(key.clone(), text);
        self.counters.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Stop trusting one entry; the next lookup re-reads it from the source.
    pub(crate) async fn mark_stale(&self, key: &MessageKey, lang: &LanguageCode) {
        let mut languages = self.languages.write().await;
        languages
            .entry(lang.clone())
            .or_default()
            .stale
            .insert(key.clone());
    }

    async fn probe(&self, key: &MessageKey, lang: &LanguageCode) -> Probe {
        let languages = self.languages.read().await;
        let Some(slot) = languages.get(lang) else {
            return Probe::Unloaded;
        };
        if slot.stale.contains(key) {
            return Probe::Stale;
        }
        match slot.entries.get(key) {
            Some(text) => Probe::Hit(text.clone()),
            None if slot.is_loaded() => Probe::Hit(CachedText::Absent),
            None => Probe::Unloaded,
        }
    }

    async fn populate(&self, lang: &LanguageCode) {
        // The source is read without holding the lock.
        let loaded = match self.source.load_language(lang).await {
            Ok(loaded) => loaded,
            Err(e) => {
                self.counters.source_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%lang, error = %e, "failed to populate language");
                return;
            }
        };

        let mut languages = self.languages.write().await;
        let slot = languages.entry(lang.clone()).or_default();
        if slot.is_loaded() {
            // Another lookup finished populating first.
            return;
        }

        // Stale entries take the freshly loaded value; other in-process
        // writes made before population are kept.
        for key in std::mem::take(&mut slot.stale) {
            slot.entries.remove(&key);
        }
        let count = loaded.len();
        for (key, text) in loaded {
            slot.entries.entry(key).or_insert(CachedText::Text(text));
        }
        slot.loaded_at = Some(Utc::now());
        self.counters.populations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(%lang, count, "populated language");
    }

    async fn refresh(&self, key: &MessageKey, lang: &LanguageCode) -> CachedText {
        match self.source.fetch(key, lang).await {
            Ok(fetched) => {
                let text = CachedText::from(fetched);
                let mut languages = self.languages.write().await;
                let slot = languages.entry(lang.clone()).or_default();
                slot.stale.remove(key);
                slot.entries.insert(key.clone(), text.clone());
                self.counters.point_fetches.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%key, %lang, "refreshed stale entry");
                text
            }
            Err(e) => {
                self.counters.source_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%key, %lang, error = %e, "failed to refresh stale entry");
                self.languages
                    .read()
                    .await
                    .get(lang)
                    .and_then(|slot| slot.entries.get(key).cloned())
                    .unwrap_or(CachedText::Absent)
            }
        }
    }
}

impl std::fmt::Debug for MessageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStore")
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}
