//! Commit-gated invalidation of cached messages.
//!
//! A message page edit moves its (key, language) entry through
//! `Clean -> Dirty -> Clean`:
//!
//! 1. [`InvalidationCoordinator::replace`] overwrites the store at once, so
//!    the writer reads its own write, and records a [`PendingInvalidation`].
//!    The first write per (key, language, transaction) registers a resync
//!    with the transaction; later writes in the same transaction only replace
//!    the pending text.
//! 2. The resync runs after commit: it reads the content source and stores
//!    the authoritative value. Exactly one resync runs per committed
//!    transaction and key. A resync never overwrites an entry that another
//!    open transaction has written.
//! 3. On rollback the resync is cancelled and the entry is marked stale, so
//!    the next lookup reads the durable value instead of the discarded write.
//!    A transaction dropped while open is treated the same way; its
//!    registrations are reaped before the next coordinator operation.
//!
//! Without an open transaction the resync runs before `replace` returns.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use msgcache_core::{
    CachedText, InvariantViolation, LanguageCode, MessageKey, MsgCacheResult,
    PendingInvalidation, TransactionEpoch,
};
use tokio::sync::Mutex;

use super::store::MessageStore;
use super::traits::{ContentSource, DeferredUpdate, TransactionContext};

type EntryId = (MessageKey, LanguageCode);
type Registration = (MessageKey, LanguageCode, TransactionEpoch);

/// Statistics about invalidation activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Writes received.
    pub replaces: u64,
    /// Writes merged into an existing registration.
    pub coalesced: u64,
    /// Resyncs that stored an authoritative value.
    pub resyncs: u64,
    /// Resyncs whose source read failed.
    pub failed_resyncs: u64,
    /// Resyncs skipped because another transaction holds a newer write.
    pub superseded: u64,
    /// Registrations cancelled by rollback or by dropping the transaction.
    pub rolled_back: u64,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    /// Latest uncommitted write per entry.
    pending: HashMap<EntryId, PendingInvalidation>,
    /// Live commit registrations.
    registered: HashSet<Registration>,
    stats: CoordinatorStats,
}

/// Drives in-process writes and their post-commit resyncs.
pub struct InvalidationCoordinator {
    store: Arc<MessageStore>,
    source: Arc<dyn ContentSource>,
    /// Also serializes every transition, resyncs included.
    state: Mutex<CoordinatorState>,
    /// Registrations of transactions dropped while open. Filled from `Drop`.
    abandoned: std::sync::Mutex<Vec<Registration>>,
}

impl InvalidationCoordinator {
    pub fn new(store: Arc<MessageStore>, source: Arc<dyn ContentSource>) -> Self {
        Self {
            store,
            source,
            state: Mutex::new(CoordinatorState::default()),
            abandoned: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Apply a write to (key, lang) and schedule its resync on `txn`.
    pub async fn replace(
        self: &Arc<Self>,
        key: MessageKey,
        lang: LanguageCode,
        text: CachedText,
        txn: &dyn TransactionContext,
    ) -> MsgCacheResult<()> {
        self.reap_abandoned().await;
        let open_epoch = txn.epoch().filter(|_| txn.is_open());

        let mut state = self.state.lock().await;
        self.store.write(&key, &lang, text.clone()).await;
        state.stats.replaces += 1;

        let Some(epoch) = open_epoch else {
            tracing::debug!(%key, %lang, "no open transaction, resyncing now");
            self.resync(&mut state, &key, &lang).await;
            return Ok(());
        };

        let entry: EntryId = (key.clone(), lang.clone());
        let registration: Registration = (key.clone(), lang.clone(), epoch);
        state
            .pending
            .insert(entry.clone(), PendingInvalidation::new(key.clone(), lang.clone(), text, epoch));

        if state.registered.contains(&registration) {
            state.stats.coalesced += 1;
            tracing::trace!(%key, %lang, %epoch, "coalesced pending write");
            return Ok(());
        }
        state.registered.insert(registration.clone());
        drop(state);

        let update = Arc::new(ResyncUpdate {
            coordinator: Arc::clone(self),
            key: key.clone(),
            lang: lang.clone(),
            epoch,
        });
        if let Err(e) = txn.on_commit(update).await {
            let mut state = self.state.lock().await;
            state.registered.remove(&registration);
            if state.pending.get(&entry).is_some_and(|p| p.epoch == epoch) {
                state.pending.remove(&entry);
            }
            drop(state);
            // The in-process write cannot be trusted without its resync.
            self.store.mark_stale(&key, &lang).await;
            return Err(e);
        }
        tracing::debug!(%key, %lang, %epoch, "registered post-commit resync");
        Ok(())
    }

    /// Number of entries written in a transaction that has not finished yet.
    pub async fn pending_count(&self) -> usize {
        self.reap_abandoned().await;
        self.state.lock().await.pending.len()
    }

    /// Returns true while (key, lang) has an uncommitted write.
    pub async fn is_dirty(&self, key: &MessageKey, lang: &LanguageCode) -> bool {
        self.reap_abandoned().await;
        self.state
            .lock()
            .await
            .pending
            .contains_key(&(key.clone(), lang.clone()))
    }

    /// Pending write for (key, lang), if any.
    pub async fn pending(&self, key: &MessageKey, lang: &LanguageCode) -> Option<PendingInvalidation> {
        self.reap_abandoned().await;
        self.state
            .lock()
            .await
            .pending
            .get(&(key.clone(), lang.clone()))
            .cloned()
    }

    pub async fn stats(&self) -> CoordinatorStats {
        self.reap_abandoned().await;
        self.state.lock().await.stats.clone()
    }

    /// Roll back the registrations of transactions dropped while open.
    pub async fn reap_abandoned(&self) {
        let abandoned = self.take_abandoned();
        if abandoned.is_empty() {
            return;
        }
        let mut state = self.state.lock().await;
        for (key, lang, epoch) in abandoned {
            tracing::debug!(%key, %lang, %epoch, "reaping write of dropped transaction");
            self.roll_back(&mut state, &key, &lang, epoch).await;
        }
    }

    /// Drop every cached language, then re-apply uncommitted writes so their
    /// writers keep reading them.
    pub async fn clear_store(&self) {
        self.reap_abandoned().await;
        let state = self.state.lock().await;
        self.store.clear().await;
        for pending in state.pending.values() {
            self.store
                .write(&pending.key, &pending.lang, pending.text.clone())
                .await;
        }
    }

    fn take_abandoned(&self) -> Vec<Registration> {
        match self.abandoned.lock() {
            Ok(mut list) => std::mem::take(&mut *list),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    /// Post-commit step for one registration.
    async fn committed(&self, key: &MessageKey, lang: &LanguageCode, epoch: TransactionEpoch) {
        let mut state = self.state.lock().await;
        if !state.registered.remove(&(key.clone(), lang.clone(), epoch)) {
            let violation = InvariantViolation::MissingRegistration {
                key: key.clone(),
                lang: lang.clone(),
                epoch,
            };
            tracing::error!(error = %violation, "resync fired without a live registration");
            debug_assert!(false, "{violation}");
            return;
        }

        let entry: EntryId = (key.clone(), lang.clone());
        match state.pending.get(&entry).map(|p| p.epoch) {
            Some(owner) if owner == epoch => {
                state.pending.remove(&entry);
            }
            Some(owner) => {
                // A later transaction wrote this entry; its own commit resyncs.
                state.stats.superseded += 1;
                tracing::debug!(%key, %lang, %epoch, %owner, "resync superseded by pending write");
                return;
            }
            None => {}
        }
        self.resync(&mut state, key, lang).await;
    }

    /// Rollback step for one registration.
    async fn rolled_back(&self, key: &MessageKey, lang: &LanguageCode, epoch: TransactionEpoch) {
        let mut state = self.state.lock().await;
        self.roll_back(&mut state, key, lang, epoch).await;
    }

    /// Abort step for one registration; must not block.
    fn abandoned(&self, key: &MessageKey, lang: &LanguageCode, epoch: TransactionEpoch) {
        let registration = (key.clone(), lang.clone(), epoch);
        match self.abandoned.lock() {
            Ok(mut list) => list.push(registration),
            Err(poisoned) => poisoned.into_inner().push(registration),
        }
    }

    async fn roll_back(
        &self,
        state: &mut CoordinatorState,
        key: &MessageKey,
        lang: &LanguageCode,
        epoch: TransactionEpoch,
    ) {
        state.registered.remove(&(key.clone(), lang.clone(), epoch));
        state.stats.rolled_back += 1;

        let entry: EntryId = (key.clone(), lang.clone());
        if state.pending.get(&entry).is_some_and(|p| p.epoch == epoch) {
            state.pending.remove(&entry);
            self.store.mark_stale(key, lang).await;
            tracing::debug!(%key, %lang, %epoch, "rolled back write, entry marked stale");
        }
    }

    /// Read the authoritative value and store it. Runs under the state lock.
    ///
    /// On failure the in-process value stays in place.
    async fn resync(&self, state: &mut CoordinatorState, key: &MessageKey, lang: &LanguageCode) {
        match self.source.fetch(key, lang).await {
            Ok(_) if state.pending.contains_key(&(key.clone(), lang.clone())) => {
                // An open transaction owns the in-process value.
                state.stats.superseded += 1;
                tracing::debug!(%key, %lang, "resync skipped, entry has a pending write");
            }
            Ok(fetched) => {
                self.store.write(key, lang, CachedText::from(fetched)).await;
                state.stats.resyncs += 1;
                tracing::debug!(%key, %lang, "resynced message");
            }
            Err(e) => {
                state.stats.failed_resyncs += 1;
                tracing::warn!(%key, %lang, error = %e, "resync failed, keeping in-process value");
            }
        }
    }
}

impl std::fmt::Debug for InvalidationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationCoordinator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Deferred resync of one entry, registered with a transaction.
struct ResyncUpdate {
    coordinator: Arc<InvalidationCoordinator>,
    key: MessageKey,
    lang: LanguageCode,
    epoch: TransactionEpoch,
}

#[async_trait]
impl DeferredUpdate for ResyncUpdate {
    async fn run(&self) {
        self.coordinator
            .committed(&self.key, &self.lang, self.epoch)
            .await;
    }

    async fn cancel(&self) {
        self.coordinator
            .rolled_back(&self.key, &self.lang, self.epoch)
            .await;
    }

    fn abandon(&self) {
        self.coordinator.abandoned(&self.key, &self.lang, self.epoch);
    }

    fn describe(&self) -> String {
        format!("resync {} ({})", self.key, self.lang)
    }
}
