//! Deferred updates gated on transaction commit.
//!
//! [`DeferredUpdateQueue`] keeps one explicit list of pending work per open
//! transaction. Work is drained by [`Transaction::commit`] and discarded by
//! [`Transaction::rollback`]; nothing runs while the transaction is open.
//! [`AutoCommit`] is the context used when no transaction is open: it runs
//! every update immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use msgcache_core::{MsgCacheError, MsgCacheResult, TransactionEpoch, TransactionError};

use super::traits::{DeferredUpdate, TransactionContext};

type Updates = Vec<Arc<dyn DeferredUpdate>>;

#[derive(Default)]
struct QueueInner {
    transactions: Mutex<HashMap<TransactionEpoch, Updates>>,
}

impl QueueInner {
    fn lock(&self) -> MsgCacheResult<MutexGuard<'_, HashMap<TransactionEpoch, Updates>>> {
        self.transactions
            .lock()
            .map_err(|_| MsgCacheError::Transaction(TransactionError::LockPoisoned))
    }
}

/// Outcome of finishing a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub epoch: TransactionEpoch,
    /// Updates that ran after commit.
    pub run: usize,
    /// Updates cancelled by rollback.
    pub cancelled: usize,
}

/// Queue of deferred updates, keyed by transaction.
#[derive(Clone, Default)]
pub struct DeferredUpdateQueue {
    inner: Arc<QueueInner>,
}

impl DeferredUpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new transaction.
    pub fn begin(&self) -> MsgCacheResult<Transaction> {
        let epoch = TransactionEpoch::new();
        self.inner.lock()?.insert(epoch, Vec::new());
        tracing::debug!(%epoch, "transaction opened");
        Ok(Transaction {
            epoch,
            open: AtomicBool::new(true),
            queue: Arc::clone(&self.inner),
        })
    }

    /// Number of updates waiting on any open transaction.
    pub fn pending_count(&self) -> MsgCacheResult<usize> {
        Ok(self.inner.lock()?.values().map(Vec::len).sum())
    }

    /// Number of transactions still open.
    pub fn open_transactions(&self) -> MsgCacheResult<usize> {
        Ok(self.inner.lock()?.len())
    }
}

impl std::fmt::Debug for DeferredUpdateQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredUpdateQueue").finish_non_exhaustive()
    }
}

/// Handle to one open transaction.
///
/// Must be finished with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback). Dropping an open transaction aborts it:
/// queued updates are abandoned through [`DeferredUpdate::abandon`].
pub struct Transaction {
    epoch: TransactionEpoch,
    open: AtomicBool,
    queue: Arc<QueueInner>,
}

impl Transaction {
    pub fn id(&self) -> TransactionEpoch {
        self.epoch
    }

    /// Number of updates queued on this transaction.
    pub fn pending(&self) -> MsgCacheResult<usize> {
        Ok(self
            .queue
            .lock()?
            .get(&self.epoch)
            .map(Vec::len)
            .unwrap_or(0))
    }

    /// Commit and run every queued update, in registration order.
    pub async fn commit(self) -> MsgCacheResult<CommitReport> {
        let updates = self.finish()?;
        let run = updates.len();
        for update in updates {
            tracing::debug!(epoch = %self.epoch, update = %update.describe(), "running deferred update");
            update.run().await;
        }
        tracing::debug!(epoch = %self.epoch, run, "transaction committed");
        Ok(CommitReport {
            epoch: self.epoch,
            run,
            cancelled: 0,
        })
    }

    /// Roll back; queued updates are cancelled and never run.
    pub async fn rollback(self) -> MsgCacheResult<CommitReport> {
        let updates = self.finish()?;
        let cancelled = updates.len();
        for update in updates {
            update.cancel().await;
        }
        tracing::debug!(epoch = %self.epoch, cancelled, "transaction rolled back");
        Ok(CommitReport {
            epoch: self.epoch,
            run: 0,
            cancelled,
        })
    }

    /// Close the transaction and take its queued updates.
    fn finish(&self) -> MsgCacheResult<Updates> {
        let mut transactions = self.queue.lock()?;
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(TransactionError::AlreadyFinished { epoch: self.epoch }.into());
        }
        transactions
            .remove(&self.epoch)
            .ok_or_else(|| TransactionError::UnknownTransaction { epoch: self.epoch }.into())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("epoch", &self.epoch)
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.open.swap(false, Ordering::SeqCst) {
            return;
        }
        let updates = self
            .queue
            .lock()
            .ok()
            .and_then(|mut transactions| transactions.remove(&self.epoch))
            .unwrap_or_default();
        for update in &updates {
            update.abandon();
        }
        tracing::warn!(
            epoch = %self.epoch,
            abandoned = updates.len(),
            "transaction dropped without commit or rollback"
        );
    }
}

#[async_trait]
impl TransactionContext for Transaction {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn epoch(&self) -> Option<TransactionEpoch> {
        Some(self.epoch)
    }

    async fn on_commit(&self, update: Arc<dyn DeferredUpdate>) -> MsgCacheResult<()> {
        let mut transactions = self.queue.lock()?;
        // `finish` flips `open` under the same lock, so this check cannot race.
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransactionError::NotOpen { epoch: self.epoch }.into());
        }
        match transactions.get_mut(&self.epoch) {
            Some(updates) => {
                updates.push(update);
                Ok(())
            }
            None => Err(TransactionError::UnknownTransaction { epoch: self.epoch }.into()),
        }
    }
}

/// Context for writes made outside any transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoCommit;

#[async_trait]
impl TransactionContext for AutoCommit {
    fn is_open(&self) -> bool {
        false
    }

    fn epoch(&self) -> Option<TransactionEpoch> {
        None
    }

    async fn on_commit(&self, update: Arc<dyn DeferredUpdate>) -> MsgCacheResult<()> {
        update.run().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingUpdate {
        runs: AtomicUsize,
        cancels: AtomicUsize,
        abandons: AtomicUsize,
    }

    #[async_trait]
    impl DeferredUpdate for RecordingUpdate {
        async fn run(&self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }

        async fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }

        fn abandon(&self) {
            self.abandons.fetch_add(1, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    #[tokio::test]
    async fn test_updates_wait_for_commit() {
        let queue = DeferredUpdateQueue::new();
        let txn = queue.begin().unwrap();
        let update = Arc::new(RecordingUpdate::default());

        txn.on_commit(update.clone()).await.unwrap();
        txn.on_commit(update.clone()).await.unwrap();
        assert_eq!(update.runs.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending_count().unwrap(), 2);
        assert_eq!(txn.pending().unwrap(), 2);

        let report = txn.commit().await.unwrap();
        assert_eq!(report.run, 2);
        assert_eq!(update.runs.load(Ordering::SeqCst), 2);
        assert_eq!(queue.pending_count().unwrap(), 0);
        assert_eq!(queue.open_transactions().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rollback_cancels_instead_of_running() {
        let queue = DeferredUpdateQueue::new();
        let txn = queue.begin().unwrap();
        let update = Arc::new(RecordingUpdate::default());
        txn.on_commit(update.clone()).await.unwrap();

        let report = txn.rollback().await.unwrap();
        assert_eq!(report.cancelled, 1);
        assert_eq!(update.runs.load(Ordering::SeqCst), 0);
        assert_eq!(update.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pending_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_auto_commit_runs_immediately() {
        let update = Arc::new(RecordingUpdate::default());
        assert!(!AutoCommit.is_open());
        assert!(AutoCommit.epoch().is_none());
        AutoCommit.on_commit(update.clone()).await.unwrap();
        assert_eq!(update.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transactions_are_independent() {
        let queue = DeferredUpdateQueue::new();
        let first = queue.begin().unwrap();
        let second = queue.begin().unwrap();
        assert_ne!(first.id(), second.id());

        let a = Arc::new(RecordingUpdate::default());
        let b = Arc::new(RecordingUpdate::default());
        first.on_commit(a.clone()).await.unwrap();
        second.on_commit(b.clone()).await.unwrap();

        first.commit().await.unwrap();
        assert_eq!(a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(b.runs.load(Ordering::SeqCst), 0);
        assert_eq!(queue.pending_count().unwrap(), 1);

        second.rollback().await.unwrap();
        assert_eq!(b.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_abandons_updates() {
        let queue = DeferredUpdateQueue::new();
        let update = Arc::new(RecordingUpdate::default());
        {
            let txn = queue.begin().unwrap();
            txn.on_commit(update.clone()).await.unwrap();
        }
        assert_eq!(queue.pending_count().unwrap(), 0);
        assert_eq!(queue.open_transactions().unwrap(), 0);
        assert_eq!(update.runs.load(Ordering::SeqCst), 0);
        assert_eq!(update.cancels.load(Ordering::SeqCst), 0);
        assert_eq!(update.abandons.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_finished_transaction_abandons_nothing() {
        let queue = DeferredUpdateQueue::new();
        let update = Arc::new(RecordingUpdate::default());
        let txn = queue.begin().unwrap();
        txn.on_commit(update.clone()).await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(update.runs.load(Ordering::SeqCst), 1);
        assert_eq!(update.abandons.load(Ordering::SeqCst), 0);
    }
}
