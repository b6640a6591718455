//! Transactional store contract.
//!
//! A store either owns a connection pool or is bound to an open transaction.
//! [`Transactional::within_transaction`] runs a unit of work against a store
//! bound to a transaction:
//!
//! - when the store is already bound, the work runs on the existing
//!   transaction and nothing is begun, committed or rolled back here;
//! - otherwise a transaction is begun, committed when the work succeeds and
//!   rolled back when it fails.
//!
//! ```ignore
//! let post = store
//!     .within_transaction(move |tx| {
//!         Box::pin(async move {
//!             tx.create(&post).await?;
//!             Ok(post)
//!         })
//!     })
//!     .await?;
//! ```
//!
//! Dropping the returned future drops the transaction handle, which rolls
//! the transaction back.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::shared_kernel::{DomainError, Result};

#[async_trait]
pub trait Transactional: Clone + Send + Sync + Sized + 'static {
    /// Shared handle to an open transaction.
    type Tx: Clone + Send + Sync + 'static;

    async fn begin(&self) -> Result<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    /// A copy of this store with the same configuration, bound to `tx`.
    fn with_transaction(&self, tx: Self::Tx) -> Self;

    fn in_transaction(&self) -> bool;

    fn transaction_timeout(&self) -> Option<Duration> {
        None
    }

    async fn within_transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> BoxFuture<'static, Result<T>> + Send + 'static,
    {
        if self.in_transaction() {
            return work(self.clone()).await;
        }

        let tx = self.begin().await?;
        debug!("transaction begun");

        let scoped = self.with_transaction(tx.clone());
        let outcome = match self.transaction_timeout() {
            Some(limit) => match tokio::time::timeout(limit, work(scoped)).await {
                Ok(result) => result,
                Err(_) => Err(DomainError::TransactionTimeout {
                    seconds: limit.as_secs(),
                }),
            },
            None => work(scoped).await,
        };

        match outcome {
            Ok(value) => {
                self.commit(tx).await?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(err) => match self.rollback(tx).await {
                Ok(()) => {
                    debug!(error = %err, "transaction rolled back");
                    Err(err)
                }
                Err(rollback_err) => {
                    warn!(error = %err, rollback_error = %rollback_err, "rollback failed");
                    Err(DomainError::RollbackFailed {
                        source: Box::new(err),
                        rollback: rollback_err.to_string(),
                    })
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Journal {
        begun: AtomicUsize,
        committed: AtomicUsize,
        rolled_back: AtomicUsize,
        fail_rollback: AtomicBool,
        writes: Mutex<Vec<&'static str>>,
    }

    #[derive(Clone)]
    struct RecordingStore {
        journal: Arc<Journal>,
        tx: Option<Arc<Mutex<Vec<&'static str>>>>,
        timeout: Option<Duration>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                journal: Arc::new(Journal::default()),
                tx: None,
                timeout: None,
            }
        }

        fn write(&self, value: &'static str) {
            match &self.tx {
                Some(staged) => staged.lock().unwrap().push(value),
                None => self.journal.writes.lock().unwrap().push(value),
            }
        }
    }

    #[async_trait]
    impl Transactional for RecordingStore {
        type Tx = Arc<Mutex<Vec<&'static str>>>;

        async fn begin(&self) -> Result<Self::Tx> {
            self.journal.begun.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Mutex::new(Vec::new())))
        }

        async fn commit(&self, tx: Self::Tx) -> Result<()> {
            self.journal.committed.fetch_add(1, Ordering::SeqCst);
            let staged = std::mem::take(&mut *tx.lock().unwrap());
            self.journal.writes.lock().unwrap().extend(staged);
            Ok(())
        }

        async fn rollback(&self, _tx: Self::Tx) -> Result<()> {
            self.journal.rolled_back.fetch_add(1, Ordering::SeqCst);
            if self.journal.fail_rollback.load(Ordering::SeqCst) {
                return Err(DomainError::infrastructure("connection reset"));
            }
            Ok(())
        }

        fn with_transaction(&self, tx: Self::Tx) -> Self {
            Self {
                journal: self.journal.clone(),
                tx: Some(tx),
                timeout: self.timeout,
            }
        }

        fn in_transaction(&self) -> bool {
            self.tx.is_some()
        }

        fn transaction_timeout(&self) -> Option<Duration> {
            self.timeout
        }
    }

    #[tokio::test]
    async fn commits_on_success() {
        let store = RecordingStore::new();
        let value = store
            .within_transaction(|tx| {
                Box::pin(async move {
                    tx.write("a");
                    tx.write("b");
                    Ok(7)
                })
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(store.journal.committed.load(Ordering::SeqCst), 1);
        assert_eq!(*store.journal.writes.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn rolls_back_and_returns_original_error() {
        let store = RecordingStore::new();
        let err = store
            .within_transaction(|tx| {
                Box::pin(async move {
                    tx.write("first");
                    Err::<(), _>(DomainError::infrastructure("second statement failed"))
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::InfrastructureError { .. }));
        assert_eq!(store.journal.rolled_back.load(Ordering::SeqCst), 1);
        assert_eq!(store.journal.committed.load(Ordering::SeqCst), 0);
        assert!(store.journal.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rollback_failure_is_reported_with_cause() {
        let store = RecordingStore::new();
        store.journal.fail_rollback.store(true, Ordering::SeqCst);

        let err = store
            .within_transaction(|_tx| {
                Box::pin(async { Err::<(), _>(DomainError::validation("title", "required")) })
            })
            .await
            .unwrap_err();

        match err {
            DomainError::RollbackFailed { source, rollback } => {
                assert!(matches!(*source, DomainError::Validation { .. }));
                assert_eq!(rollback, "Infrastructure error: connection reset");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn bound_store_reuses_the_ambient_transaction() {
        let store = RecordingStore::new();
        let outer = store.begin().await.unwrap();
        let bound = store.with_transaction(outer.clone());

        bound
            .within_transaction(|tx| {
                Box::pin(async move {
                    tx.write("nested");
                    Ok(())
                })
            })
            .await
            .unwrap();

        assert_eq!(store.journal.begun.load(Ordering::SeqCst), 1);
        assert_eq!(store.journal.committed.load(Ordering::SeqCst), 0);
        assert_eq!(*outer.lock().unwrap(), vec!["nested"]);
    }

    #[tokio::test]
    async fn timeout_rolls_back() {
        let mut store = RecordingStore::new();
        store.timeout = Some(Duration::from_millis(20));

        let err = store
            .within_transaction(|tx| {
                Box::pin(async move {
                    tx.write("slow");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::TransactionTimeout { .. }));
        assert_eq!(store.journal.rolled_back.load(Ordering::SeqCst), 1);
        assert!(store.journal.writes.lock().unwrap().is_empty());
    }
}
