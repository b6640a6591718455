//! Executable SQL context
//!
//! [`PgStore`] is what the repositories run their statements on. Unbound, it
//! uses the pool and every statement commits on its own. Bound to a
//! transaction (see [`Transactional::with_transaction`]), every statement
//! goes through that transaction until it is committed or rolled back.
//!
//! [`Transactional::with_transaction`]: agora_domain::transaction::Transactional::with_transaction

use std::sync::Arc;
use std::time::Duration;

use agora_domain::DomainError;
use sqlx::postgres::{PgArguments, PgPool, PgQueryResult, PgRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{FromRow, Postgres, Transaction};
use thiserror::Error;
use tokio::sync::Mutex;

/// Shared handle to an open transaction. `None` once it has been finished.
pub type PgTransactionHandle = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Transaction already committed or rolled back")]
    TransactionCompleted,
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TransactionCompleted => DomainError::Transaction {
                message: err.to_string(),
            },
            StoreError::Sqlx(e) => DomainError::InfrastructureError {
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    tx: Option<PgTransactionHandle>,
    tx_timeout: Option<Duration>,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tx: None,
            tx_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tx_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.tx_timeout
    }

    pub fn is_bound(&self) -> bool {
        self.tx.is_some()
    }

    /// The same store bound to `tx`.
    pub fn bind(&self, tx: PgTransactionHandle) -> Self {
        Self {
            pool: self.pool.clone(),
            tx: Some(tx),
            tx_timeout: self.tx_timeout,
        }
    }

    pub async fn begin(&self) -> Result<PgTransactionHandle, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Arc::new(Mutex::new(Some(tx))))
    }

    pub async fn commit(&self, handle: PgTransactionHandle) -> Result<(), StoreError> {
        let tx = handle
            .lock()
            .await
            .take()
            .ok_or(StoreError::TransactionCompleted)?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(&self, handle: PgTransactionHandle) -> Result<(), StoreError> {
        let tx = handle
            .lock()
            .await
            .take()
            .ok_or(StoreError::TransactionCompleted)?;
        tx.rollback().await?;
        Ok(())
    }

    pub async fn execute(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<PgQueryResult, StoreError> {
        match &self.tx {
            Some(handle) => {
                let mut guard = handle.lock().await;
                let tx = guard.as_mut().ok_or(StoreError::TransactionCompleted)?;
                Ok(query.execute(&mut **tx).await?)
            }
            None => Ok(query.execute(&self.pool).await?),
        }
    }

    pub async fn fetch_all<T>(
        &self,
        query: QueryAs<'_, Postgres, T, PgArguments>,
    ) -> Result<Vec<T>, StoreError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        match &self.tx {
            Some(handle) => {
                let mut guard = handle.lock().await;
                let tx = guard.as_mut().ok_or(StoreError::TransactionCompleted)?;
                Ok(query.fetch_all(&mut **tx).await?)
            }
            None => Ok(query.fetch_all(&self.pool).await?),
        }
    }

    pub async fn fetch_optional<T>(
        &self,
        query: QueryAs<'_, Postgres, T, PgArguments>,
    ) -> Result<Option<T>, StoreError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        match &self.tx {
            Some(handle) => {
                let mut guard = handle.lock().await;
                let tx = guard.as_mut().ok_or(StoreError::TransactionCompleted)?;
                Ok(query.fetch_optional(&mut **tx).await?)
            }
            None => Ok(query.fetch_optional(&self.pool).await?),
        }
    }
}

/// Implements [`Transactional`](agora_domain::transaction::Transactional) for
/// a repository that keeps its [`PgStore`] in a field named `store`.
macro_rules! impl_pg_transactional {
    ($repository:ty) => {
        #[async_trait::async_trait]
        impl agora_domain::transaction::Transactional for $repository {
            type Tx = $crate::persistence::postgres::transaction::PgTransactionHandle;

            async fn begin(&self) -> agora_domain::Result<Self::Tx> {
                Ok(self.store.begin().await?)
            }

            async fn commit(&self, tx: Self::Tx) -> agora_domain::Result<()> {
                Ok(self.store.commit(tx).await?)
            }

            async fn rollback(&self, tx: Self::Tx) -> agora_domain::Result<()> {
                Ok(self.store.rollback(tx).await?)
            }

            fn with_transaction(&self, tx: Self::Tx) -> Self {
                Self {
                    store: self.store.bind(tx),
                }
            }

            fn in_transaction(&self) -> bool {
                self.store.is_bound()
            }

            fn transaction_timeout(&self) -> Option<std::time::Duration> {
                self.store.timeout()
            }
        }
    };
}

pub(crate) use impl_pg_transactional;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_transaction_maps_to_transaction_error() {
        let err: DomainError = StoreError::TransactionCompleted.into();
        assert!(matches!(err, DomainError::Transaction { .. }));
    }

    #[test]
    fn sqlx_errors_map_to_infrastructure_errors() {
        let err: DomainError = StoreError::from(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, DomainError::InfrastructureError { .. }));
    }
}
