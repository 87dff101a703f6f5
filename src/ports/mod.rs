//! Narrow interfaces the state machines depend on. The core never
//! touches SQL or HTTP directly; adapters implement these traits and
//! carry the atomicity guarantees the state machines rely on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{
    CancellationReason, NewTransaction, Order, OrderState, Transaction, TransactionState,
};

#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Another transaction in an active state already holds the order.
    #[error("order {0} already has an active transaction")]
    OrderBusy(i64),

    /// The provider's idempotency key is already stored.
    #[error("transaction with external id {0} already exists")]
    DuplicateExternalId(String),

    /// Transient contention (serialization failure, deadlock). The
    /// caller may retry once.
    #[error("transient storage conflict: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find(&self, id: i64) -> RepositoryResult<Option<Order>>;

    /// Writes state and display label together.
    async fn set_state(&self, id: i64, state: OrderState, status: &str) -> RepositoryResult<()>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn find_by_external_id(&self, external_id: &str) -> RepositoryResult<Option<Transaction>>;

    /// Inserts a new CREATED transaction. Must be atomic with respect
    /// to both the unique external id and the "no second active
    /// transaction per order" rule: concurrent callbacks observe
    /// `DuplicateExternalId` or `OrderBusy`, never two rows.
    async fn create(&self, new: NewTransaction) -> RepositoryResult<Transaction>;

    /// Compare-and-set CREATED → COMPLETED, stamping `perform_time`.
    /// Returns false when the observed state no longer holds.
    async fn mark_completed(
        &self,
        id: i64,
        perform_time: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    /// Compare-and-set `from` → `to` with reason bookkeeping. An
    /// already-set `cancel_time` is kept; the supplied one applies
    /// only on first cancellation. Returns false when the observed
    /// state no longer holds.
    async fn mark_cancelled(
        &self,
        id: i64,
        from: TransactionState,
        to: TransactionState,
        cancel_time: DateTime<Utc>,
        reason_id: i64,
    ) -> RepositoryResult<bool>;

    /// All transactions whose provider `time` falls inside the
    /// inclusive window, ascending by `time`.
    async fn list_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Transaction>>;
}

#[async_trait]
pub trait ReasonRepository: Send + Sync {
    async fn find_by_code(&self, code: i32) -> RepositoryResult<Option<CancellationReason>>;
}

/// Best-effort side channel for order status pushes. Failures are
/// logged by the caller and never affect payment state.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, user_ref: i64, text: &str) -> anyhow::Result<()>;

    async fn notify_operator(&self, display_ref: i64, status_label: &str) -> anyhow::Result<()>;
}
