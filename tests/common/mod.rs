//! In-memory implementations of the repository and notifier ports,
//! mirroring the atomicity contracts the Postgres adapter provides.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use payme_merchant::domain::{
    CancellationReason, CartLine, NewTransaction, Order, OrderState, Transaction,
    TransactionState,
};
use payme_merchant::ports::{
    Notifier, OrderRepository, ReasonRepository, RepositoryError, RepositoryResult,
    TransactionRepository,
};
use payme_merchant::services::{MerchantService, OrderService};

#[derive(Default)]
pub struct InMemoryOrders {
    pub orders: Mutex<HashMap<i64, Order>>,
    pub set_state_calls: AtomicI64,
}

impl InMemoryOrders {
    pub async fn insert(&self, order: Order) {
        self.orders.lock().await.insert(order.id, order);
    }

    pub async fn state_of(&self, id: i64) -> OrderState {
        self.orders.lock().await.get(&id).unwrap().state
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrders {
    async fn find(&self, id: i64) -> RepositoryResult<Option<Order>> {
        Ok(self.orders.lock().await.get(&id).cloned())
    }

    async fn set_state(&self, id: i64, state: OrderState, status: &str) -> RepositoryResult<()> {
        self.set_state_calls.fetch_add(1, Ordering::SeqCst);
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::Backend(format!("order {id} missing")))?;
        order.state = state;
        order.status = status.to_string();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTransactions {
    pub rows: Mutex<Vec<Transaction>>,
    next_id: AtomicI64,
    /// Errors popped on the next `create` calls, for contention tests.
    pub create_failures: Mutex<Vec<RepositoryError>>,
    /// External ids hidden from the next lookup, to simulate a row
    /// committed by a concurrent callback between lookup and insert.
    hidden_once: Mutex<Vec<String>>,
}

impl InMemoryTransactions {
    pub async fn push_create_failure(&self, err: RepositoryError) {
        self.create_failures.lock().await.push(err);
    }

    pub async fn hide_once(&self, external_id: &str) {
        self.hidden_once.lock().await.push(external_id.to_string());
    }

    pub async fn insert_raw(&self, tx: Transaction) {
        self.rows.lock().await.push(tx);
    }

    pub async fn by_external_id(&self, external_id: &str) -> Option<Transaction> {
        self.rows
            .lock()
            .await
            .iter()
            .find(|tx| tx.external_id == external_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactions {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let mut hidden = self.hidden_once.lock().await;
        if let Some(pos) = hidden.iter().position(|id| id == external_id) {
            hidden.remove(pos);
            return Ok(None);
        }
        drop(hidden);

        Ok(self.by_external_id(external_id).await)
    }

    async fn create(&self, new: NewTransaction) -> RepositoryResult<Transaction> {
        if let Some(err) = self.create_failures.lock().await.pop() {
            return Err(err);
        }

        let mut rows = self.rows.lock().await;

        if rows.iter().any(|tx| tx.external_id == new.external_id) {
            return Err(RepositoryError::DuplicateExternalId(new.external_id));
        }
        if rows
            .iter()
            .any(|tx| tx.order_id == new.order_id && tx.state.is_active())
        {
            return Err(RepositoryError::OrderBusy(new.order_id));
        }

        let tx = Transaction {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            external_id: new.external_id,
            order_id: new.order_id,
            amount: new.amount,
            account: new.account,
            state: TransactionState::Created,
            time: new.time,
            create_time: new.create_time,
            perform_time: None,
            cancel_time: None,
            reason_code: None,
        };
        rows.push(tx.clone());
        Ok(tx)
    }

    async fn mark_completed(
        &self,
        id: i64,
        perform_time: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let mut rows = self.rows.lock().await;
        let tx = rows.iter_mut().find(|tx| tx.id == id);
        match tx {
            Some(tx) if tx.state == TransactionState::Created => {
                tx.state = TransactionState::Completed;
                tx.perform_time = Some(perform_time);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_cancelled(
        &self,
        id: i64,
        from: TransactionState,
        to: TransactionState,
        cancel_time: DateTime<Utc>,
        reason_id: i64,
    ) -> RepositoryResult<bool> {
        let mut rows = self.rows.lock().await;
        let tx = rows.iter_mut().find(|tx| tx.id == id);
        match tx {
            Some(tx) if tx.state == from => {
                tx.state = to;
                tx.cancel_time = tx.cancel_time.or(Some(cancel_time));
                // The fake seeds reasons with id == code.
                tx.reason_code = Some(reason_id as i32);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Transaction>> {
        let mut out: Vec<_> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|tx| tx.time >= from && tx.time <= to)
            .cloned()
            .collect();
        out.sort_by_key(|tx| tx.time);
        Ok(out)
    }
}

/// Seeded with the provider taxonomy, ids equal to codes.
pub struct InMemoryReasons;

#[async_trait]
impl ReasonRepository for InMemoryReasons {
    async fn find_by_code(&self, code: i32) -> RepositoryResult<Option<CancellationReason>> {
        let known = [
            (1, "One or more recipients not found or inactive"),
            (2, "Debit operation error in the processing center"),
            (3, "Transaction execution error"),
            (4, "Transaction cancelled by timeout"),
            (5, "Money refund"),
            (10, "Unknown error"),
        ];
        Ok(known
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(c, description)| CancellationReason {
                id: *c as i64,
                code: *c,
                description: description.to_string(),
            }))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub user_calls: Mutex<Vec<(i64, String)>>,
    pub operator_calls: Mutex<Vec<(i64, String)>>,
    pub fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_user(&self, user_ref: i64, text: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("bot api unreachable");
        }
        self.user_calls.lock().await.push((user_ref, text.to_string()));
        Ok(())
    }

    async fn notify_operator(&self, display_ref: i64, status_label: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("bot api unreachable");
        }
        self.operator_calls
            .lock()
            .await
            .push((display_ref, status_label.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub service: MerchantService,
    pub orders: Arc<InMemoryOrders>,
    pub transactions: Arc<InMemoryTransactions>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness() -> Harness {
    harness_with_notifier(RecordingNotifier::default())
}

pub fn harness_with_notifier(notifier: RecordingNotifier) -> Harness {
    let orders = Arc::new(InMemoryOrders::default());
    let transactions = Arc::new(InMemoryTransactions::default());
    let notifier = Arc::new(notifier);

    let service = MerchantService::new(
        OrderService::new(orders.clone()),
        transactions.clone(),
        Arc::new(InMemoryReasons),
        notifier.clone(),
    );

    Harness {
        service,
        orders,
        transactions,
        notifier,
    }
}

/// A payable order with one cart line; amount is in the major unit.
pub fn waiting_order(id: i64, amount: i64) -> Order {
    Order {
        id,
        amount,
        cart: vec![CartLine {
            id: "line-1".to_string(),
            name: "Subscription".to_string(),
            price: amount,
            count: 1,
            discount: None,
            vat_percent: 12,
            code: "06105001001000001".to_string(),
            package_code: "123456".to_string(),
        }],
        state: OrderState::WaitingPay,
        status: "new".to_string(),
        user_ref: Some(777),
        display_ref: Some(555),
    }
}
