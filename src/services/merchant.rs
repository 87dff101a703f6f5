//! The transaction state machine behind the provider's callback
//! methods. Every method is idempotent: the provider retries on
//! timeout and the replayed call must observe the original outcome.
//!
//! State diagram: CREATED → COMPLETED → CANCELLED_AFTER_COMPLETE,
//! or CREATED → CANCELLED. A CREATED transaction expires 12 hours
//! after `create_time`, checked lazily on the next create/perform.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{
    transaction::TIMEOUT_REASON_CODE, NewTransaction, Order, OrderState, Transaction,
    TransactionState,
};
use crate::error::{MerchantError, ServiceError};
use crate::ports::{Notifier, ReasonRepository, RepositoryError, TransactionRepository};
use crate::protocol::{
    from_millis, to_millis, to_millis_or_zero, Account, CancelParams, CancelResponse,
    CheckParams, CheckPerformParams, CheckPerformResponse, CheckResponse, CreateParams,
    CreateResponse, PerformParams, PerformResponse, StatementEntry, StatementParams,
    StatementResponse,
};
use crate::services::OrderService;

#[derive(Clone)]
pub struct MerchantService {
    orders: OrderService,
    transactions: Arc<dyn TransactionRepository>,
    reasons: Arc<dyn ReasonRepository>,
    notifier: Arc<dyn Notifier>,
}

impl MerchantService {
    pub fn new(
        orders: OrderService,
        transactions: Arc<dyn TransactionRepository>,
        reasons: Arc<dyn ReasonRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            orders,
            transactions,
            reasons,
            notifier,
        }
    }

    /// Pure validation: can this amount be charged against this order
    /// right now? No mutation on any path.
    pub async fn check_perform_transaction(
        &self,
        params: CheckPerformParams,
    ) -> Result<CheckPerformResponse, ServiceError> {
        let order = self.payable_order(params.amount, &params.account).await?;

        Ok(CheckPerformResponse {
            allow: true,
            detail: Some(order.fiscal_detail()),
        })
    }

    /// Idempotent creation keyed by the provider's external id.
    pub async fn create_transaction(
        &self,
        params: CreateParams,
    ) -> Result<CreateResponse, ServiceError> {
        let now = Utc::now();

        if let Some(existing) = self.transactions.find_by_external_id(&params.id).await? {
            return self.replay_create(existing, now).await;
        }

        let order = self.payable_order(params.amount, &params.account).await?;
        let time = from_millis(params.time)
            .ok_or_else(|| ServiceError::Internal(format!("bad timestamp {}", params.time)))?;

        let new = NewTransaction {
            external_id: params.id.clone(),
            order_id: order.id,
            amount: params.amount,
            account: params.account,
            time,
            create_time: now,
        };

        let created = match self.transactions.create(new.clone()).await {
            Ok(tx) => tx,
            // Transient contention gets one internal retry.
            Err(RepositoryError::Serialization(reason)) => {
                tracing::debug!(%reason, "retrying transaction insert after conflict");
                match self.transactions.create(new).await {
                    Ok(tx) => tx,
                    Err(err) => return Err(self.map_create_error(err)),
                }
            }
            // Lost the unique-key race: the concurrent callback
            // inserted the row, so this call becomes a replay.
            Err(RepositoryError::DuplicateExternalId(_)) => {
                let existing = self
                    .transactions
                    .find_by_external_id(&params.id)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::Internal(format!(
                            "transaction {} vanished after duplicate-key conflict",
                            params.id
                        ))
                    })?;
                return self.replay_create(existing, now).await;
            }
            Err(err) => return Err(self.map_create_error(err)),
        };

        tracing::info!(
            transaction_id = created.id,
            external_id = %created.external_id,
            order_id = created.order_id,
            "transaction created"
        );

        Ok(CreateResponse {
            transaction: created.id.to_string(),
            create_time: to_millis(created.create_time),
            state: created.state.as_i32(),
        })
    }

    pub async fn perform_transaction(
        &self,
        params: PerformParams,
    ) -> Result<PerformResponse, ServiceError> {
        let tx = self
            .transactions
            .find_by_external_id(&params.id)
            .await?
            .ok_or(MerchantError::TransactionNotFound)?;

        match tx.state {
            TransactionState::Created => {
                let now = Utc::now();
                if tx.is_expired(now) {
                    self.expire(&tx, now).await?;
                    return Err(MerchantError::CouldNotPerformTransaction.into());
                }

                let applied = self.transactions.mark_completed(tx.id, now).await?;
                if !applied {
                    // A concurrent replay won the CAS; report whatever
                    // terminal state it produced.
                    return self.reread_perform(&params.id).await;
                }

                let order = self.orders.find(tx.order_id).await?;
                self.orders.approve(tx.order_id).await?;
                if let Some(order) = order {
                    let text = format!("Your order #{} has been paid. Thank you!", order.id);
                    self.push_notifications(&order, text, "approve");
                }

                tracing::info!(
                    transaction_id = tx.id,
                    order_id = tx.order_id,
                    "transaction completed"
                );

                Ok(PerformResponse {
                    transaction: tx.id.to_string(),
                    perform_time: to_millis(now),
                    state: TransactionState::Completed.as_i32(),
                })
            }
            // Replay: the stored perform_time, unchanged.
            TransactionState::Completed => Ok(PerformResponse {
                transaction: tx.id.to_string(),
                perform_time: to_millis_or_zero(tx.perform_time),
                state: tx.state.as_i32(),
            }),
            _ => Err(MerchantError::CouldNotPerformTransaction.into()),
        }
    }

    pub async fn cancel_transaction(
        &self,
        params: CancelParams,
    ) -> Result<CancelResponse, ServiceError> {
        let tx = self
            .transactions
            .find_by_external_id(&params.id)
            .await?
            .ok_or(MerchantError::TransactionNotFound)?;

        // Cancellation timestamp is write-once; replays keep it.
        let cancel_time = tx.cancel_time.unwrap_or_else(Utc::now);

        if !tx.state.is_active() {
            return Ok(CancelResponse {
                transaction: tx.id.to_string(),
                cancel_time: to_millis(cancel_time),
                state: tx.state.as_i32(),
            });
        }

        // An unknown reason code is a broken provider payload, not a
        // protocol outcome: surface it as a system error. Codes
        // outside i32 range can never match the taxonomy.
        let reason = match i32::try_from(params.reason) {
            Ok(code) => self.reasons.find_by_code(code).await?,
            Err(_) => None,
        }
        .ok_or_else(|| {
            ServiceError::Internal(format!("unknown cancellation reason code {}", params.reason))
        })?;

        let to = match tx.state {
            TransactionState::Created => TransactionState::Cancelled,
            _ => TransactionState::CancelledAfterComplete,
        };

        let applied = self
            .transactions
            .mark_cancelled(tx.id, tx.state, to, cancel_time, reason.id)
            .await?;
        if !applied {
            return self.reread_cancel(&params.id).await;
        }

        let order = self.orders.find(tx.order_id).await?;
        self.orders.decline(tx.order_id).await?;
        if let Some(order) = order {
            let text = format!("Your order #{} has been cancelled.", order.id);
            self.push_notifications(&order, text, "decline");
        }

        tracing::info!(
            transaction_id = tx.id,
            order_id = tx.order_id,
            reason = reason.code,
            state = to.as_i32(),
            "transaction cancelled"
        );

        Ok(CancelResponse {
            transaction: tx.id.to_string(),
            cancel_time: to_millis(cancel_time),
            state: to.as_i32(),
        })
    }

    /// Pure read of the full transaction snapshot.
    pub async fn check_transaction(
        &self,
        params: CheckParams,
    ) -> Result<CheckResponse, ServiceError> {
        let tx = self
            .transactions
            .find_by_external_id(&params.id)
            .await?
            .ok_or(MerchantError::TransactionNotFound)?;

        Ok(CheckResponse {
            transaction: tx.id.to_string(),
            create_time: to_millis(tx.create_time),
            perform_time: to_millis_or_zero(tx.perform_time),
            cancel_time: to_millis_or_zero(tx.cancel_time),
            state: tx.state.as_i32(),
            reason: tx.reason_code,
        })
    }

    /// Reconciliation export: every transaction whose provider `time`
    /// falls inside the chronological [from, to] window, ascending.
    pub async fn get_statement(
        &self,
        params: StatementParams,
    ) -> Result<StatementResponse, ServiceError> {
        let from = from_millis(params.from)
            .ok_or_else(|| ServiceError::Internal(format!("bad timestamp {}", params.from)))?;
        let to = from_millis(params.to)
            .ok_or_else(|| ServiceError::Internal(format!("bad timestamp {}", params.to)))?;

        let transactions = self.transactions.list_in_range(from, to).await?;

        Ok(StatementResponse {
            transactions: transactions.into_iter().map(statement_entry).collect(),
        })
    }

    /// Shared validation for CheckPerformTransaction and the fresh
    /// branch of CreateTransaction.
    async fn payable_order(
        &self,
        amount: i64,
        account: &serde_json::Value,
    ) -> Result<Order, ServiceError> {
        let account = Account::from_value(account)?;

        let order = self
            .orders
            .find(account.order_id)
            .await?
            .ok_or(MerchantError::OrderNotFound)?;

        match order.state {
            OrderState::WaitingPay => {}
            OrderState::InProgress => return Err(MerchantError::OrderInProgress.into()),
            OrderState::Accepted => return Err(MerchantError::OrderAccepted.into()),
            OrderState::Cancelled => return Err(MerchantError::OrderCancelled.into()),
        }

        // Provider amounts are in the minor unit; orders store the
        // major unit. Floor division: a remainder can never match.
        if amount / 100 != order.amount {
            return Err(MerchantError::InvalidAmount.into());
        }

        Ok(order)
    }

    /// Replay path of CreateTransaction for an already-stored external
    /// id. The live-and-unexpired answer must match the original
    /// response byte for byte.
    async fn replay_create(
        &self,
        tx: Transaction,
        now: DateTime<Utc>,
    ) -> Result<CreateResponse, ServiceError> {
        if tx.state != TransactionState::Created {
            return Err(MerchantError::InactiveTransaction.into());
        }

        if tx.is_expired(now) {
            self.expire(&tx, now).await?;
            return Err(MerchantError::CouldNotPerformTransaction.into());
        }

        Ok(CreateResponse {
            transaction: tx.id.to_string(),
            create_time: to_millis(tx.create_time),
            state: tx.state.as_i32(),
        })
    }

    /// Lazy expiration: CREATED older than 12 hours becomes CANCELLED
    /// with the fixed timeout reason. The order itself is untouched;
    /// it was never paid.
    async fn expire(&self, tx: &Transaction, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let reason = self
            .reasons
            .find_by_code(TIMEOUT_REASON_CODE)
            .await?
            .ok_or_else(|| {
                ServiceError::Internal("timeout cancellation reason is not seeded".to_string())
            })?;

        // A false CAS here means a concurrent call already cancelled
        // it; the outcome is the same either way.
        self.transactions
            .mark_cancelled(
                tx.id,
                TransactionState::Created,
                TransactionState::Cancelled,
                now,
                reason.id,
            )
            .await?;

        tracing::info!(
            transaction_id = tx.id,
            external_id = %tx.external_id,
            "transaction expired and cancelled"
        );

        Ok(())
    }

    /// CAS loser path for perform: observe what the winner did.
    async fn reread_perform(&self, external_id: &str) -> Result<PerformResponse, ServiceError> {
        let tx = self
            .transactions
            .find_by_external_id(external_id)
            .await?
            .ok_or(MerchantError::TransactionNotFound)?;

        match tx.state {
            TransactionState::Completed => Ok(PerformResponse {
                transaction: tx.id.to_string(),
                perform_time: to_millis_or_zero(tx.perform_time),
                state: tx.state.as_i32(),
            }),
            _ => Err(MerchantError::CouldNotPerformTransaction.into()),
        }
    }

    /// CAS loser path for cancel: the winner either cancelled it (pure
    /// replay) or completed it first (retry from the new state).
    async fn reread_cancel(&self, external_id: &str) -> Result<CancelResponse, ServiceError> {
        let tx = self
            .transactions
            .find_by_external_id(external_id)
            .await?
            .ok_or(MerchantError::TransactionNotFound)?;

        if tx.state.is_cancelled() {
            return Ok(CancelResponse {
                transaction: tx.id.to_string(),
                cancel_time: to_millis_or_zero(tx.cancel_time),
                state: tx.state.as_i32(),
            });
        }

        Err(ServiceError::Internal(format!(
            "cancel CAS lost against non-cancelled state {:?} for {external_id}",
            tx.state
        )))
    }

    fn map_create_error(&self, err: RepositoryError) -> ServiceError {
        match err {
            RepositoryError::OrderBusy(_) => MerchantError::TransactionAlreadyCreated.into(),
            other => other.into(),
        }
    }

    /// Fire-and-forget status pushes, spawned after the state
    /// transition is committed. A notification failure is logged and
    /// never fails the payment.
    fn push_notifications(&self, order: &Order, user_text: String, status_label: &str) {
        let order_id = order.id;

        if let Some(user_ref) = order.user_ref {
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                if let Err(err) = notifier.notify_user(user_ref, &user_text).await {
                    tracing::warn!(order_id, error = %err, "user notification failed");
                }
            });
        }

        if let Some(display_ref) = order.display_ref {
            let notifier = Arc::clone(&self.notifier);
            let label = status_label.to_string();
            tokio::spawn(async move {
                if let Err(err) = notifier.notify_operator(display_ref, &label).await {
                    tracing::warn!(order_id, error = %err, "operator notification failed");
                }
            });
        }
    }
}

fn statement_entry(tx: Transaction) -> StatementEntry {
    StatementEntry {
        id: tx.external_id,
        time: to_millis(tx.time),
        amount: tx.amount,
        account: tx.account,
        create_time: to_millis(tx.create_time),
        perform_time: to_millis_or_zero(tx.perform_time),
        cancel_time: to_millis_or_zero(tx.cancel_time),
        transaction: tx.id.to_string(),
        state: tx.state.as_i32(),
        reason: tx.reason_code,
    }
}
