//! Postgres implementations of the repository ports. The only module
//! that speaks SQL. Atomicity contracts:
//!
//! - transaction insert is a single conditional statement, so the
//!   "no second active transaction per order" check and the insert
//!   cannot interleave with a concurrent callback;
//! - perform/cancel are conditional updates on the observed state
//!   (compare-and-set), so replays apply side effects at most once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    CancellationReason, CartLine, NewTransaction, Order, OrderState, Transaction,
    TransactionState,
};
use crate::ports::{
    OrderRepository, ReasonRepository, RepositoryError, RepositoryResult, TransactionRepository,
};

const SELECT_TRANSACTION: &str = r#"
    SELECT t.id, t.external_id, t.order_id, t.amount, t.account, t.state,
           t.time, t.create_time, t.perform_time, t.cancel_time,
           r.code AS reason_code
    FROM transactions t
    LEFT JOIN reasons r ON r.id = t.reason_id
"#;

#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn find(&self, id: i64) -> RepositoryResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, amount, cart, state, status, user_ref, display_ref \
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(OrderRow::into_domain).transpose()
    }

    async fn set_state(&self, id: i64, state: OrderState, status: &str) -> RepositoryResult<()> {
        sqlx::query("UPDATE orders SET state = $2, status = $3 WHERE id = $1")
            .bind(id)
            .bind(state.as_i16())
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let sql = format!("{SELECT_TRANSACTION} WHERE t.external_id = $1");
        let row = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn create(&self, new: NewTransaction) -> RepositoryResult<Transaction> {
        // Conditional insert: the active-transaction check and the
        // write happen in one statement. A duplicate external id trips
        // the unique constraint instead.
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions
                (external_id, order_id, amount, account, state, time, create_time)
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE NOT EXISTS (
                SELECT 1 FROM transactions
                WHERE order_id = $2 AND state IN ($8, $9)
            )
            RETURNING id, external_id, order_id, amount, account, state,
                      time, create_time, perform_time, cancel_time,
                      NULL::integer AS reason_code
            "#,
        )
        .bind(&new.external_id)
        .bind(new.order_id)
        .bind(new.amount)
        .bind(&new.account)
        .bind(TransactionState::Created.as_i32())
        .bind(new.time)
        .bind(new.create_time)
        .bind(TransactionState::Created.as_i32())
        .bind(TransactionState::Completed.as_i32())
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| map_create_sqlx(err, &new.external_id))?;

        match row {
            Some(row) => row.into_domain(),
            None => Err(RepositoryError::OrderBusy(new.order_id)),
        }
    }

    async fn mark_completed(
        &self,
        id: i64,
        perform_time: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let result = sqlx::query(
            "UPDATE transactions SET state = $2, perform_time = $3 \
             WHERE id = $1 AND state = $4",
        )
        .bind(id)
        .bind(TransactionState::Completed.as_i32())
        .bind(perform_time)
        .bind(TransactionState::Created.as_i32())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_cancelled(
        &self,
        id: i64,
        from: TransactionState,
        to: TransactionState,
        cancel_time: DateTime<Utc>,
        reason_id: i64,
    ) -> RepositoryResult<bool> {
        // COALESCE keeps the first cancel_time on replays.
        let result = sqlx::query(
            "UPDATE transactions \
             SET state = $3, cancel_time = COALESCE(cancel_time, $4), reason_id = $5 \
             WHERE id = $1 AND state = $2",
        )
        .bind(id)
        .bind(from.as_i32())
        .bind(to.as_i32())
        .bind(cancel_time)
        .bind(reason_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<Transaction>> {
        let sql =
            format!("{SELECT_TRANSACTION} WHERE t.time >= $1 AND t.time <= $2 ORDER BY t.time ASC");
        let rows = sqlx::query_as::<_, TransactionRow>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }
}

#[derive(Clone)]
pub struct PostgresReasonRepository {
    pool: PgPool,
}

impl PostgresReasonRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReasonRepository for PostgresReasonRepository {
    async fn find_by_code(&self, code: i32) -> RepositoryResult<Option<CancellationReason>> {
        let row = sqlx::query_as::<_, ReasonRow>(
            "SELECT id, code, description FROM reasons WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.map(|r| CancellationReason {
            id: r.id,
            code: r.code,
            description: r.description,
        }))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    amount: i64,
    cart: serde_json::Value,
    state: i16,
    status: String,
    user_ref: Option<i64>,
    display_ref: Option<i64>,
}

impl OrderRow {
    fn into_domain(self) -> RepositoryResult<Order> {
        let state = OrderState::try_from(self.state).map_err(RepositoryError::Backend)?;
        let cart: Vec<CartLine> = serde_json::from_value(self.cart)
            .map_err(|err| RepositoryError::Backend(format!("malformed cart payload: {err}")))?;

        Ok(Order {
            id: self.id,
            amount: self.amount,
            cart,
            state,
            status: self.status,
            user_ref: self.user_ref,
            display_ref: self.display_ref,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    external_id: String,
    order_id: i64,
    amount: i64,
    account: serde_json::Value,
    state: i32,
    time: DateTime<Utc>,
    create_time: DateTime<Utc>,
    perform_time: Option<DateTime<Utc>>,
    cancel_time: Option<DateTime<Utc>>,
    reason_code: Option<i32>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let state = TransactionState::try_from(self.state).map_err(RepositoryError::Backend)?;

        Ok(Transaction {
            id: self.id,
            external_id: self.external_id,
            order_id: self.order_id,
            amount: self.amount,
            account: self.account,
            state,
            time: self.time,
            create_time: self.create_time,
            perform_time: self.perform_time,
            cancel_time: self.cancel_time,
            reason_code: self.reason_code,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReasonRow {
    id: i64,
    code: i32,
    description: String,
}

fn map_sqlx(err: sqlx::Error) -> RepositoryError {
    if is_serialization_failure(&err) {
        RepositoryError::Serialization(err.to_string())
    } else {
        RepositoryError::Backend(err.to_string())
    }
}

fn map_create_sqlx(err: sqlx::Error, external_id: &str) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return RepositoryError::DuplicateExternalId(external_id.to_string());
        }
    }
    map_sqlx(err)
}

// 40001 = serialization_failure, 40P01 = deadlock_detected.
fn is_serialization_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
    )
}
