//! Transaction entity, its state diagram, and the expiration rule.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a CREATED transaction stays performable.
pub const EXPIRATION_HOURS: i64 = 12;

/// Provider taxonomy code for "cancelled by timeout".
pub const TIMEOUT_REASON_CODE: i32 = 4;

/// Transaction lifecycle per the provider protocol. The numeric codes
/// are the wire representation: 1, 2, -1, -2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum TransactionState {
    Created,
    Completed,
    Cancelled,
    CancelledAfterComplete,
}

impl TransactionState {
    pub fn as_i32(self) -> i32 {
        match self {
            TransactionState::Created => 1,
            TransactionState::Completed => 2,
            TransactionState::Cancelled => -1,
            TransactionState::CancelledAfterComplete => -2,
        }
    }

    /// An active transaction holds its order: no second transaction
    /// may be created for the same order while one exists.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            TransactionState::Created | TransactionState::Completed
        )
    }

    pub fn is_cancelled(self) -> bool {
        matches!(
            self,
            TransactionState::Cancelled | TransactionState::CancelledAfterComplete
        )
    }
}

impl From<TransactionState> for i32 {
    fn from(state: TransactionState) -> Self {
        state.as_i32()
    }
}

impl TryFrom<i32> for TransactionState {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(TransactionState::Created),
            2 => Ok(TransactionState::Completed),
            -1 => Ok(TransactionState::Cancelled),
            -2 => Ok(TransactionState::CancelledAfterComplete),
            other => Err(format!("unknown transaction state code {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: i64,
    /// Provider-issued idempotency key.
    pub external_id: String,
    pub order_id: i64,
    /// Amount in the minor currency unit, as received from the provider.
    pub amount: i64,
    /// Opaque account payload echoed back on statements.
    pub account: serde_json::Value,
    pub state: TransactionState,
    /// Provider-supplied timestamp of the originating request.
    pub time: DateTime<Utc>,
    pub create_time: DateTime<Utc>,
    pub perform_time: Option<DateTime<Utc>>,
    pub cancel_time: Option<DateTime<Utc>>,
    pub reason_code: Option<i32>,
}

impl Transaction {
    /// A CREATED transaction expires 12 hours after `create_time`.
    /// Evaluated lazily on access; there is no background sweep.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.create_time >= Duration::hours(EXPIRATION_HOURS)
    }
}

/// Payload for an atomic transaction insert.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub external_id: String,
    pub order_id: i64,
    pub amount: i64,
    pub account: serde_json::Value,
    pub time: DateTime<Utc>,
    pub create_time: DateTime<Utc>,
}

/// Provider-defined cancellation reason. Read-only reference data.
#[derive(Debug, Clone)]
pub struct CancellationReason {
    pub id: i64,
    pub code: i32,
    pub description: String,
}
