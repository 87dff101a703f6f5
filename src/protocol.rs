//! Wire envelope and per-method payload shapes of the provider's
//! callback protocol. Timestamps travel as Unix epoch milliseconds;
//! unset perform/cancel times are reported as the `0` sentinel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::FiscalDetail;
use crate::error::{MerchantError, WireError};

pub const METHOD_CHECK_PERFORM: &str = "CheckPerformTransaction";
pub const METHOD_CREATE: &str = "CreateTransaction";
pub const METHOD_PERFORM: &str = "PerformTransaction";
pub const METHOD_CANCEL: &str = "CancelTransaction";
pub const METHOD_CHECK: &str = "CheckTransaction";
pub const METHOD_STATEMENT: &str = "GetStatement";

/// Inbound envelope: `{id, method, params}`.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Outbound success envelope.
#[derive(Debug, Serialize)]
pub struct RpcSuccess<T: Serialize> {
    pub id: i64,
    pub result: T,
}

/// Outbound failure envelope. Domain or system, always HTTP 200.
#[derive(Debug, Serialize)]
pub struct RpcFailure {
    pub id: i64,
    pub error: WireError,
}

/// The provider echoes this payload with every payment attempt; the
/// merchant contract requires it to carry the order reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    #[serde(deserialize_with = "de_flexible_i64")]
    pub order_id: i64,
}

impl Account {
    /// Pulls the order reference out of the opaque account payload.
    /// A payload without a usable `order_id` can never match an order.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, MerchantError> {
        serde_json::from_value(value.clone()).map_err(|_| MerchantError::OrderNotFound)
    }
}

// The sandbox sends account fields and reason codes as strings,
// production sends numbers. Accept both.
fn de_flexible_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckPerformParams {
    pub amount: i64,
    pub account: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct CreateParams {
    pub id: String,
    pub time: i64,
    pub amount: i64,
    pub account: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PerformParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelParams {
    pub id: String,
    #[serde(deserialize_with = "de_flexible_i64")]
    pub reason: i64,
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct StatementParams {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckPerformResponse {
    pub allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<FiscalDetail>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub transaction: String,
    pub create_time: i64,
    pub state: i32,
}

#[derive(Debug, Serialize)]
pub struct PerformResponse {
    pub transaction: String,
    pub perform_time: i64,
    pub state: i32,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub transaction: String,
    pub cancel_time: i64,
    pub state: i32,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub transaction: String,
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub state: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<i32>,
}

/// Statement line: the full transaction record keyed by the
/// provider's own id, used for reconciliation audits.
#[derive(Debug, Serialize)]
pub struct StatementEntry {
    pub id: String,
    pub time: i64,
    pub amount: i64,
    pub account: serde_json::Value,
    pub create_time: i64,
    pub perform_time: i64,
    pub cancel_time: i64,
    pub transaction: String,
    pub state: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct StatementResponse {
    pub transactions: Vec<StatementEntry>,
}

pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Optional timestamps use `0` on the wire, never null.
pub fn to_millis_or_zero(time: Option<DateTime<Utc>>) -> i64 {
    time.map(to_millis).unwrap_or(0)
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_accepts_string_and_numeric_order_id() {
        let from_num = Account::from_value(&serde_json::json!({ "order_id": 42 })).unwrap();
        let from_str = Account::from_value(&serde_json::json!({ "order_id": "42" })).unwrap();
        assert_eq!(from_num.order_id, 42);
        assert_eq!(from_str.order_id, 42);
    }

    #[test]
    fn account_without_order_id_is_order_not_found() {
        let err = Account::from_value(&serde_json::json!({ "phone": "998901234567" }));
        assert_eq!(err.unwrap_err(), MerchantError::OrderNotFound);
    }

    #[test]
    fn cancel_params_accept_string_reason() {
        let params: CancelParams =
            serde_json::from_value(serde_json::json!({ "id": "abc", "reason": "3" })).unwrap();
        assert_eq!(params.reason, 3);
    }

    #[test]
    fn unset_reason_is_absent_from_the_wire() {
        let fresh = CheckResponse {
            transaction: "1".to_string(),
            create_time: 1_700_000_000_000,
            perform_time: 0,
            cancel_time: 0,
            state: 1,
            reason: None,
        };
        let json = serde_json::to_value(&fresh).unwrap();
        assert!(json.get("reason").is_none());

        let cancelled = CheckResponse {
            reason: Some(3),
            state: -1,
            ..fresh
        };
        let json = serde_json::to_value(&cancelled).unwrap();
        assert_eq!(json["reason"], 3);
    }

    #[test]
    fn millis_roundtrip_and_zero_sentinel() {
        let now = Utc::now();
        let ms = to_millis(now);
        assert_eq!(to_millis(from_millis(ms).unwrap()), ms);
        assert_eq!(to_millis_or_zero(None), 0);
    }
}
