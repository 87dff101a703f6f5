//! Order entity and its lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle of a merchant order as the payment flow sees it.
/// Stored as the numeric code the reference deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub enum OrderState {
    WaitingPay,
    InProgress,
    Accepted,
    Cancelled,
}

impl OrderState {
    pub fn as_i16(self) -> i16 {
        match self {
            OrderState::WaitingPay => 0,
            OrderState::InProgress => 1,
            OrderState::Accepted => 2,
            OrderState::Cancelled => -1,
        }
    }
}

impl From<OrderState> for i16 {
    fn from(state: OrderState) -> Self {
        state.as_i16()
    }
}

impl TryFrom<i16> for OrderState {
    type Error = String;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OrderState::WaitingPay),
            1 => Ok(OrderState::InProgress),
            2 => Ok(OrderState::Accepted),
            -1 => Ok(OrderState::Cancelled),
            other => Err(format!("unknown order state code {other}")),
        }
    }
}

/// A single cart position. `price` and `discount` are in the major
/// currency unit, matching how the shop records them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<i64>,
    pub vat_percent: i64,
    pub code: String,
    pub package_code: String,
}

impl CartLine {
    /// Line total in the major unit: count × unit price − discount.
    pub fn total(&self) -> i64 {
        self.count * self.price - self.discount.unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: i64,
    pub amount: i64,
    pub cart: Vec<CartLine>,
    pub state: OrderState,
    pub status: String,
    /// Buyer chat reference for payment notifications.
    pub user_ref: Option<i64>,
    /// Operator-side message reference for status label updates.
    pub display_ref: Option<i64>,
}

/// Receipt line as the provider's fiscalization API expects it.
/// Monetary fields are scaled to the minor unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalItem {
    pub title: String,
    pub price: i64,
    pub count: i64,
    pub code: String,
    pub package_code: String,
    pub vat_percent: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiscalDetail {
    pub receipt_type: i32,
    pub items: Vec<FiscalItem>,
}

impl Order {
    /// Derives the fiscal receipt detail from the cart. Pure data
    /// transformation; prices use the per-line total, not the unit
    /// price, scaled to the minor unit.
    pub fn fiscal_detail(&self) -> FiscalDetail {
        let items = self
            .cart
            .iter()
            .map(|line| FiscalItem {
                title: line.name.clone(),
                price: line.total() * 100,
                count: line.count,
                code: line.code.clone(),
                package_code: line.package_code.clone(),
                vat_percent: line.vat_percent,
                discount: line.discount.map(|d| d * 100),
            })
            .collect();

        FiscalDetail {
            receipt_type: 0,
            items,
        }
    }
}
