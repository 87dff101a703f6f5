//! Order lifecycle transitions triggered by the payment flow.
//!
//! Orders are created by the shop's own checkout; this service only
//! moves them to their terminal payment outcome. An order never goes
//! back to WAITING_PAY once accepted or cancelled.

use std::sync::Arc;

use crate::domain::{Order, OrderState};
use crate::ports::{OrderRepository, RepositoryResult};

#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
}

impl OrderService {
    pub fn new(orders: Arc<dyn OrderRepository>) -> Self {
        Self { orders }
    }

    pub async fn find(&self, id: i64) -> RepositoryResult<Option<Order>> {
        self.orders.find(id).await
    }

    /// Marks the order paid. Called exactly once per successful
    /// payment; the transaction CAS upstream guarantees the once.
    pub async fn approve(&self, id: i64) -> RepositoryResult<()> {
        self.orders
            .set_state(id, OrderState::Accepted, "approve")
            .await?;
        tracing::info!(order_id = id, "order approved");
        Ok(())
    }

    pub async fn decline(&self, id: i64) -> RepositoryResult<()> {
        self.orders
            .set_state(id, OrderState::Cancelled, "decline")
            .await?;
        tracing::info!(order_id = id, "order declined");
        Ok(())
    }
}
