pub mod order;
pub mod transaction;

pub use order::{CartLine, FiscalDetail, FiscalItem, Order, OrderState};
pub use transaction::{CancellationReason, NewTransaction, Transaction, TransactionState};
