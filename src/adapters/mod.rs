pub mod postgres;
pub mod telegram;

pub use postgres::{PostgresOrderRepository, PostgresReasonRepository, PostgresTransactionRepository};
pub use telegram::TelegramNotifier;
