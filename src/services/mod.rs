pub mod merchant;
pub mod order;

pub use merchant::MerchantService;
pub use order::OrderService;
