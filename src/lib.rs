pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod protocol;
pub mod services;

use axum::{
    routing::{get, post},
    Router,
};

use crate::middleware::auth::Credentials;
use crate::services::MerchantService;

#[derive(Clone)]
pub struct AppState {
    pub merchant: MerchantService,
    pub credentials: Credentials,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payme", post(handlers::merchant::callback))
        .with_state(state)
}
