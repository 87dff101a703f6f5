use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payme_merchant::adapters::{
    PostgresOrderRepository, PostgresReasonRepository, PostgresTransactionRepository,
    TelegramNotifier,
};
use payme_merchant::config::Config;
use payme_merchant::middleware::auth::Credentials;
use payme_merchant::services::{MerchantService, OrderService};
use payme_merchant::{create_app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    let migrator = Migrator::new(Path::new("./migrations")).await?;
    migrator.run(&pool).await?;
    tracing::info!("database migrations completed");

    let orders = OrderService::new(Arc::new(PostgresOrderRepository::new(pool.clone())));
    let merchant = MerchantService::new(
        orders,
        Arc::new(PostgresTransactionRepository::new(pool.clone())),
        Arc::new(PostgresReasonRepository::new(pool.clone())),
        Arc::new(TelegramNotifier::new(
            config.telegram_bot_token.clone(),
            config.telegram_operator_chat,
        )),
    );

    let state = AppState {
        merchant,
        credentials: Credentials {
            login: config.merchant_login.clone(),
            key: config.merchant_key.clone(),
        },
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
