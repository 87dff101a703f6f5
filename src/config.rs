use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    /// Login the provider authenticates with, "Paycom" by convention.
    pub merchant_login: String,
    pub merchant_key: String,
    pub telegram_bot_token: String,
    pub telegram_operator_chat: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            merchant_login: env::var("MERCHANT_LOGIN").unwrap_or_else(|_| "Paycom".to_string()),
            merchant_key: env::var("MERCHANT_KEY")?,
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN")?,
            telegram_operator_chat: env::var("TELEGRAM_OPERATOR_CHAT")?.parse()?,
        })
    }
}
