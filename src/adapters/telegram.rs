//! Telegram Bot API notifier. Best-effort only: the merchant service
//! spawns these calls after the payment state is committed and logs
//! failures without retrying.

use async_trait::async_trait;

use crate::ports::Notifier;

#[derive(Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    base_url: String,
    token: String,
    operator_chat: i64,
}

impl TelegramNotifier {
    pub fn new(token: String, operator_chat: i64) -> Self {
        Self::with_base_url("https://api.telegram.org".to_string(), token, operator_chat)
    }

    /// Base URL is injectable for tests.
    pub fn with_base_url(base_url: String, token: String, operator_chat: i64) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
            operator_chat,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_user(&self, user_ref: i64, text: &str) -> anyhow::Result<()> {
        self.http
            .get(self.method_url("sendMessage"))
            .query(&[
                ("chat_id", user_ref.to_string()),
                ("text", text.to_string()),
                ("parse_mode", "HTML".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn notify_operator(&self, display_ref: i64, status_label: &str) -> anyhow::Result<()> {
        let reply_markup = serde_json::json!({
            "inline_keyboard": [[{ "text": status_label, "callback_data": "ignore" }]],
        });

        self.http
            .get(self.method_url("editMessageReplyMarkup"))
            .query(&[
                ("chat_id", self.operator_chat.to_string()),
                ("message_id", display_ref.to_string()),
                ("reply_markup", reply_markup.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_user_hits_send_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bottest-token/sendMessage")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("chat_id".into(), "777".into()),
                mockito::Matcher::UrlEncoded("text".into(), "Order #42 paid".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let notifier =
            TelegramNotifier::with_base_url(server.url(), "test-token".to_string(), 1000);
        notifier.notify_user(777, "Order #42 paid").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn notify_user_surfaces_http_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/bottest-token/sendMessage")
            .match_query(mockito::Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let notifier =
            TelegramNotifier::with_base_url(server.url(), "test-token".to_string(), 1000);
        assert!(notifier.notify_user(777, "hi").await.is_err());
    }

    #[tokio::test]
    async fn notify_operator_edits_reply_markup() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/bottest-token/editMessageReplyMarkup")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("chat_id".into(), "1000".into()),
                mockito::Matcher::UrlEncoded("message_id".into(), "555".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let notifier =
            TelegramNotifier::with_base_url(server.url(), "test-token".to_string(), 1000);
        notifier.notify_operator(555, "approve").await.unwrap();

        mock.assert_async().await;
    }
}
