//! Alert delivery
//!
//! Each recipient gets exactly one delivery attempt; failures are logged and
//! reported back to the caller, never retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use crate::error::NotifyError;

/// Default Telegram Bot API endpoint
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Outcome of delivering one message to one recipient
#[derive(Debug)]
pub struct DeliveryReport {
    pub recipient: String,
    pub result: Result<(), NotifyError>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> bool {
        self.result.is_ok()
    }
}

/// Sends a text message to a list of recipients
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipients: &[String], text: &str) -> Vec<DeliveryReport>;
}

/// Notifier posting through the Telegram Bot API `sendMessage` method
pub struct TelegramNotifier {
    client: Client,
    api_url: Url,
    token: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_api_url(token, DEFAULT_TELEGRAM_API_URL)
    }

    /// Create a notifier against a custom API base URL (for testing)
    pub fn with_api_url(token: impl Into<String>, api_url: &str) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let api_url = Url::parse(api_url)?;
        if api_url.cannot_be_a_base() {
            return Err(NotifyError::NotABase(api_url.to_string()));
        }

        Ok(Self {
            client,
            api_url,
            token: token.into(),
        })
    }

    async fn send_one(&self, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        // Tokens contain ':', so they are pushed as segments rather than joined
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| NotifyError::NotABase(self.api_url.to_string()))?
            .pop_if_empty()
            .push(&format!("bot{}", self.token))
            .push("sendMessage");

        let response = self
            .client
            .get(url)
            .query(&[("chat_id", chat_id), ("text", text)])
            .send()
            .await
            // The request URL carries the bot token
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, recipients: &[String], text: &str) -> Vec<DeliveryReport> {
        let mut reports = Vec::with_capacity(recipients.len());

        for chat_id in recipients {
            let result = self.send_one(chat_id, text).await;
            match &result {
                Ok(()) => info!(chat_id = %chat_id, "Notification delivered"),
                Err(e) => warn!(chat_id = %chat_id, error = %e, "Failed to deliver notification"),
            }
            reports.push(DeliveryReport {
                recipient: chat_id.clone(),
                result,
            });
        }

        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn test_send_delivers_to_each_recipient() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/botsecret/sendMessage")
            .match_query(Matcher::UrlEncoded("text".into(), "disk full".into()))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .expect(2)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_api_url("secret", &server.url()).unwrap();
        let recipients = vec!["100".to_string(), "200".to_string()];

        let reports = notifier.send(&recipients, "disk full").await;

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(DeliveryReport::delivered));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_recipient_does_not_stop_others() {
        let mut server = Server::new_async().await;
        let rejected = server
            .mock("GET", "/botsecret/sendMessage")
            .match_query(Matcher::UrlEncoded("chat_id".into(), "1".into()))
            .with_status(400)
            .with_body(r#"{"ok":false,"description":"chat not found"}"#)
            .expect(1)
            .create_async()
            .await;
        let accepted = server
            .mock("GET", "/botsecret/sendMessage")
            .match_query(Matcher::UrlEncoded("chat_id".into(), "2".into()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_api_url("secret", &server.url()).unwrap();
        let reports = notifier
            .send(&["1".to_string(), "2".to_string()], "cpu high")
            .await;

        assert!(matches!(
            reports[0].result,
            Err(NotifyError::Status { status: 400, .. })
        ));
        assert!(reports[1].delivered());
        rejected.assert_async().await;
        accepted.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_with_real_shaped_token() {
        let token = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw";
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", format!("/bot{}/sendMessage", token).as_str())
            .match_query(Matcher::UrlEncoded("chat_id".into(), "42".into()))
            .with_status(200)
            .with_body(r#"{"ok":true}"#)
            .expect(1)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_api_url(token, &server.url()).unwrap();
        let reports = notifier.send(&["42".to_string()], "cpu high").await;

        assert!(reports[0].delivered(), "{:?}", reports[0].result);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_url_with_path_prefix() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/telegram/bot1:abc/sendMessage")
            .match_query(Matcher::Any)
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let base = format!("{}/telegram/", server.url());
        let notifier = TelegramNotifier::with_api_url("1:abc", &base).unwrap();
        let reports = notifier.send(&["7".to_string()], "disk full").await;

        assert!(reports[0].delivered());
        mock.assert_async().await;
    }

    #[test]
    fn test_non_base_api_url_rejected() {
        assert!(matches!(
            TelegramNotifier::with_api_url("t", "mailto:ops@example.com"),
            Err(NotifyError::NotABase(_))
        ));
    }

    #[test]
    fn test_invalid_api_url() {
        assert!(TelegramNotifier::with_api_url("t", "not a url").is_err());
    }
}
