// Operator notification over Telegram
use serde_json::json;
use tracing::{debug, warn};

use crate::config::TelegramConfig;

/// Pushes one-line status messages to the configured Telegram channel.
/// Notification failures are logged and never propagate; absent credentials
/// disable the notifier entirely.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    telegram: Option<TelegramConfig>,
}

impl Notifier {
    pub fn new(telegram: Option<TelegramConfig>) -> Self {
        Self {
            http: reqwest::Client::new(),
            telegram,
        }
    }

    pub async fn send(&self, text: &str) {
        let Some(telegram) = &self.telegram else {
            debug!("telegram credentials not configured; skipping notification");
            return;
        };

        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            telegram.bot_token
        );
        let payload = json!({ "chat_id": telegram.channel_id, "text": text });

        match self.http.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("notification delivered");
            }
            Ok(response) => warn!("telegram returned status {}", response.status()),
            Err(e) => warn!("failed to send notification: {}", e),
        }
    }
}
