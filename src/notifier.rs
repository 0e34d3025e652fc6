//! Outbound chat notifications (§4.5). Every error is logged and swallowed — a
//! notification failure must never affect a script's result path.

use std::time::Duration;

use tracing::warn;

use crate::{catalog::Catalog, error::NotifierError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends one-line chat messages to the configured vendor endpoint.
pub struct Notifier {
    client: reqwest::blocking::Client,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to build HTTP client"),
        }
    }

    /// Reads chat credentials from settings and sends `text`, logging and swallowing any
    /// failure. A no-op (not an error) when credentials are absent.
    pub fn notify_best_effort(&self, catalog: &Catalog, text: &str) {
        match self.notify_from_settings(catalog, text) {
            Ok(()) => {}
            Err(NotifierError::NotConfigured) => {}
            Err(err) => warn!(%err, "notification failed"),
        }
    }

    fn notify_from_settings(&self, catalog: &Catalog, text: &str) -> Result<(), NotifierError> {
        let token = catalog
            .get_setting("tg_bot_token")
            .ok()
            .flatten()
            .filter(|value| !value.is_empty());
        let chat_id = catalog
            .get_setting("tg_chat_id")
            .ok()
            .flatten()
            .filter(|value| !value.is_empty());
        let (token, chat_id) = match (token, chat_id) {
            (Some(token), Some(chat_id)) => (token, chat_id),
            _ => return Err(NotifierError::NotConfigured),
        };
        let proxy = catalog.get_setting("tg_proxy").ok().flatten();

        self.send(&token, &chat_id, text, proxy.as_deref())
    }

    /// Sends an arbitrary message with explicit credentials, used by the one-shot
    /// "test notification" CLI/API path (§6 `POST /test-tg`).
    pub fn send(
        &self,
        bot_token: &str,
        chat_id: &str,
        text: &str,
        proxy: Option<&str>,
    ) -> Result<(), NotifierError> {
        let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
        let mut request = self.client.post(&url).json(&serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        }));

        if let Some(proxy_url) = proxy.filter(|value| !value.is_empty())
            && let Ok(proxy) = reqwest::Proxy::all(proxy_url)
        {
            let client = reqwest::blocking::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .proxy(proxy)
                .build()?;
            request = client.post(&url).json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
            }));
        }

        request.send()?;
        Ok(())
    }
}
