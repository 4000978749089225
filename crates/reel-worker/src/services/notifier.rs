//! Job notifications.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

/// Sends a short HTML-formatted message about a job.
///
/// Delivery problems are logged and never fail the job.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// `username` selects per-user credentials where supported.
    async fn notify(&self, username: Option<&str>, message: &str);
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _username: Option<&str>, message: &str) {
        debug!(message, "Notification dropped (no notifier configured)");
    }
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramCredentials {
    pub bot_token: String,
    pub chat_id: String,
}

/// Telegram Bot API `sendMessage`.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    api_base: String,
    default: Option<TelegramCredentials>,
    per_user: HashMap<String, TelegramCredentials>,
}

impl TelegramNotifier {
    pub const DEFAULT_API_BASE: &'static str = "https://api.telegram.org";

    pub fn new(api_base: impl Into<String>, default: Option<TelegramCredentials>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            default,
            per_user: HashMap::new(),
        }
    }

    pub fn with_user(mut self, username: &str, credentials: TelegramCredentials) -> Self {
        self.per_user.insert(username.to_lowercase(), credentials);
        self
    }

    /// `TELEGRAM_BOT_TOKEN`/`TELEGRAM_CHAT_ID` plus every
    /// `{USER}_BOT_TOKEN`/`{USER}_CHAT_ID` pair. `None` if nothing is set.
    pub fn from_env() -> Option<Self> {
        let vars: HashMap<String, String> = std::env::vars().filter(|(_, v)| !v.trim().is_empty()).collect();
        let api_base = vars
            .get("TELEGRAM_API_URL")
            .cloned()
            .unwrap_or_else(|| Self::DEFAULT_API_BASE.to_string());

        let mut notifier = Self::new(api_base, credentials_for_prefix(&vars, "TELEGRAM"));
        for key in vars.keys() {
            let Some(user) = key.strip_suffix("_BOT_TOKEN") else {
                continue;
            };
            if user == "TELEGRAM" || user.is_empty() {
                continue;
            }
            if let Some(credentials) = credentials_for_prefix(&vars, user) {
                notifier = notifier.with_user(user, credentials);
            }
        }

        if notifier.default.is_none() && notifier.per_user.is_empty() {
            return None;
        }
        Some(notifier)
    }

    /// Credentials for `username`, falling back to the default bot.
    pub fn credentials_for(&self, username: Option<&str>) -> Option<&TelegramCredentials> {
        username
            .and_then(|u| self.per_user.get(&u.to_lowercase()))
            .or(self.default.as_ref())
    }

    async fn send(&self, credentials: &TelegramCredentials, text: &str) -> Result<(), reqwest::Error> {
        self.http
            .post(format!("{}/bot{}/sendMessage", self.api_base, credentials.bot_token))
            .json(&json!({
                "chat_id": credentials.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

fn credentials_for_prefix(vars: &HashMap<String, String>, prefix: &str) -> Option<TelegramCredentials> {
    let bot_token = vars.get(&format!("{}_BOT_TOKEN", prefix))?;
    let chat_id = vars.get(&format!("{}_CHAT_ID", prefix))?;
    Some(TelegramCredentials {
        bot_token: bot_token.clone(),
        chat_id: chat_id.clone(),
    })
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, username: Option<&str>, message: &str) {
        let Some(credentials) = self.credentials_for(username) else {
            debug!(username = ?username, "No Telegram credentials, skipping notification");
            return;
        };

        if let Err(e) = self.send(credentials, message).await {
            // The token is part of the URL
            warn!(error = %e.without_url(), "Telegram notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(token: &str) -> TelegramCredentials {
        TelegramCredentials {
            bot_token: token.to_string(),
            chat_id: "1".to_string(),
        }
    }

    #[test]
    fn test_per_user_credentials_fall_back_to_default() {
        let notifier = TelegramNotifier::new("http://localhost", Some(creds("default"))).with_user("AMAN", creds("aman"));

        assert_eq!(notifier.credentials_for(Some("aman")).unwrap().bot_token, "aman");
        assert_eq!(notifier.credentials_for(Some("other")).unwrap().bot_token, "default");
        assert_eq!(notifier.credentials_for(None).unwrap().bot_token, "default");
    }

    #[test]
    fn test_credentials_need_both_vars() {
        let mut vars = HashMap::new();
        vars.insert("RAJ_BOT_TOKEN".to_string(), "t".to_string());
        assert!(credentials_for_prefix(&vars, "RAJ").is_none());
        vars.insert("RAJ_CHAT_ID".to_string(), "42".to_string());
        assert_eq!(credentials_for_prefix(&vars, "RAJ").unwrap().chat_id, "42");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & c > d"), "a &lt; b &amp; c &gt; d");
    }
}
