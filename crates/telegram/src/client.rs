//! Minimal Telegram Bot API client: long-polled `getUpdates` plus
//! `sendMessage`. Only the fields the gateway reads are deserialized.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use perp_pilot_core::traits::Notifier;
use perp_pilot_core::types::ChatUserId;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramClient {
    http_client: Client,
    base_url: String,
    poll_timeout_secs: u64,
}

impl TelegramClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(bot_token: &str, poll_timeout_secs: u64) -> Result<Self> {
        // Read timeout must outlast the server-side long-poll hold.
        let http_client = Client::builder()
            .timeout(Duration::from_secs(poll_timeout_secs + 10))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            http_client,
            base_url: format!("https://api.telegram.org/bot{bot_token}"),
            poll_timeout_secs,
        })
    }

    /// Long-polls for updates past `offset`. Blocks up to the configured
    /// timeout when nothing is queued.
    ///
    /// # Errors
    /// Returns an error on transport failure or an API-level rejection.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let url = format!(
            "{}/getUpdates?timeout={}&offset={offset}",
            self.base_url, self.poll_timeout_secs
        );
        let response: ApiResponse<Vec<Update>> = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("getUpdates request failed")?
            .json()
            .await
            .context("getUpdates response was not valid JSON")?;

        if !response.ok {
            bail!(
                "getUpdates rejected: {}",
                response.description.unwrap_or_else(|| "no detail".to_string())
            );
        }
        Ok(response.result.unwrap_or_default())
    }

    /// # Errors
    /// Returns an error on transport failure or an API-level rejection.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.base_url);
        let response: ApiResponse<serde_json::Value> = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .context("sendMessage request failed")?
            .json()
            .await
            .context("sendMessage response was not valid JSON")?;

        if !response.ok {
            bail!(
                "sendMessage rejected: {}",
                response.description.unwrap_or_else(|| "no detail".to_string())
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn notify(&self, chat_id: ChatUserId, text: &str) -> Result<()> {
        self.send_message(chat_id.0, text).await
    }
}
