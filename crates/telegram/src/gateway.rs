//! Inbound message loop: long-poll, parse, dispatch, reply.
//!
//! Failures are contained per update. A bad command, a failed dispatch, or
//! an undeliverable reply never takes the loop down; only the stop handle
//! ends it.

use crate::client::{TelegramClient, Update};
use perp_pilot_core::types::ChatUserId;
use perp_pilot_engine::commands;
use perp_pilot_engine::handler::CommandHandler;
use perp_pilot_engine::submission::token_for_update;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Pause before re-polling after a transport failure.
const RETRY_BACKOFF: Duration = Duration::from_secs(3);

pub struct TelegramGateway {
    client: Arc<TelegramClient>,
    handler: Arc<CommandHandler>,
    should_stop: Arc<AtomicBool>,
}

impl TelegramGateway {
    #[must_use]
    pub fn new(client: Arc<TelegramClient>, handler: Arc<CommandHandler>) -> Self {
        Self {
            client,
            handler,
            should_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a handle to stop the polling loop.
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.should_stop.clone()
    }

    /// Runs the update loop until the stop handle is set.
    pub async fn run(self) {
        info!("Telegram gateway started");
        let mut offset = 0i64;

        while !self.should_stop.load(Ordering::SeqCst) {
            let updates = match self.client.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!("Update poll failed, backing off: {e:#}");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                self.process(update).await;
            }
        }
        info!("Telegram gateway stopping");
    }

    async fn process(&self, update: Update) {
        let Some((chat_user_id, text)) = inbound_text(&update) else {
            return;
        };

        let command = match commands::parse(&text) {
            Ok(Some(command)) => command,
            // Plain chatter, nothing to do.
            Ok(None) => return,
            Err(e) => {
                self.reply(chat_user_id, &format!("Sorry, {e}.")).await;
                return;
            }
        };

        // The token is derived from the update id, so a redelivery of the
        // same update cannot double-submit to the venue.
        let submission = token_for_update(update.update_id);
        let reply = match self.handler.handle(chat_user_id, command, submission).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(user = %chat_user_id, "Command dispatch failed: {e:#}");
                "Something went wrong while processing your request. Please try again later."
                    .to_string()
            }
        };
        self.reply(chat_user_id, &reply).await;
    }

    async fn reply(&self, chat_user_id: ChatUserId, text: &str) {
        if let Err(e) = self.client.send_message(chat_user_id.0, text).await {
            warn!(user = %chat_user_id, "Reply delivery failed: {e:#}");
        }
    }
}

/// The chat id and message text of an update, if it carries any.
fn inbound_text(update: &Update) -> Option<(ChatUserId, String)> {
    let message = update.message.as_ref()?;
    let text = message.text.as_ref()?;
    Some((ChatUserId(message.chat.id), text.clone()))
}
