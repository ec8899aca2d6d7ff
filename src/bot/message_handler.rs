//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::debug;

use super::dispatcher::ConversationDispatcher;

/// Entry point for every incoming message
///
/// Generation work is detached; the endpoint returns as soon as the
/// dispatcher has routed the message.
pub async fn message_handler(msg: Message, dispatcher: Arc<ConversationDispatcher>) -> Result<()> {
    let user = msg.chat.id.0;

    match msg.text() {
        Some(text) => {
            debug!(user_id = %user, text_len = text.len(), "Received text message");
            dispatcher.handle_text(user, text).await?;
        }
        None => {
            debug!(user_id = %user, "Received message without text");
            dispatcher.handle_unsupported(user).await?;
        }
    }

    Ok(())
}
