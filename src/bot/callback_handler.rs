//! Callback Handler module for inline keyboard button presses

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{debug, warn};

use super::dispatcher::ConversationDispatcher;

/// Handle callback queries from inline keyboards
pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    dispatcher: Arc<ConversationDispatcher>,
) -> Result<()> {
    // Buttons live in private chats, so the chat id is the user id
    let sender = q
        .message
        .as_ref()
        .map(|message| message.chat().id.0)
        .unwrap_or(q.from.id.0 as i64);
    debug!(user_id = %sender, "Received callback query");

    let outcome = match q.data.as_deref() {
        Some(data) => dispatcher.handle_callback(sender, data).await.map(|_| ()),
        None => {
            warn!(user_id = %sender, "Callback query without data");
            Ok(())
        }
    };

    // Answer the callback query to remove the loading state
    bot.answer_callback_query(q.id).await?;

    outcome
}
