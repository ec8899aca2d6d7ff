//! Outbound side of the bot: everything the dispatcher can send to a user

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId};

use super::ui_builder::{main_menu_keyboard, to_inline_keyboard, InlineButton};
use crate::user_state::UserId;

/// Handle of a sent message, used to delete it later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle(pub i32);

/// Delivers bot output to a chat
#[async_trait]
pub trait BotTransport: Send + Sync {
    async fn send_text(&self, user: UserId, text: &str) -> Result<MessageHandle>;

    /// Send text together with the main menu reply keyboard
    async fn send_menu(&self, user: UserId, text: &str) -> Result<()>;

    async fn send_photo(&self, user: UserId, path: &Path) -> Result<()>;

    /// Send text with inline buttons; plain text when `rows` is empty
    async fn send_actions(&self, user: UserId, text: &str, rows: &[Vec<InlineButton>]) -> Result<()>;

    async fn delete_message(&self, user: UserId, message: MessageHandle) -> Result<()>;
}

/// Telegram implementation backed by a teloxide [`Bot`]
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl BotTransport for TelegramTransport {
    async fn send_text(&self, user: UserId, text: &str) -> Result<MessageHandle> {
        let sent = self.bot.send_message(ChatId(user), text).await?;
        Ok(MessageHandle(sent.id.0))
    }

    async fn send_menu(&self, user: UserId, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(user), text)
            .reply_markup(main_menu_keyboard())
            .await?;
        Ok(())
    }

    async fn send_photo(&self, user: UserId, path: &Path) -> Result<()> {
        self.bot
            .send_photo(ChatId(user), InputFile::file(path))
            .await?;
        Ok(())
    }

    async fn send_actions(&self, user: UserId, text: &str, rows: &[Vec<InlineButton>]) -> Result<()> {
        if rows.is_empty() {
            self.bot.send_message(ChatId(user), text).await?;
        } else {
            self.bot
                .send_message(ChatId(user), text)
                .reply_markup(to_inline_keyboard(rows))
                .await?;
        }
        Ok(())
    }

    async fn delete_message(&self, user: UserId, message: MessageHandle) -> Result<()> {
        self.bot
            .delete_message(ChatId(user), MessageId(message.0))
            .await?;
        Ok(())
    }
}
