//! Bot module for handling Telegram interactions
//!
//! - `dispatcher`: routes text and button presses to the right handler
//! - `message_handler` / `callback_handler`: teloxide endpoints feeding the dispatcher
//! - `transport`: outbound messages, behind a trait so the dispatcher can be tested
//! - `callback_payload`: inline button payload codec
//! - `gallery`: paged gallery rendering
//! - `ui_builder`: keyboards and message formatting

pub mod callback_handler;
pub mod callback_payload;
pub mod dispatcher;
pub mod gallery;
pub mod message_handler;
pub mod transport;
pub mod ui_builder;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

pub use callback_payload::CallbackPayload;
pub use dispatcher::{ConversationDispatcher, Dispatch};
pub use transport::{BotTransport, MessageHandle, TelegramTransport};
pub use ui_builder::{InlineButton, MenuCommand};
