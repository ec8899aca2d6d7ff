//! # Image & Wiki Telegram Bot
//!
//! A Telegram bot that turns text prompts into images through a remote
//! text-to-image job API, keeps a per-user gallery of the results, and answers
//! encyclopedia queries with short Wikipedia summaries.

pub mod bot;
pub mod config;
pub mod encyclopedia;
pub mod errors;
pub mod image_job;
pub mod localization;
pub mod user_state;
