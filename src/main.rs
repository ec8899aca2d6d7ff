use anyhow::{Context, Result};
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use imagewiki_bot::bot::{self, ConversationDispatcher, TelegramTransport};
use imagewiki_bot::config::{BotConfig, LogFormat};
use imagewiki_bot::encyclopedia::WikipediaClient;
use imagewiki_bot::image_job::ImageJobClient;
use imagewiki_bot::user_state::InMemoryUserStore;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = BotConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting Image & Wiki Telegram Bot");

    tokio::fs::create_dir_all(&config.users_data_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create users data directory {}",
                config.users_data_dir.display()
            )
        })?;
    info!(data_dir = %config.users_data_dir.display(), "Users data directory ready");

    let bot = Bot::new(&config.telegram_token);

    let images = ImageJobClient::new(config.image_api.clone())
        .context("Failed to build image API client")?;
    let encyclopedia = WikipediaClient::new(config.wikipedia_url.clone(), config.wikipedia_timeout)
        .context("Failed to build Wikipedia client")?;

    let dispatcher = Arc::new(ConversationDispatcher::new(
        Arc::new(InMemoryUserStore::new()),
        Arc::new(images),
        Arc::new(encyclopedia),
        Arc::new(TelegramTransport::new(bot.clone())),
        config.users_data_dir.clone(),
    ));

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(bot::message_handler))
        .branch(Update::filter_callback_query().endpoint(bot::callback_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![dispatcher])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
