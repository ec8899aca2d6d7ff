//! # Configuration Module
//!
//! This module defines the bot configuration: credentials, remote endpoints,
//! polling budget and image parameters. Values are read from the environment
//! once at startup and never change afterwards.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// Constants for the image generation API
pub const DEFAULT_API_URL: &str = "https://api-key.fusionbrain.ai/";
pub const DEFAULT_WIKIPEDIA_URL: &str = "https://ru.wikipedia.org";
pub const DEFAULT_USERS_DATA_DIR: &str = "users_data";
pub const DEFAULT_IMAGE_SIZE: u32 = 1024;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_POLL_DELAY_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Polling budget for a submitted generation job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Maximum number of status requests
    pub max_attempts: u32,
    /// Fixed delay between two status requests
    pub delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_POLL_DELAY_SECS),
        }
    }
}

/// Settings for the text-to-image job API
#[derive(Debug, Clone)]
pub struct ImageApiConfig {
    /// Base URL of the API, e.g. `https://api-key.fusionbrain.ai/`
    pub base_url: String,
    pub api_key: String,
    pub secret_key: String,
    /// Images requested per generation
    pub images_per_request: u32,
    pub width: u32,
    pub height: u32,
    pub poll: PollConfig,
    /// Upper bound for a single HTTP request, status polls included
    pub request_timeout: Duration,
}

impl Default for ImageApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            secret_key: String::new(),
            images_per_request: 1,
            width: DEFAULT_IMAGE_SIZE,
            height: DEFAULT_IMAGE_SIZE,
            poll: PollConfig::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Log output format selected with `LOG_FORMAT`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Complete bot configuration
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: String,
    pub image_api: ImageApiConfig,
    /// Base URL of the MediaWiki instance used for lookups
    pub wikipedia_url: String,
    /// Upper bound for a single encyclopedia request
    pub wikipedia_timeout: Duration,
    /// Root directory for per-user image folders
    pub users_data_dir: PathBuf,
    pub log_format: LogFormat,
}

impl BotConfig {
    /// Load the configuration from environment variables
    ///
    /// Call `dotenv::dotenv()` beforehand to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("{key} must be set"))
        };

        let poll = PollConfig {
            max_attempts: parse_or(&lookup, "GENERATION_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?,
            delay: Duration::from_secs(parse_or(
                &lookup,
                "GENERATION_POLL_DELAY_SECS",
                DEFAULT_POLL_DELAY_SECS,
            )?),
        };
        if poll.max_attempts == 0 {
            return Err(anyhow!("GENERATION_MAX_ATTEMPTS must be at least 1"));
        }

        let request_timeout = Duration::from_secs(parse_or(
            &lookup,
            "HTTP_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        if request_timeout.is_zero() {
            return Err(anyhow!("HTTP_REQUEST_TIMEOUT_SECS must be at least 1"));
        }

        let image_api = ImageApiConfig {
            base_url: lookup("FUSIONBRAIN_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: required("FUSIONBRAIN_API_KEY")?,
            secret_key: required("FUSIONBRAIN_SECRET_KEY")?,
            images_per_request: parse_or(&lookup, "IMAGES_PER_REQUEST", 1)?,
            width: parse_or(&lookup, "IMAGE_WIDTH", DEFAULT_IMAGE_SIZE)?,
            height: parse_or(&lookup, "IMAGE_HEIGHT", DEFAULT_IMAGE_SIZE)?,
            poll,
            request_timeout,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            telegram_token: required("TELEGRAM_BOT_TOKEN")?,
            image_api,
            wikipedia_url: lookup("WIKIPEDIA_URL")
                .unwrap_or_else(|| DEFAULT_WIKIPEDIA_URL.to_string()),
            wikipedia_timeout: request_timeout,
            users_data_dir: PathBuf::from(
                lookup("USERS_DATA_DIR").unwrap_or_else(|| DEFAULT_USERS_DATA_DIR.to_string()),
            ),
            log_format,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        None => Ok(default),
    }
}
