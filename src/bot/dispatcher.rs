//! Conversation dispatcher: routes every inbound event to exactly one handler
//!
//! Free text goes to the handler named by the user's pending expectation if
//! one is set, otherwise it is matched against the menu. Inline button presses
//! arrive as callback payloads. Image generation runs in its own task so that
//! a slow job never holds up other events.

use anyhow::Result;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::encyclopedia::Encyclopedia;
use crate::errors::GenerationError;
use crate::image_job::{decode_and_store, ImageGenerator};
use crate::localization::{t, t_args};
use crate::user_state::{CounterKind, Expectation, UserId, UserRepository};

use super::callback_payload::CallbackPayload;
use super::gallery::{self, GalleryView};
use super::transport::BotTransport;
use super::ui_builder::{
    format_gallery_caption, format_helper, format_stats, gallery_controls, generation_actions,
    MenuCommand,
};

/// Character that marks a generation prompt
pub const PROMPT_TRIGGER: char = '!';

/// Outcome of dispatching one event
#[derive(Debug)]
pub enum Dispatch {
    /// The event was fully handled
    Done,
    /// Work continues in a background task
    Spawned(JoinHandle<()>),
}

/// Strip the leading trigger character from a generation prompt
///
/// Surrounding whitespace is dropped; the rest is kept verbatim.
pub fn strip_trigger(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix(PROMPT_TRIGGER).unwrap_or(text)
}

fn generation_failure_message(error: &GenerationError) -> String {
    match error {
        GenerationError::Timeout(_) => t("error-generation-timeout"),
        _ => t("error-generation-failed"),
    }
}

#[derive(Clone)]
pub struct ConversationDispatcher {
    users: Arc<dyn UserRepository>,
    images: Arc<dyn ImageGenerator>,
    encyclopedia: Arc<dyn Encyclopedia>,
    transport: Arc<dyn BotTransport>,
    data_dir: PathBuf,
}

impl ConversationDispatcher {
    pub fn new(
        users: Arc<dyn UserRepository>,
        images: Arc<dyn ImageGenerator>,
        encyclopedia: Arc<dyn Encyclopedia>,
        transport: Arc<dyn BotTransport>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            users,
            images,
            encyclopedia,
            transport,
            data_dir: data_dir.into(),
        }
    }

    /// Handle a free-text message
    pub async fn handle_text(&self, user: UserId, text: &str) -> Result<Dispatch> {
        if let Some(expectation) = self.users.take_pending_expectation(user) {
            debug!(user_id = %user, expectation = ?expectation, "Routing reply to pending prompt");
            return match expectation {
                Expectation::ImagePrompt => self.handle_image_prompt(user, text).await,
                Expectation::WikiQuery => {
                    self.handle_wiki_query(user, text).await?;
                    Ok(Dispatch::Done)
                }
            };
        }

        if text == "/start" || text == "/help" {
            self.transport.send_menu(user, &t("welcome")).await?;
            return Ok(Dispatch::Done);
        }

        match MenuCommand::from_text(text) {
            Some(MenuCommand::GenerateImage) => {
                self.transport
                    .send_text(user, &t("ask-image-prompt"))
                    .await?;
                self.users
                    .set_pending_expectation(user, Some(Expectation::ImagePrompt));
            }
            Some(MenuCommand::WikiLookup) => {
                self.transport.send_text(user, &t("ask-wiki-query")).await?;
                self.users
                    .set_pending_expectation(user, Some(Expectation::WikiQuery));
            }
            Some(MenuCommand::Statistics) => {
                let record = self.users.get_or_create(user);
                self.transport
                    .send_text(user, &format_stats(&record))
                    .await?;
            }
            Some(MenuCommand::Gallery) => self.show_gallery(user, 0).await?,
            Some(MenuCommand::Helper) => {
                self.transport.send_text(user, &format_helper()).await?;
            }
            None => {
                debug!(user_id = %user, "Unrecognized text outside of a prompt");
                self.transport
                    .send_text(user, &t("choose-menu-option"))
                    .await?;
            }
        }

        Ok(Dispatch::Done)
    }

    /// Reply to a message without text; a pending expectation is left in place
    pub async fn handle_unsupported(&self, user: UserId) -> Result<Dispatch> {
        self.transport
            .send_text(user, &t("choose-menu-option"))
            .await?;
        Ok(Dispatch::Done)
    }

    /// Handle an inline button press
    pub async fn handle_callback(&self, sender: UserId, data: &str) -> Result<Dispatch> {
        let payload = match data.parse::<CallbackPayload>() {
            Ok(payload) if payload.user() == sender => payload,
            Ok(payload) => {
                warn!(user_id = %sender, payload_user = payload.user(), "Callback payload for another user");
                self.transport
                    .send_text(sender, &t("error-corrupted-data"))
                    .await?;
                return Ok(Dispatch::Done);
            }
            Err(e) => {
                warn!(user_id = %sender, error = %e, "Rejected callback payload");
                self.transport
                    .send_text(sender, &t("error-corrupted-data"))
                    .await?;
                return Ok(Dispatch::Done);
            }
        };

        match payload {
            CallbackPayload::Add { index, .. } => {
                self.add_to_gallery(sender, index).await?;
                Ok(Dispatch::Done)
            }
            CallbackPayload::Retry { prompt, .. } => {
                let command = format!("{PROMPT_TRIGGER}{prompt}");
                self.transport
                    .send_text(sender, &t_args("regenerating", &[("prompt", &command)]))
                    .await?;
                self.handle_image_prompt(sender, &command).await
            }
            CallbackPayload::GalleryNav { index, .. } => {
                self.show_gallery(sender, index).await?;
                Ok(Dispatch::Done)
            }
        }
    }

    async fn handle_image_prompt(&self, user: UserId, text: &str) -> Result<Dispatch> {
        let prompt = strip_trigger(text);
        if prompt.trim().is_empty() {
            self.transport.send_text(user, &t("empty-prompt")).await?;
            return Ok(Dispatch::Done);
        }

        let dispatcher = self.clone();
        let prompt = prompt.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = dispatcher.generate_and_deliver(user, &prompt).await {
                error!(user_id = %user, error = %e, "Image generation request failed");
            }
        });
        Ok(Dispatch::Spawned(handle))
    }

    /// Generate images for `prompt`, store them and send them with their controls
    ///
    /// The progress message is removed whatever the outcome.
    pub async fn generate_and_deliver(&self, user: UserId, prompt: &str) -> Result<()> {
        info!(user_id = %user, prompt_len = prompt.len(), "Starting image generation");
        let progress = self.transport.send_text(user, &t("generating")).await?;

        let outcome = self.run_generation(user, prompt).await;

        if let Err(e) = self.transport.delete_message(user, progress).await {
            warn!(user_id = %user, error = %e, "Failed to delete progress message");
        }
        outcome
    }

    async fn run_generation(&self, user: UserId, prompt: &str) -> Result<()> {
        let images = match self.images.generate(prompt).await {
            Ok(images) => images,
            Err(e) => {
                warn!(user_id = %user, error = %e, "Image generation failed");
                self.transport
                    .send_text(user, &generation_failure_message(&e))
                    .await?;
                return Ok(());
            }
        };

        if images.is_empty() {
            warn!(user_id = %user, "Generation finished without images");
            self.transport.send_text(user, &t("error-no-images")).await?;
            return Ok(());
        }

        let batch_dir = self.batch_dir(user);
        let mut delivered = 0usize;

        for (n, payload) in images.into_iter().enumerate() {
            let path = batch_dir.join(format!("generated_image_{n}.jpg"));
            if let Err(e) = store_image(payload, path.clone()).await {
                warn!(user_id = %user, image = n, error = %e, "Skipping undeliverable image");
                let notice = t_args("error-image-decode", &[("number", &(n + 1).to_string())]);
                if let Err(e) = self.transport.send_text(user, &notice).await {
                    warn!(user_id = %user, image = n, error = %e, "Failed to send image notice");
                }
                continue;
            }

            // Only images the user actually received go to the gallery
            if let Err(e) = self.transport.send_photo(user, &path).await {
                warn!(user_id = %user, image = n, error = %e, "Failed to send generated image");
                continue;
            }

            let gallery_index = self.users.append_gallery_image(user, path);
            let actions = generation_actions(user, gallery_index, prompt);
            if let Err(e) = self
                .transport
                .send_actions(user, &t("choose-action"), &actions)
                .await
            {
                warn!(user_id = %user, image = n, error = %e, "Failed to send image actions");
            }
            delivered += 1;
        }

        if delivered > 0 {
            let total = self
                .users
                .increment_counter(user, CounterKind::ImageRequests);
            info!(user_id = %user, delivered, image_requests = total, "Image generation delivered");
        }
        Ok(())
    }

    /// Directory for one generation batch, unique per user and request
    fn batch_dir(&self, user: UserId) -> PathBuf {
        let sequence = self.users.next_batch(user);
        self.data_dir.join(user.to_string()).join(format!(
            "batch_{}_{sequence}",
            Utc::now().format("%Y%m%d%H%M%S")
        ))
    }

    async fn handle_wiki_query(&self, user: UserId, query: &str) -> Result<()> {
        let reply = match self.encyclopedia.lookup(query.trim()).await {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                debug!(user_id = %user, "No encyclopedia article found");
                t("wiki-not-found")
            }
            Err(e) => {
                warn!(user_id = %user, error = %e, "Encyclopedia lookup failed");
                self.transport
                    .send_text(user, &t("error-wiki-failed"))
                    .await?;
                return Ok(());
            }
        };

        self.transport.send_text(user, &reply).await?;
        self.users
            .increment_counter(user, CounterKind::WikiRequests);
        Ok(())
    }

    async fn show_gallery(&self, user: UserId, index: usize) -> Result<()> {
        match gallery::render(self.users.as_ref(), user, index) {
            GalleryView::Empty => {
                self.transport.send_text(user, &t("gallery-empty")).await?;
            }
            GalleryView::Unavailable { index, total } => {
                debug!(user_id = %user, index, total, "Gallery index out of range");
                self.transport
                    .send_text(user, &t("gallery-unavailable"))
                    .await?;
            }
            GalleryView::Page(page) => {
                if !file_exists(&page.image).await {
                    warn!(user_id = %user, path = %page.image.display(), "Gallery image missing on disk");
                    self.transport
                        .send_text(user, &t("error-image-missing"))
                        .await?;
                    return Ok(());
                }
                self.transport.send_photo(user, &page.image).await?;
                self.transport
                    .send_actions(user, &format_gallery_caption(&page), &gallery_controls(&page))
                    .await?;
            }
        }
        Ok(())
    }

    async fn add_to_gallery(&self, user: UserId, index: usize) -> Result<()> {
        let Some(path) = self.users.gallery_image(user, index) else {
            let key = if self.users.gallery_len(user) == 0 {
                "error-no-saved-images"
            } else {
                "error-image-missing"
            };
            self.transport.send_text(user, &t(key)).await?;
            return Ok(());
        };

        if !file_exists(&path).await {
            warn!(user_id = %user, path = %path.display(), "Image to add is missing on disk");
            self.transport
                .send_text(user, &t("error-image-missing"))
                .await?;
            return Ok(());
        }

        let new_index = self.users.append_gallery_image(user, path);
        self.transport
            .send_text(
                user,
                &t_args("gallery-added", &[("number", &(new_index + 1).to_string())]),
            )
            .await?;
        Ok(())
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Decode and write one image off the async runtime
async fn store_image(payload: String, path: PathBuf) -> Result<(), GenerationError> {
    tokio::task::spawn_blocking(move || decode_and_store(&payload, &path))
        .await
        .map_err(|e| GenerationError::Storage(format!("image task failed: {e}")))?
}
