//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};
use tracing::debug;

// Import localization
use crate::localization::{t, t_args};

use super::callback_payload::CallbackPayload;
use super::gallery::GalleryPage;
use crate::user_state::{UserId, UserRecord};

/// Inline button as seen by the dispatcher, independent of the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub data: String,
}

impl InlineButton {
    fn for_payload(text: String, payload: &CallbackPayload) -> Option<Self> {
        match payload.encode_for_button() {
            Some(data) => Some(Self { text, data }),
            None => {
                debug!(tag = payload.tag(), "Callback payload too long, button omitted");
                None
            }
        }
    }
}

/// Top-level menu entries shown on the reply keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    GenerateImage,
    WikiLookup,
    Statistics,
    Gallery,
    Helper,
}

impl MenuCommand {
    pub const ALL: [MenuCommand; 5] = [
        MenuCommand::GenerateImage,
        MenuCommand::WikiLookup,
        MenuCommand::Statistics,
        MenuCommand::Gallery,
        MenuCommand::Helper,
    ];

    fn message_key(self) -> &'static str {
        match self {
            MenuCommand::GenerateImage => "menu-generate",
            MenuCommand::WikiLookup => "menu-wiki",
            MenuCommand::Statistics => "menu-stats",
            MenuCommand::Gallery => "menu-gallery",
            MenuCommand::Helper => "menu-helper",
        }
    }

    pub fn label(self) -> String {
        t(self.message_key())
    }

    /// Exact match of incoming text against the menu labels
    pub fn from_text(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.label() == text)
    }
}

/// Create the reply keyboard with the main menu
pub fn main_menu_keyboard() -> KeyboardMarkup {
    let button = |command: MenuCommand| KeyboardButton::new(command.label());
    KeyboardMarkup::new(vec![
        vec![
            button(MenuCommand::GenerateImage),
            button(MenuCommand::WikiLookup),
        ],
        vec![
            button(MenuCommand::Statistics),
            button(MenuCommand::Gallery),
            button(MenuCommand::Helper),
        ],
    ])
    .resize_keyboard()
}

/// Buttons offered under a freshly generated image
///
/// The retry button is left out when the prompt is too long for a payload.
pub fn generation_actions(user: UserId, gallery_index: usize, prompt: &str) -> Vec<Vec<InlineButton>> {
    let add = InlineButton::for_payload(
        t("button-add"),
        &CallbackPayload::Add {
            user,
            index: gallery_index,
        },
    );
    let retry = InlineButton::for_payload(
        t("button-retry"),
        &CallbackPayload::Retry {
            user,
            prompt: prompt.to_string(),
        },
    );

    vec![add.into_iter().chain(retry).collect()]
}

/// Previous/next buttons for a gallery page
pub fn gallery_controls(page: &GalleryPage) -> Vec<Vec<InlineButton>> {
    let previous = page
        .previous
        .as_ref()
        .and_then(|payload| InlineButton::for_payload(t("button-previous"), payload));
    let next = page
        .next
        .as_ref()
        .and_then(|payload| InlineButton::for_payload(t("button-next"), payload));

    let row: Vec<InlineButton> = previous.into_iter().chain(next).collect();
    if row.is_empty() {
        Vec::new()
    } else {
        vec![row]
    }
}

/// Convert dispatcher buttons into a Telegram inline keyboard
pub fn to_inline_keyboard(rows: &[Vec<InlineButton>]) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.text.clone(), button.data.clone()))
            .collect::<Vec<_>>()
    }))
}

/// Format the usage counters of a user
pub fn format_stats(record: &UserRecord) -> String {
    t_args(
        "stats",
        &[
            ("image_requests", &record.image_requests.to_string()),
            ("wiki_requests", &record.wiki_requests.to_string()),
        ],
    )
}

/// Format the list of example prompts
pub fn format_helper() -> String {
    format!("{}\n{}", t("helper-title"), t("helper-examples"))
}

/// Caption shown above the gallery navigation buttons
pub fn format_gallery_caption(page: &GalleryPage) -> String {
    t_args(
        "gallery-navigate",
        &[
            ("position", &(page.index + 1).to_string()),
            ("total", &page.total.to_string()),
        ],
    )
}
