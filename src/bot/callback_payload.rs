//! Callback payload codec for inline keyboard buttons
//!
//! Payloads have the shape `{tag}_{user}_{field}`: exactly three fields
//! separated by `_`. In the free-text field `%` and `_` are percent-escaped,
//! so a prompt can never introduce extra separators. Other characters are
//! kept as is to leave room for Cyrillic prompts within the size limit.

use percent_encoding::percent_decode_str;
use std::fmt;
use std::str::FromStr;

use crate::errors::PayloadError;
use crate::user_state::UserId;

/// Telegram rejects callback data longer than this many bytes
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

const SEPARATOR: char = '_';

const TAG_ADD: &str = "add";
const TAG_RETRY: &str = "retry";
const TAG_GALLERY: &str = "gallery";

/// Action attached to an inline button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackPayload {
    /// Add the gallery image at `index` to the gallery once more
    Add { user: UserId, index: usize },
    /// Generate again from the same prompt
    Retry { user: UserId, prompt: String },
    /// Show the gallery page at `index`
    GalleryNav { user: UserId, index: usize },
}

impl CallbackPayload {
    pub fn user(&self) -> UserId {
        match self {
            CallbackPayload::Add { user, .. }
            | CallbackPayload::Retry { user, .. }
            | CallbackPayload::GalleryNav { user, .. } => *user,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            CallbackPayload::Add { .. } => TAG_ADD,
            CallbackPayload::Retry { .. } => TAG_RETRY,
            CallbackPayload::GalleryNav { .. } => TAG_GALLERY,
        }
    }

    /// Encode the payload, or `None` if it would not fit in a button
    pub fn encode_for_button(&self) -> Option<String> {
        let encoded = self.to_string();
        (encoded.len() <= MAX_CALLBACK_DATA_LEN).then_some(encoded)
    }
}

fn escape_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            SEPARATOR => escaped.push_str("%5F"),
            other => escaped.push(other),
        }
    }
    escaped
}

impl fmt::Display for CallbackPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        let user = self.user();
        match self {
            CallbackPayload::Add { index, .. } | CallbackPayload::GalleryNav { index, .. } => {
                write!(f, "{tag}{SEPARATOR}{user}{SEPARATOR}{index}")
            }
            CallbackPayload::Retry { prompt, .. } => write!(
                f,
                "{tag}{SEPARATOR}{user}{SEPARATOR}{}",
                escape_field(prompt)
            ),
        }
    }
}

impl FromStr for CallbackPayload {
    type Err = PayloadError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = data.split(SEPARATOR).collect();
        let [tag, user, field] = fields.as_slice() else {
            return Err(PayloadError::FieldCount(fields.len()));
        };
        let (tag, user, field) = (*tag, *user, *field);

        let user: UserId = user
            .parse()
            .map_err(|_| PayloadError::InvalidNumber(user.to_string()))?;
        let parse_index = |value: &str| {
            value
                .parse::<usize>()
                .map_err(|_| PayloadError::InvalidNumber(value.to_string()))
        };

        match tag {
            TAG_ADD => Ok(CallbackPayload::Add {
                user,
                index: parse_index(field)?,
            }),
            TAG_GALLERY => Ok(CallbackPayload::GalleryNav {
                user,
                index: parse_index(field)?,
            }),
            TAG_RETRY => {
                let prompt = percent_decode_str(field)
                    .decode_utf8()
                    .map_err(|_| PayloadError::InvalidEscape(field.to_string()))?;
                Ok(CallbackPayload::Retry {
                    user,
                    prompt: prompt.into_owned(),
                })
            }
            other => Err(PayloadError::UnknownTag(other.to_string())),
        }
    }
}
