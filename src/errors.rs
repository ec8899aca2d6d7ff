//! # Error Types Module
//!
//! This module defines the error types used by the image generation pipeline,
//! the encyclopedia lookup and the callback payload codec. Each failure mode
//! maps to a distinct user-facing message in the dispatcher.

/// Errors produced while generating, decoding or storing images
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Remote API unreachable, non-success status or malformed body
    Transport(String),
    /// Poll budget exhausted before the job reported `DONE`
    Timeout(String),
    /// Image payload is not valid base64 or not a decodable image
    Decode(String),
    /// Image could not be written to the user's folder
    Storage(String),
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationError::Transport(msg) => write!(f, "Transport error: {msg}"),
            GenerationError::Timeout(msg) => write!(f, "Timeout error: {msg}"),
            GenerationError::Decode(msg) => write!(f, "Decode error: {msg}"),
            GenerationError::Storage(msg) => write!(f, "Storage error: {msg}"),
        }
    }
}

impl std::error::Error for GenerationError {}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        GenerationError::Transport(err.to_string())
    }
}

/// Errors produced while parsing an inline button payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Payload does not split into exactly three fields
    FieldCount(usize),
    /// First field is not a known action tag
    UnknownTag(String),
    /// A numeric field failed to parse
    InvalidNumber(String),
    /// The escaped field is not valid percent-encoded UTF-8
    InvalidEscape(String),
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::FieldCount(count) => {
                write!(f, "Payload error: expected 3 fields, got {count}")
            }
            PayloadError::UnknownTag(tag) => write!(f, "Payload error: unknown tag '{tag}'"),
            PayloadError::InvalidNumber(value) => {
                write!(f, "Payload error: invalid number '{value}'")
            }
            PayloadError::InvalidEscape(value) => {
                write!(f, "Payload error: invalid escape in '{value}'")
            }
        }
    }
}

impl std::error::Error for PayloadError {}

/// Errors produced by the encyclopedia lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Service unreachable or returned a non-success status
    Transport(String),
    /// Response body did not have the expected shape
    Malformed(String),
}

impl std::fmt::Display for LookupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupError::Transport(msg) => write!(f, "Lookup transport error: {msg}"),
            LookupError::Malformed(msg) => write!(f, "Lookup response error: {msg}"),
        }
    }
}

impl std::error::Error for LookupError {}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        LookupError::Transport(err.to_string())
    }
}
