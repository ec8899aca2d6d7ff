//! # Encyclopedia Lookup Module
//!
//! Single-shot summary lookups against a MediaWiki instance, plus the cleanup
//! that turns a raw plain-text extract into a short chat-sized summary.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use crate::errors::LookupError;

/// Number of characters of the article considered for the summary
pub const SUMMARY_SOURCE_CHARS: usize = 1000;

/// Parenthesised and braced groups, with the whitespace in front of them
static BRACKETED: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\s*\([^()]*\)|\s*\{[^{}]*\}").ok());

/// Looks up a short summary for a title or phrase
#[async_trait]
pub trait Encyclopedia: Send + Sync {
    /// Returns `Ok(None)` when no matching article exists
    async fn lookup(&self, query: &str) -> Result<Option<String>, LookupError>;
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    query: Option<QueryPages>,
}

#[derive(Debug, Deserialize)]
struct QueryPages {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    extract: Option<String>,
}

/// Wikipedia client using the MediaWiki action API
#[derive(Debug, Clone)]
pub struct WikipediaClient {
    http: reqwest::Client,
    base_url: String,
}

impl WikipediaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Fetch the plain-text extract of the best matching article
    pub async fn fetch_extract(&self, query: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/w/api.php", self.base_url.trim_end_matches('/'));
        let body = self
            .http
            .get(url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("generator", "search"),
                ("gsrlimit", "1"),
                ("gsrsearch", query),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let response: QueryResponse =
            serde_json::from_str(&body).map_err(|e| LookupError::Malformed(e.to_string()))?;

        let extract = response
            .query
            .and_then(|q| q.pages.into_iter().find(|page| !page.missing))
            .and_then(|page| page.extract)
            .filter(|text| !text.trim().is_empty());

        debug!(query = %query, found = extract.is_some(), "Encyclopedia lookup finished");
        Ok(extract)
    }
}

#[async_trait]
impl Encyclopedia for WikipediaClient {
    async fn lookup(&self, query: &str) -> Result<Option<String>, LookupError> {
        let summary = self
            .fetch_extract(query)
            .await?
            .map(|extract| clean_summary(&extract))
            .filter(|summary| !summary.is_empty());
        Ok(summary)
    }
}

/// Reduce an article extract to its leading sentences
///
/// Keeps whole sentences from the first [`SUMMARY_SOURCE_CHARS`] characters,
/// skips section headings and stops at the first fragment too short to be a
/// sentence. Parenthesised and braced asides are removed.
pub fn clean_summary(extract: &str) -> String {
    let head: String = extract.chars().take(SUMMARY_SOURCE_CHARS).collect();

    let mut fragments: Vec<&str> = head.split('.').collect();
    // the tail after the last '.' is an unfinished sentence
    fragments.pop();

    let mut summary = String::new();
    for fragment in fragments {
        if fragment.contains("==") {
            continue;
        }
        if fragment.trim().chars().count() > 3 {
            summary.push_str(fragment);
            summary.push('.');
        } else {
            break;
        }
    }

    // Nested groups like `{{ref}}` need more than one pass
    if let Some(re) = BRACKETED.as_ref() {
        while re.is_match(&summary) {
            summary = re.replace_all(&summary, "").into_owned();
        }
    }
    summary.trim().to_string()
}
