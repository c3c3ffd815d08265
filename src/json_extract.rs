//! Tolerant JSON extraction from free-text model replies.
//!
//! Models often wrap their JSON in a markdown fence or surround it with prose.
//! Extraction tries a ```json fenced block first, then the widest `{ ... }`
//! span, then the whole reply.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

static FENCED_JSON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```json\n?([\s\S]*?)\n?```").expect("valid fenced-json pattern"));

static BARE_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid object pattern"));

/// Locate the JSON candidate inside a reply without parsing it.
pub fn json_candidate(content: &str) -> &str {
    if let Some(caps) = FENCED_JSON.captures(content) {
        return caps.get(1).map(|m| m.as_str()).unwrap_or(content);
    }
    if let Some(m) = BARE_OBJECT.find(content) {
        return m.as_str();
    }
    content
}

/// Parse the JSON candidate of `content` into `T`.
pub fn try_extract<T: DeserializeOwned>(content: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(json_candidate(content).trim())
}
