//! Runtime configuration loaded from the environment (and `.env` when present).
//!
//! | Env | Default |
//! |-----|---------|
//! | SWITCHBOARD_AI_GATEWAY_URL | https://ai.gateway.lovable.dev/v1/chat/completions |
//! | SWITCHBOARD_AI_API_KEY (or LOVABLE_API_KEY) | unset |
//! | SWITCHBOARD_CLASSIFIER_MODEL | google/gemini-2.5-flash |
//! | SWITCHBOARD_CHAT_MODEL | google/gemini-3-flash-preview |
//! | SWITCHBOARD_MCP_BASE_URL | https://mcp.zapier.com/api/v1 |
//! | ZAPIER_MCP_KEY | unset |
//! | SWITCHBOARD_DB_PATH | ~/.switchboard/switchboard.db |
//! | SWITCHBOARD_LOG_DIR | ~/.switchboard/logs |
//! | SWITCHBOARD_INTENT_MODE | remote ("remote" \| "local") |
//! | SWITCHBOARD_AUTO_CONTEXT_SWITCH | true |
//! | SWITCHBOARD_AUTO_CREATE_TICKETS | false |
//! | SWITCHBOARD_LOG_CONSOLE | false |

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_AI_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_CLASSIFIER_MODEL: &str = "google/gemini-2.5-flash";
pub const DEFAULT_CHAT_MODEL: &str = "google/gemini-3-flash-preview";
pub const DEFAULT_MCP_BASE_URL: &str = "https://mcp.zapier.com/api/v1";

/// Where intent detection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentMode {
    /// Ask the classifier model, fall back to keywords when the call fails.
    Remote,
    /// Keyword scoring only, no network.
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub ai_gateway_url: String,
    #[serde(skip_serializing)]
    pub ai_api_key: Option<String>,
    pub classifier_model: String,
    pub chat_model: String,
    pub mcp_base_url: String,
    #[serde(skip_serializing)]
    pub mcp_api_key: Option<String>,
    pub database_path: PathBuf,
    pub log_dir: PathBuf,
    pub intent_mode: IntentMode,
    pub auto_context_switch: bool,
    pub auto_create_tickets: bool,
    pub log_console: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let base = default_base_dir();
        Self {
            ai_gateway_url: DEFAULT_AI_GATEWAY_URL.to_string(),
            ai_api_key: None,
            classifier_model: DEFAULT_CLASSIFIER_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            mcp_base_url: DEFAULT_MCP_BASE_URL.to_string(),
            mcp_api_key: None,
            database_path: base.join("switchboard.db"),
            log_dir: base.join("logs"),
            intent_mode: IntentMode::Remote,
            auto_context_switch: true,
            auto_create_tickets: false,
            log_console: false,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any) and read the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset or invalid values keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let flag = |key: &str, default: bool| match get(key).map(|v| v.to_lowercase()).as_deref() {
            Some("1") | Some("true") | Some("yes") | Some("on") => true,
            Some("0") | Some("false") | Some("no") | Some("off") => false,
            _ => default,
        };

        let intent_mode = match get("SWITCHBOARD_INTENT_MODE").map(|v| v.to_lowercase()).as_deref() {
            Some("local") => IntentMode::Local,
            _ => IntentMode::Remote,
        };

        Self {
            ai_gateway_url: get("SWITCHBOARD_AI_GATEWAY_URL").unwrap_or(defaults.ai_gateway_url),
            ai_api_key: get("SWITCHBOARD_AI_API_KEY").or_else(|| get("LOVABLE_API_KEY")),
            classifier_model: get("SWITCHBOARD_CLASSIFIER_MODEL").unwrap_or(defaults.classifier_model),
            chat_model: get("SWITCHBOARD_CHAT_MODEL").unwrap_or(defaults.chat_model),
            mcp_base_url: get("SWITCHBOARD_MCP_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.mcp_base_url),
            mcp_api_key: get("ZAPIER_MCP_KEY"),
            database_path: get("SWITCHBOARD_DB_PATH").map(PathBuf::from).unwrap_or(defaults.database_path),
            log_dir: get("SWITCHBOARD_LOG_DIR").map(PathBuf::from).unwrap_or(defaults.log_dir),
            intent_mode,
            auto_context_switch: flag("SWITCHBOARD_AUTO_CONTEXT_SWITCH", defaults.auto_context_switch),
            auto_create_tickets: flag("SWITCHBOARD_AUTO_CREATE_TICKETS", defaults.auto_create_tickets),
            log_console: flag("SWITCHBOARD_LOG_CONSOLE", defaults.log_console),
        }
    }
}

fn default_base_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".switchboard")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config.ai_gateway_url, DEFAULT_AI_GATEWAY_URL);
        assert_eq!(config.classifier_model, DEFAULT_CLASSIFIER_MODEL);
        assert_eq!(config.intent_mode, IntentMode::Remote);
        assert!(config.auto_context_switch);
        assert!(!config.auto_create_tickets);
        assert!(config.ai_api_key.is_none());
    }

    #[test]
    fn test_overrides_and_legacy_key() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("LOVABLE_API_KEY", "legacy"),
            ("SWITCHBOARD_INTENT_MODE", "LOCAL"),
            ("SWITCHBOARD_AUTO_CREATE_TICKETS", "yes"),
            ("SWITCHBOARD_MCP_BASE_URL", "http://localhost:9000/api/"),
        ]));
        assert_eq!(config.ai_api_key.as_deref(), Some("legacy"));
        assert_eq!(config.intent_mode, IntentMode::Local);
        assert!(config.auto_create_tickets);
        assert_eq!(config.mcp_base_url, "http://localhost:9000/api");
    }

    #[test]
    fn test_invalid_flag_keeps_default() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("SWITCHBOARD_AUTO_CONTEXT_SWITCH", "sometimes"),
            ("SWITCHBOARD_AI_API_KEY", "   "),
        ]));
        assert!(config.auto_context_switch);
        assert!(config.ai_api_key.is_none());
    }
}
