//! Structured logging module for Switchboard
//!
//! Writes daily log files into the configured log directory with categories:
//! - INTENT: Intent detection results and fallbacks
//! - ROUTING: Context switches and ticket assignment
//! - IMPROVE: Feedback and prompt improvement lifecycle
//! - TICKET: Support ticket lifecycle
//! - MCP: External tool relay calls
//! - CHAT: Chat turns and session lifecycle
//! - ERROR: Errors and degraded paths

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Intent,
    Routing,
    Improve,
    Ticket,
    Mcp,
    Chat,
    Error,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Intent => "INTENT",
            LogCategory::Routing => "ROUTING",
            LogCategory::Improve => "IMPROVE",
            LogCategory::Ticket => "TICKET",
            LogCategory::Mcp => "MCP",
            LogCategory::Chat => "CHAT",
            LogCategory::Error => "ERROR",
        }
    }
}

struct LogSink {
    dir: PathBuf,
    console: bool,
}

/// Global sink; `None` until `init_logging` runs, in which case lines are dropped.
static LOG_SINK: Lazy<Mutex<Option<LogSink>>> = Lazy::new(|| Mutex::new(None));

fn log_file_path(dir: &Path) -> PathBuf {
    let today = Local::now().format("%Y-%m-%d").to_string();
    dir.join(format!("switchboard-{}.log", today))
}

/// Initialize the logging system - creates the log directory if needed
pub fn init_logging(dir: &Path, console: bool) -> std::io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }

    if let Ok(mut sink) = LOG_SINK.lock() {
        *sink = Some(LogSink {
            dir: dir.to_path_buf(),
            console,
        });
    }

    log(LogCategory::Chat, None, "Switchboard logging initialized");
    Ok(())
}

/// Render one log line. Conversation ids are shortened to 8 characters.
pub fn format_line(category: LogCategory, conversation_id: Option<&str>, message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let conv_context = conversation_id
        .map(|id| format!("conv={} | ", id.chars().take(8).collect::<String>()))
        .unwrap_or_default();

    format!(
        "[{}] [{}] {}{}\n",
        timestamp,
        category.as_str(),
        conv_context,
        message
    )
}

fn append_line(dir: &Path, line: &str) {
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path(dir))
    {
        let _ = file.write_all(line.as_bytes());
    }
}

/// Log a message with category and optional conversation context
pub fn log(category: LogCategory, conversation_id: Option<&str>, message: &str) {
    let line = format_line(category, conversation_id, message);

    let Ok(guard) = LOG_SINK.lock() else {
        return;
    };
    if let Some(sink) = guard.as_ref() {
        if sink.console {
            eprint!("{}", line);
        }
        append_line(&sink.dir, &line);
    }
}

pub fn log_intent(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Intent, conversation_id, message);
}

pub fn log_routing(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Routing, conversation_id, message);
}

pub fn log_improve(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Improve, conversation_id, message);
}

pub fn log_ticket(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Ticket, conversation_id, message);
}

pub fn log_mcp(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Mcp, conversation_id, message);
}

pub fn log_chat(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Chat, conversation_id, message);
}

/// Log an error
pub fn log_error(conversation_id: Option<&str>, message: &str) {
    log(LogCategory::Error, conversation_id, message);
}

fn is_log_file_name(name: &str) -> bool {
    name.starts_with("switchboard-") && name.ends_with(".log")
}

/// Clean up old log files (keep last 7 days). Only `switchboard-*.log` files are touched.
pub fn cleanup_old_logs(dir: &Path) -> std::io::Result<usize> {
    let mut deleted = 0;

    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(7);

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_log = entry
            .file_name()
            .to_str()
            .map(is_log_file_name)
            .unwrap_or(false);
        if !is_log {
            continue;
        }

        if let Ok(metadata) = entry.metadata() {
            if !metadata.is_file() {
                continue;
            }
            if let Ok(modified) = metadata.modified() {
                let modified_time: chrono::DateTime<Utc> = modified.into();
                if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                    deleted += 1;
                }
            }
        }
    }

    Ok(deleted)
}
