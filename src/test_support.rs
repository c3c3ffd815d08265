// Scripted completion client for unit tests.

use crate::error::{Result, SwitchboardError};
use crate::gateway::{ChatMessage, CompletionClient};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued replies in order and records every request.
/// An exhausted queue answers with a 503.
pub struct ScriptedClient {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedClient {
    pub fn new(replies: Vec<Result<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn chat_completion(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String> {
        self.requests.lock().unwrap().push((model.to_string(), messages));
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(SwitchboardError::Api {
                status: 503,
                message: "scripted failure".to_string(),
            })
        })
    }
}
