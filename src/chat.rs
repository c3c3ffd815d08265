// Single chat turn against the selected agent persona.

use crate::agents::Agent;
use crate::db::{self, ConversationLog, Database, Message, Role};
use crate::error::Result;
use crate::gateway::{ChatMessage, CompletionClient};
use crate::logging;
use std::sync::Arc;

/// Prior transcript turns sent along with each request.
const HISTORY_TURNS: usize = 20;

pub struct ChatEngine {
    client: Arc<dyn CompletionClient>,
    db: Arc<Database>,
}

/// `[system, ...history, user]` in transcript order.
pub fn build_messages(system_prompt: &str, history: &[Message], user_message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));

    for msg in history.iter().rev().take(HISTORY_TURNS).rev() {
        messages.push(match msg.role {
            Role::User => ChatMessage::user(msg.content.clone()),
            Role::Assistant => ChatMessage::assistant(msg.content.clone()),
        });
    }

    messages.push(ChatMessage::user(user_message));
    messages
}

impl ChatEngine {
    pub fn new(client: Arc<dyn CompletionClient>, db: Arc<Database>) -> Self {
        Self { client, db }
    }

    /// Store the user message, ask the model, store and log the reply.
    pub async fn send(
        &self,
        conversation_id: &str,
        agent: Agent,
        system_prompt: &str,
        model: &str,
        user_message: &str,
    ) -> Result<Message> {
        let history = self.db.get_recent_messages(conversation_id, HISTORY_TURNS)?;

        let user_row = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: Role::User,
            agent_id: None,
            content: user_message.to_string(),
            timestamp: db::now_rfc3339(),
        };
        self.db.save_message(&user_row)?;

        logging::log_chat(Some(conversation_id), &format!(
            "{} <- {} chars via {}", agent.as_str(), user_message.chars().count(), model
        ));

        let messages = build_messages(system_prompt, &history, user_message);
        let reply = self.client.chat_completion(model, messages).await?;

        let assistant_row = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: Role::Assistant,
            agent_id: Some(agent.as_str().to_string()),
            content: reply.clone(),
            timestamp: db::now_rfc3339(),
        };
        self.db.save_message(&assistant_row)?;

        self.db.save_conversation_log(&ConversationLog {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent.as_str().to_string(),
            conversation_id: conversation_id.to_string(),
            message_id: assistant_row.id.clone(),
            user_message: user_message.to_string(),
            assistant_response: reply,
            rating: None,
            created_at: db::now_rfc3339(),
        })?;

        Ok(assistant_row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedClient;

    #[test]
    fn test_build_messages_keeps_last_turns() {
        let history: Vec<Message> = (0..25)
            .map(|i| Message {
                id: i.to_string(),
                conversation_id: "c".to_string(),
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                agent_id: None,
                content: format!("turn {}", i),
                timestamp: db::now_rfc3339(),
            })
            .collect();

        let messages = build_messages("sys", &history, "now");
        assert_eq!(messages.len(), 22);
        assert_eq!(messages[0], ChatMessage::system("sys"));
        assert_eq!(messages[1].content, "turn 5");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[21], ChatMessage::user("now"));
    }

    #[tokio::test]
    async fn test_send_persists_transcript_and_log() {
        let client = Arc::new(ScriptedClient::new(vec![Ok("Hi there".to_string()), Ok("Sure".to_string())]));
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_conversation("c1").unwrap();
        let engine = ChatEngine::new(client.clone(), db.clone());

        let first = engine.send("c1", Agent::General, "sys", "model-a", "hello").await.unwrap();
        assert_eq!(first.content, "Hi there");
        assert_eq!(first.agent_id.as_deref(), Some("general"));

        engine.send("c1", Agent::Coder, "code sys", "model-b", "write a loop").await.unwrap();

        let transcript = db.get_conversation_messages("c1").unwrap();
        let contents: Vec<_> = transcript.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "Hi there", "write a loop", "Sure"]);

        // Second request carries the first exchange exactly once
        let (model, messages) = &client.requests()[1];
        assert_eq!(model, "model-b");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1], ChatMessage::user("hello"));
        assert_eq!(messages[2], ChatMessage::assistant("Hi there"));

        let logs = db.get_recent_logs("general", 30).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message_id, first.id);
    }

    #[tokio::test]
    async fn test_failed_completion_keeps_user_message_only() {
        let client = Arc::new(ScriptedClient::failing());
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.create_conversation("c1").unwrap();
        let engine = ChatEngine::new(client, db.clone());

        assert!(engine.send("c1", Agent::Writer, "sys", "m", "draft").await.is_err());
        assert_eq!(db.get_conversation_messages("c1").unwrap().len(), 1);
        assert_eq!(db.count_logs("writer").unwrap(), 0);
    }
}
