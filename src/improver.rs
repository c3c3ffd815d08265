//! Feedback-driven prompt rewriting.
//!
//! Generation asks the model for a replacement system prompt built from the
//! agent's recent ratings and exchanges. The result is stored inactive; the
//! user activates it explicitly, and can revert to the built-in prompt.

use crate::agents::{Agent, AgentRoster};
use crate::db::{self, ConversationLog, Database, Feedback, Improvement};
use crate::error::{Result, SwitchboardError};
use crate::feedback::{self, AgentStats};
use crate::gateway::{ChatMessage, CompletionClient};
use crate::json_extract;
use crate::logging;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const FEEDBACK_SAMPLE_LIMIT: usize = 20;
const LOG_SAMPLE_LIMIT: usize = 30;
const LOGS_IN_PROMPT: usize = 10;
const IMPROVEMENT_LIST_LIMIT: usize = 5;

const PROMPT_ENGINEER_PROMPT: &str = r#"You are an AI prompt engineer. Analyze the current prompt and user feedback to create an improved version.

Focus on:
1. Addressing common complaints or low ratings
2. Improving response quality based on patterns
3. Making instructions clearer and more specific
4. Keeping the core personality and purpose intact

Return ONLY a JSON object with this structure:
{
  "improved_prompt": "the new improved prompt text",
  "improvement_reason": "brief explanation of what was changed and why",
  "confidence": 0.0-1.0
}"#;

#[derive(Debug, Clone, Deserialize)]
struct Suggestion {
    improved_prompt: String,
    improvement_reason: String,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImprovement {
    pub improvement: Improvement,
    pub stats: AgentStats,
    /// Model-reported confidence, 0 for the unparseable fallback.
    pub confidence: f64,
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn feedback_block(rows: &[Feedback]) -> String {
    if rows.is_empty() {
        return "No feedback yet".to_string();
    }
    rows.iter()
        .map(|f| {
            format!(
                "- Rating: {}/5, Feedback: \"{}\", Response: \"{}...\"",
                f.rating,
                f.feedback_text.as_deref().unwrap_or("No comment"),
                clip(&f.original_response, 200)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn conversation_block(logs: &[ConversationLog]) -> String {
    if logs.is_empty() {
        return "No conversations yet".to_string();
    }
    logs.iter()
        .take(LOGS_IN_PROMPT)
        .map(|l| {
            format!(
                "User: \"{}...\" → Response: \"{}...\" (Rating: {})",
                clip(&l.user_message, 100),
                clip(&l.assistant_response, 150),
                l.rating.map(|r| r.to_string()).unwrap_or_else(|| "unrated".to_string())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// User turn of the rewrite request.
pub fn build_improvement_request(
    current_prompt: &str,
    avg_rating: Option<f64>,
    feedback: &[Feedback],
    logs: &[ConversationLog],
) -> String {
    let avg = avg_rating
        .map(|a| format!("{:.2}", a))
        .unwrap_or_else(|| "No ratings yet".to_string());

    format!(
        "CURRENT PROMPT:\n{}\n\nAVERAGE RATING: {}\n\nRECENT FEEDBACK:\n{}\n\nCONVERSATION SAMPLES:\n{}\n\nPlease analyze this data and provide an improved prompt that addresses the feedback patterns.",
        current_prompt,
        avg,
        feedback_block(feedback),
        conversation_block(logs)
    )
}

fn parse_suggestion(content: &str, current_prompt: &str) -> Suggestion {
    json_extract::try_extract(content).unwrap_or_else(|e| {
        logging::log_error(None, &format!("Failed to parse improvement reply: {}", e));
        Suggestion {
            improved_prompt: current_prompt.to_string(),
            improvement_reason: "Could not parse improvement suggestions".to_string(),
            confidence: 0.0,
        }
    })
}

pub struct PromptImprover {
    client: Arc<dyn CompletionClient>,
    model: String,
    db: Arc<Database>,
}

impl PromptImprover {
    pub fn new(client: Arc<dyn CompletionClient>, model: &str, db: Arc<Database>) -> Self {
        Self {
            client,
            model: model.to_string(),
            db,
        }
    }

    /// Ask for a rewrite of `current_prompt` and store it as an inactive improvement.
    pub async fn generate(&self, agent: Agent, current_prompt: &str) -> Result<GeneratedImprovement> {
        let agent_id = agent.as_str();
        let feedback_rows = self.db.get_recent_feedback(agent_id, FEEDBACK_SAMPLE_LIMIT)?;
        let logs = self.db.get_recent_logs(agent_id, LOG_SAMPLE_LIMIT)?;

        let ratings: Vec<u8> = feedback_rows.iter().map(|f| f.rating).collect();
        let avg_rating = feedback::average_rating(&ratings);

        logging::log_improve(None, &format!(
            "Improving agent {} with {} feedback items", agent_id, feedback_rows.len()
        ));

        let messages = vec![
            ChatMessage::system(PROMPT_ENGINEER_PROMPT),
            ChatMessage::user(build_improvement_request(current_prompt, avg_rating, &feedback_rows, &logs)),
        ];
        let content = self.client.chat_completion(&self.model, messages).await?;
        let suggestion = parse_suggestion(&content, current_prompt);

        let improvement = Improvement {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            original_prompt: current_prompt.to_string(),
            improved_prompt: suggestion.improved_prompt,
            improvement_reason: suggestion.improvement_reason,
            avg_rating_before: avg_rating,
            feedback_count: feedback_rows.len() as i64,
            is_active: false,
            created_at: db::now_rfc3339(),
        };
        self.db.save_improvement(&improvement)?;

        logging::log_improve(None, &format!(
            "Stored improvement {} for {} (confidence {:.2})",
            improvement.id, agent_id, suggestion.confidence
        ));

        Ok(GeneratedImprovement {
            improvement,
            stats: AgentStats {
                avg_rating,
                feedback_count: feedback_rows.len(),
                conversation_count: logs.len(),
            },
            confidence: suggestion.confidence,
        })
    }

    pub fn list(&self, agent: Agent) -> Result<Vec<Improvement>> {
        Ok(self.db.get_recent_improvements(agent.as_str(), IMPROVEMENT_LIST_LIMIT)?)
    }

    /// Make `improvement_id` the only active improvement and put its prompt live.
    pub fn activate(&self, agent: Agent, improvement_id: &str, roster: &mut AgentRoster) -> Result<Improvement> {
        if !self.db.activate_improvement(agent.as_str(), improvement_id)? {
            return Err(SwitchboardError::NotFound(format!(
                "Improvement {} for {}", improvement_id, agent.as_str()
            )));
        }

        let improvement = self
            .db
            .get_improvement(improvement_id)?
            .ok_or_else(|| SwitchboardError::NotFound(format!("Improvement {}", improvement_id)))?;

        roster.set_prompt(agent, improvement.improved_prompt.clone());
        logging::log_improve(None, &format!("Activated improvement {} for {}", improvement_id, agent.as_str()));
        Ok(improvement)
    }

    /// Deactivate everything for the agent and restore its built-in prompt.
    pub fn revert(&self, agent: Agent, roster: &mut AgentRoster) -> Result<()> {
        let touched = self.db.deactivate_improvements(agent.as_str())?;
        roster.reset(agent);
        logging::log_improve(None, &format!(
            "Reverted {} to default prompt ({} improvements deactivated)", agent.as_str(), touched
        ));
        Ok(())
    }

    /// Put every agent's active improvement (if any) back into the roster.
    pub fn restore_active(&self, roster: &mut AgentRoster) -> Result<usize> {
        let mut restored = 0;
        for agent in Agent::ALL {
            if let Some(active) = self.db.get_active_improvement(agent.as_str())? {
                roster.set_prompt(agent, active.improved_prompt);
                restored += 1;
            }
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedClient;

    fn improver(replies: Vec<Result<String>>) -> (PromptImprover, Arc<Database>, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(replies));
        let db = Arc::new(Database::open_in_memory().unwrap());
        (PromptImprover::new(client.clone(), "m", db.clone()), db, client)
    }

    fn seed_feedback(db: &Database, agent: Agent, ratings: &[u8]) {
        for (i, rating) in ratings.iter().enumerate() {
            feedback::submit(db, agent, &format!("msg-{}", i), *rating, Some("too long"), "A response").unwrap();
        }
    }

    #[test]
    fn test_request_empty_blocks() {
        let request = build_improvement_request("Be nice.", None, &[], &[]);
        assert!(request.starts_with("CURRENT PROMPT:\nBe nice.\n\nAVERAGE RATING: No ratings yet"));
        assert!(request.contains("RECENT FEEDBACK:\nNo feedback yet"));
        assert!(request.contains("CONVERSATION SAMPLES:\nNo conversations yet"));
    }

    #[test]
    fn test_request_lines_truncate() {
        let feedback = vec![Feedback {
            id: "f".to_string(),
            agent_id: "coder".to_string(),
            message_id: "m".to_string(),
            rating: 2,
            feedback_text: None,
            original_response: "r".repeat(300),
            created_at: db::now_rfc3339(),
        }];
        let logs: Vec<ConversationLog> = (0..12)
            .map(|i| ConversationLog {
                id: format!("l{}", i),
                agent_id: "coder".to_string(),
                conversation_id: "c".to_string(),
                message_id: format!("m{}", i),
                user_message: "u".repeat(120),
                assistant_response: "a".repeat(160),
                rating: if i == 0 { Some(4) } else { None },
                created_at: db::now_rfc3339(),
            })
            .collect();

        let request = build_improvement_request("P", Some(2.0), &feedback, &logs);
        assert!(request.contains("AVERAGE RATING: 2.00"));
        assert!(request.contains(&format!("- Rating: 2/5, Feedback: \"No comment\", Response: \"{}...\"", "r".repeat(200))));
        assert!(request.contains(&format!("User: \"{}...\" → Response: \"{}...\" (Rating: 4)", "u".repeat(100), "a".repeat(150))));
        assert_eq!(request.matches("(Rating: unrated)").count(), 9);
    }

    #[tokio::test]
    async fn test_generate_stores_inactive() {
        let (improver, db, client) = improver(vec![Ok(
            "```json\n{\"improved_prompt\": \"Be concise.\", \"improvement_reason\": \"Users want shorter answers\", \"confidence\": 0.8}\n```".to_string(),
        )]);
        seed_feedback(&db, Agent::Coder, &[5, 4, 5]);

        let generated = improver.generate(Agent::Coder, Agent::Coder.default_prompt()).await.unwrap();
        assert_eq!(generated.improvement.improved_prompt, "Be concise.");
        assert!(!generated.improvement.is_active);
        assert_eq!(generated.improvement.feedback_count, 3);
        assert_eq!(feedback::format_rating(generated.stats.avg_rating), "4.7");
        assert_eq!(generated.confidence, 0.8);
        assert_eq!(improver.list(Agent::Coder).unwrap().len(), 1);

        let user_turn = &client.requests()[0].1[1].content;
        assert!(user_turn.contains("AVERAGE RATING: 4.67"));
        assert!(user_turn.contains("Feedback: \"too long\""));
    }

    #[tokio::test]
    async fn test_unparseable_reply_keeps_prompt() {
        let (improver, _, _) = improver(vec![Ok("I think it is fine.".to_string())]);
        let generated = improver.generate(Agent::Writer, "Current").await.unwrap();
        assert_eq!(generated.improvement.improved_prompt, "Current");
        assert_eq!(generated.improvement.improvement_reason, "Could not parse improvement suggestions");
        assert_eq!(generated.confidence, 0.0);
        assert_eq!(generated.improvement.avg_rating_before, None);
    }

    #[tokio::test]
    async fn test_transport_failure_writes_nothing() {
        let (improver, _, _) = improver(vec![]);
        assert!(improver.generate(Agent::Analyst, "P").await.is_err());
        assert!(improver.list(Agent::Analyst).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activate_revert_and_restore() {
        let reply = |p: &str| -> Result<String> { Ok(format!("{{\"improved_prompt\": \"{}\", \"improvement_reason\": \"r\"}}", p)) };
        let (improver, _, _) = improver(vec![reply("First"), reply("Second")]);
        let mut roster = AgentRoster::new();

        let first = improver.generate(Agent::General, roster.prompt(Agent::General)).await.unwrap();
        let second = improver.generate(Agent::General, roster.prompt(Agent::General)).await.unwrap();

        improver.activate(Agent::General, &first.improvement.id, &mut roster).unwrap();
        improver.activate(Agent::General, &second.improvement.id, &mut roster).unwrap();
        assert_eq!(roster.prompt(Agent::General), "Second");
        let active: Vec<_> = improver.list(Agent::General).unwrap().into_iter().filter(|i| i.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.improvement.id);

        // A fresh roster picks the active prompt back up
        let mut fresh = AgentRoster::new();
        assert_eq!(improver.restore_active(&mut fresh).unwrap(), 1);
        assert_eq!(fresh.prompt(Agent::General), "Second");

        improver.revert(Agent::General, &mut roster).unwrap();
        assert_eq!(roster.prompt(Agent::General), Agent::General.default_prompt());
        assert!(improver.list(Agent::General).unwrap().iter().all(|i| !i.is_active));
    }

    #[tokio::test]
    async fn test_activate_other_agents_improvement_fails() {
        let (improver, _, _) = improver(vec![Ok("{\"improved_prompt\": \"W\", \"improvement_reason\": \"r\"}".to_string())]);
        let mut roster = AgentRoster::new();
        let generated = improver.generate(Agent::Writer, "P").await.unwrap();

        let err = improver.activate(Agent::Coder, &generated.improvement.id, &mut roster).unwrap_err();
        assert!(matches!(err, SwitchboardError::NotFound(_)));
        assert!(!roster.is_customized(Agent::Coder));
    }
}
