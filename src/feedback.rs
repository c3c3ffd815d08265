// Feedback submission, rating statistics and the improvement guardrail.

use crate::agents::Agent;
use crate::db::{self, Database, Feedback};
use crate::error::{Result, SwitchboardError};
use crate::logging;
use serde::Serialize;

/// Stored responses are cut to this many characters.
const MAX_STORED_RESPONSE_CHARS: usize = 2000;
/// Minimum feedback rows before an improvement may be generated.
pub const MIN_FEEDBACK_FOR_IMPROVEMENT: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStats {
    pub avg_rating: Option<f64>,
    pub feedback_count: usize,
    pub conversation_count: usize,
}

pub fn average_rating(ratings: &[u8]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let sum: u32 = ratings.iter().map(|r| *r as u32).sum();
    Some(sum as f64 / ratings.len() as f64)
}

/// One decimal, half-up; an em dash when there are no ratings.
pub fn format_rating(avg: Option<f64>) -> String {
    match avg {
        Some(value) => format!("{:.1}", (value * 10.0).round() / 10.0),
        None => "—".to_string(),
    }
}

pub fn can_generate_improvement(feedback_count: usize) -> bool {
    feedback_count >= MIN_FEEDBACK_FOR_IMPROVEMENT
}

/// Record a rating for an assistant message and stamp it onto the exchange log.
pub fn submit(
    db: &Database,
    agent: Agent,
    message_id: &str,
    rating: u8,
    feedback_text: Option<&str>,
    original_response: &str,
) -> Result<Feedback> {
    if !(1..=5).contains(&rating) {
        return Err(SwitchboardError::InvalidRating(rating));
    }

    let feedback = Feedback {
        id: uuid::Uuid::new_v4().to_string(),
        agent_id: agent.as_str().to_string(),
        message_id: message_id.to_string(),
        rating,
        feedback_text: feedback_text
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string),
        original_response: original_response.chars().take(MAX_STORED_RESPONSE_CHARS).collect(),
        created_at: db::now_rfc3339(),
    };

    db.save_feedback(&feedback)?;
    db.set_log_rating(message_id, rating)?;

    logging::log_improve(None, &format!(
        "Feedback for {}: {}/5{}",
        agent.as_str(),
        rating,
        if feedback.feedback_text.is_some() { " with comment" } else { "" }
    ));

    Ok(feedback)
}

/// Thumbs-up shortcut: a 5 with no comment.
pub fn submit_quick(db: &Database, agent: Agent, message_id: &str, original_response: &str) -> Result<Feedback> {
    submit(db, agent, message_id, 5, None, original_response)
}

/// Rating statistics over every stored row of the agent.
pub fn stats(db: &Database, agent: Agent) -> Result<AgentStats> {
    let ratings = db.get_all_ratings(agent.as_str())?;
    let conversation_count = db.count_logs(agent.as_str())?;
    Ok(AgentStats {
        avg_rating: average_rating(&ratings),
        feedback_count: ratings.len(),
        conversation_count: conversation_count as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_and_format() {
        assert_eq!(average_rating(&[]), None);
        assert_eq!(format_rating(average_rating(&[5, 4, 5])), "4.7");
        assert_eq!(format_rating(average_rating(&[4, 5])), "4.5");
        assert_eq!(format_rating(Some(3.25)), "3.3");
        assert_eq!(format_rating(None), "—");
    }

    #[test]
    fn test_guardrail() {
        assert!(!can_generate_improvement(0));
        assert!(!can_generate_improvement(2));
        assert!(can_generate_improvement(3));
        assert!(can_generate_improvement(40));
    }

    #[test]
    fn test_submit_rejects_out_of_range() {
        let db = Database::open_in_memory().unwrap();
        for rating in [0, 6, 255] {
            let err = submit(&db, Agent::Coder, "m1", rating, None, "resp").unwrap_err();
            assert!(matches!(err, SwitchboardError::InvalidRating(r) if r == rating));
        }
        assert_eq!(stats(&db, Agent::Coder).unwrap().feedback_count, 0);
    }

    #[test]
    fn test_submit_normalizes_text_and_truncates() {
        let db = Database::open_in_memory().unwrap();
        let long = "x".repeat(2500);
        let stored = submit(&db, Agent::Writer, "m1", 3, Some("   "), &long).unwrap();
        assert!(stored.feedback_text.is_none());
        assert_eq!(stored.original_response.chars().count(), 2000);

        let quick = submit_quick(&db, Agent::Writer, "m2", "ok").unwrap();
        assert_eq!(quick.rating, 5);

        let stats = stats(&db, Agent::Writer).unwrap();
        assert_eq!(stats.feedback_count, 2);
        assert_eq!(stats.avg_rating, Some(4.0));
        assert_eq!(stats.conversation_count, 0);
    }
}
