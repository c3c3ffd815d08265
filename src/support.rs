//! Support ticket classification, assignment and status lifecycle.

use crate::db::{self, Database, Ticket};
use crate::error::{Result, SwitchboardError};
use crate::gateway::{ChatMessage, CompletionClient};
use crate::json_extract;
use crate::logging;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How many tickets `load_tickets` returns.
const TICKET_LIST_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Technical,
    Billing,
    #[default]
    General,
    FeatureRequest,
    Bug,
}

impl TicketCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketCategory::Technical => "technical",
            TicketCategory::Billing => "billing",
            TicketCategory::General => "general",
            TicketCategory::FeatureRequest => "feature_request",
            TicketCategory::Bug => "bug",
        }
    }

    pub fn from_str(s: &str) -> Option<TicketCategory> {
        match s.trim().to_lowercase().as_str() {
            "technical" => Some(TicketCategory::Technical),
            "billing" => Some(TicketCategory::Billing),
            "general" => Some(TicketCategory::General),
            "feature_request" => Some(TicketCategory::FeatureRequest),
            "bug" => Some(TicketCategory::Bug),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }

    pub fn from_str(s: &str) -> Option<TicketPriority> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(TicketPriority::Low),
            "medium" => Some(TicketPriority::Medium),
            "high" => Some(TicketPriority::High),
            "urgent" => Some(TicketPriority::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Open,
    InProgress,
    Waiting,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Waiting => "waiting",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<TicketStatus> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(TicketStatus::Open),
            "in_progress" => Some(TicketStatus::InProgress),
            "waiting" => Some(TicketStatus::Waiting),
            "resolved" => Some(TicketStatus::Resolved),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// Position on the forward path; `waiting` is off the path.
    fn rank(&self) -> Option<u8> {
        match self {
            TicketStatus::Open => Some(0),
            TicketStatus::InProgress => Some(1),
            TicketStatus::Resolved => Some(2),
            TicketStatus::Closed => Some(3),
            TicketStatus::Waiting => None,
        }
    }

    /// Forward moves along open -> in_progress -> resolved -> closed only.
    pub fn can_transition(&self, to: TicketStatus) -> bool {
        match (self.rank(), to.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

/// A support desk queue. Capacity fields are informational.
#[derive(Debug, Clone, Serialize)]
pub struct SupportAgent {
    pub id: &'static str,
    pub name: &'static str,
    pub specialties: &'static [TicketCategory],
    pub available_load: u32,
    pub current_tickets: u32,
}

pub const SUPPORT_AGENTS: [SupportAgent; 3] = [
    SupportAgent {
        id: "tech-support",
        name: "Technical Support",
        specialties: &[TicketCategory::Technical, TicketCategory::Bug],
        available_load: 100,
        current_tickets: 0,
    },
    SupportAgent {
        id: "billing-support",
        name: "Billing Support",
        specialties: &[TicketCategory::Billing],
        available_load: 100,
        current_tickets: 0,
    },
    SupportAgent {
        id: "general-support",
        name: "General Support",
        specialties: &[TicketCategory::General, TicketCategory::FeatureRequest],
        available_load: 100,
        current_tickets: 0,
    },
];

/// Fixed category -> desk table.
pub fn assign_agent(category: TicketCategory) -> &'static str {
    match category {
        TicketCategory::Technical | TicketCategory::Bug => "tech-support",
        TicketCategory::Billing => "billing-support",
        TicketCategory::General | TicketCategory::FeatureRequest => "general-support",
    }
}

const TICKET_CLASSIFIER_PROMPT: &str = r#"You are a support ticket classifier. Analyze the ticket and provide:
1. Category (technical, billing, general, feature_request, bug)
2. Priority (low, medium, high, urgent)
3. Relevant tags (array of keywords)

Return ONLY a JSON object:
{
  "category": "category_name",
  "priority": "priority_level",
  "tags": ["tag1", "tag2"],
  "summary": "brief summary"
}"#;

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    #[serde(default)]
    category: String,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TicketClassification {
    pub category: TicketCategory,
    pub priority: TicketPriority,
    pub tags: Vec<String>,
}

impl Default for TicketClassification {
    fn default() -> Self {
        Self {
            category: TicketCategory::General,
            priority: TicketPriority::Medium,
            tags: Vec::new(),
        }
    }
}

/// Read a classifier reply. Malformed replies give general / medium / no tags.
pub fn parse_classification(content: &str) -> TicketClassification {
    match json_extract::try_extract::<ClassifierReply>(content) {
        Ok(reply) => {
            if let Some(summary) = &reply.summary {
                logging::log_ticket(None, &format!("Classifier summary: {}", summary));
            }
            TicketClassification {
                category: TicketCategory::from_str(&reply.category).unwrap_or_default(),
                priority: TicketPriority::from_str(&reply.priority).unwrap_or_default(),
                tags: reply.tags,
            }
        }
        Err(e) => {
            logging::log_error(None, &format!("Failed to parse ticket classification: {}", e));
            TicketClassification::default()
        }
    }
}

pub struct TicketRouter {
    client: Arc<dyn CompletionClient>,
    model: String,
    db: Arc<Database>,
}

impl TicketRouter {
    pub fn new(client: Arc<dyn CompletionClient>, model: &str, db: Arc<Database>) -> Self {
        Self {
            client,
            model: model.to_string(),
            db,
        }
    }

    async fn classify(&self, title: &str, description: &str) -> TicketClassification {
        let messages = vec![
            ChatMessage::system(TICKET_CLASSIFIER_PROMPT),
            ChatMessage::user(format!("Title: {}\nDescription: {}", title, description)),
        ];

        match self.client.chat_completion(&self.model, messages).await {
            Ok(content) => parse_classification(&content),
            Err(e) => {
                logging::log_error(None, &format!("Ticket classification failed: {}", e));
                TicketClassification::default()
            }
        }
    }

    /// Classify, assign and persist a new open ticket.
    pub async fn create_ticket(
        &self,
        title: &str,
        description: &str,
        conversation_id: Option<&str>,
    ) -> Result<Ticket> {
        let classification = self.classify(title, description).await;
        let assigned = assign_agent(classification.category);
        let now = db::now_rfc3339();

        let ticket = Ticket {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            category: classification.category,
            priority: classification.priority,
            status: TicketStatus::Open,
            assigned_agent: Some(assigned.to_string()),
            conversation_id: conversation_id.map(str::to_string),
            tags: classification.tags,
            created_at: now.clone(),
            updated_at: now,
            resolved_at: None,
        };

        self.db.save_ticket(&ticket)?;

        logging::log_ticket(conversation_id, &format!(
            "Created ticket {} [{} / {}] -> {}",
            ticket.id, ticket.category.as_str(), ticket.priority.as_str(), assigned
        ));

        Ok(ticket)
    }

    /// Recompute the assignment from the stored category.
    pub fn route_ticket(&self, ticket_id: &str) -> Result<String> {
        let ticket = self
            .db
            .get_ticket(ticket_id)?
            .ok_or_else(|| SwitchboardError::NotFound(format!("Ticket {}", ticket_id)))?;

        let assigned = assign_agent(ticket.category);
        self.db.update_ticket_assignment(ticket_id, assigned)?;

        logging::log_ticket(ticket.conversation_id.as_deref(), &format!(
            "Routed ticket {} to {}", ticket_id, assigned
        ));
        Ok(assigned.to_string())
    }

    pub fn update_status(&self, ticket_id: &str, status: TicketStatus) -> Result<Ticket> {
        let mut ticket = self
            .db
            .get_ticket(ticket_id)?
            .ok_or_else(|| SwitchboardError::NotFound(format!("Ticket {}", ticket_id)))?;

        if !ticket.status.can_transition(status) {
            return Err(SwitchboardError::InvalidTransition {
                from: ticket.status.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        let now = db::now_rfc3339();
        let resolved_at = (status == TicketStatus::Resolved).then(|| now.clone());
        self.db.update_ticket_status(ticket_id, status, &now, resolved_at.as_deref())?;

        logging::log_ticket(ticket.conversation_id.as_deref(), &format!(
            "Ticket {}: {} -> {}", ticket_id, ticket.status.as_str(), status.as_str()
        ));

        ticket.status = status;
        ticket.updated_at = now;
        if resolved_at.is_some() {
            ticket.resolved_at = resolved_at;
        }
        Ok(ticket)
    }

    pub fn load_tickets(&self) -> Result<Vec<Ticket>> {
        Ok(self.db.get_recent_tickets(TICKET_LIST_LIMIT)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedClient;

    fn router(replies: Vec<Result<String>>) -> (TicketRouter, Arc<ScriptedClient>) {
        let client = Arc::new(ScriptedClient::new(replies));
        let db = Arc::new(Database::open_in_memory().unwrap());
        (TicketRouter::new(client.clone(), "m", db), client)
    }

    #[test]
    fn test_status_machine() {
        use TicketStatus::*;
        assert!(Open.can_transition(InProgress));
        assert!(Open.can_transition(Resolved));
        assert!(InProgress.can_transition(Closed));
        assert!(Resolved.can_transition(Closed));

        assert!(!InProgress.can_transition(Open));
        assert!(!Resolved.can_transition(InProgress));
        assert!(!Open.can_transition(Open));
        assert!(!Open.can_transition(Waiting));
        assert!(!Waiting.can_transition(Resolved));
        for to in [Open, InProgress, Waiting, Resolved, Closed] {
            assert!(!Closed.can_transition(to));
        }
    }

    #[test]
    fn test_assignment_table_matches_specialties() {
        for desk in SUPPORT_AGENTS.iter() {
            for category in desk.specialties {
                assert_eq!(assign_agent(*category), desk.id);
            }
            assert_eq!(desk.available_load, 100);
        }
    }

    #[test]
    fn test_parse_classification_unknowns() {
        let parsed = parse_classification("{\"category\": \"refunds\", \"priority\": \"asap\", \"tags\": [\"card\"]}");
        assert_eq!(parsed.category, TicketCategory::General);
        assert_eq!(parsed.priority, TicketPriority::Medium);
        assert_eq!(parsed.tags, vec!["card".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_reply_defaults_to_general_support() {
        let (router, _) = router(vec![Ok("sorry, I can't do that".to_string())]);
        let ticket = router.create_ticket("Help", "Something odd", None).await.unwrap();
        assert_eq!(ticket.category, TicketCategory::General);
        assert_eq!(ticket.priority, TicketPriority::Medium);
        assert!(ticket.tags.is_empty());
        assert_eq!(ticket.assigned_agent.as_deref(), Some("general-support"));
        assert_eq!(ticket.status, TicketStatus::Open);
    }

    #[tokio::test]
    async fn test_transport_failure_still_creates_ticket() {
        let (router, client) = router(vec![]);
        let ticket = router.create_ticket("Login", "Cannot log in", Some("conv-1")).await.unwrap();
        assert_eq!(ticket.assigned_agent.as_deref(), Some("general-support"));
        assert_eq!(client.call_count(), 1);
        assert_eq!(router.load_tickets().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_classified_ticket_and_request_format() {
        let (router, client) = router(vec![Ok(
            "```json\n{\"category\": \"bug\", \"priority\": \"urgent\", \"tags\": [\"crash\"], \"summary\": \"app crash\"}\n```".to_string(),
        )]);
        let ticket = router.create_ticket("Crash", "App crashes on start", None).await.unwrap();
        assert_eq!(ticket.category, TicketCategory::Bug);
        assert_eq!(ticket.priority, TicketPriority::Urgent);
        assert_eq!(ticket.assigned_agent.as_deref(), Some("tech-support"));

        let requests = client.requests();
        assert_eq!(requests[0].1[1].content, "Title: Crash\nDescription: App crashes on start");
    }

    #[tokio::test]
    async fn test_update_status_lifecycle() {
        let (router, _) = router(vec![]);
        let ticket = router.create_ticket("T", "D", None).await.unwrap();

        let updated = router.update_status(&ticket.id, TicketStatus::InProgress).unwrap();
        assert!(updated.resolved_at.is_none());

        let err = router.update_status(&ticket.id, TicketStatus::Open).unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidTransition { .. }));

        let resolved = router.update_status(&ticket.id, TicketStatus::Resolved).unwrap();
        assert!(resolved.resolved_at.is_some());

        let closed = router.update_status(&ticket.id, TicketStatus::Closed).unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);
        assert!(router.update_status(&ticket.id, TicketStatus::Resolved).is_err());
    }

    #[tokio::test]
    async fn test_route_ticket() {
        let (router, _) = router(vec![Ok("{\"category\": \"billing\", \"priority\": \"low\"}".to_string())]);
        let ticket = router.create_ticket("Invoice", "Wrong amount", None).await.unwrap();
        assert_eq!(router.route_ticket(&ticket.id).unwrap(), "billing-support");
        assert!(matches!(router.route_ticket("nope"), Err(SwitchboardError::NotFound(_))));
    }
}
