//! A user's chat session: selected agent and model, the current conversation,
//! and every component the enhanced send path touches.

use crate::agents::{self, Agent, AgentRoster};
use crate::chat::ChatEngine;
use crate::config::AppConfig;
use crate::context::{ContextSwitch, ContextSwitcher, SwitchDecision, SwitchOutcome};
use crate::db::{Database, Feedback, Improvement, Message, Ticket};
use crate::error::{Result, SwitchboardError};
use crate::feedback::{self, AgentStats};
use crate::gateway::{CompletionClient, GatewayClient, OfflineClient};
use crate::improver::{GeneratedImprovement, PromptImprover};
use crate::intent::{DetectedIntent, Intent, IntentDetector};
use crate::logging;
use crate::mcp::{McpAction, McpRelay, McpTool};
use crate::support::{TicketRouter, TicketStatus};
use serde_json::Value;
use std::sync::Arc;

/// Support messages above this confidence open a ticket when auto-tickets are on.
const AUTO_TICKET_CONFIDENCE: f64 = 70.0;
const AUTO_TICKET_TITLE: &str = "Support Request";

#[derive(Debug, Clone)]
pub struct SendResult {
    pub reply: Message,
    pub switch: Option<SwitchDecision>,
    pub ticket: Option<Ticket>,
    /// Non-fatal problems hit along the way.
    pub notices: Vec<String>,
}

pub struct Session {
    db: Arc<Database>,
    chat: ChatEngine,
    roster: AgentRoster,
    switcher: ContextSwitcher,
    relay: McpRelay,
    router: TicketRouter,
    improver: PromptImprover,
    conversation_id: String,
    agent: Agent,
    model: String,
    auto_context_switch: bool,
    auto_create_tickets: bool,
    last_reply: Option<Message>,
}

impl Session {
    /// Open the on-disk database and connect to the configured gateway.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let db = Arc::new(Database::open(&config.database_path)?);
        let client: Arc<dyn CompletionClient> = match config.ai_api_key.as_deref() {
            Some(key) => Arc::new(GatewayClient::new(&config.ai_gateway_url, key)?),
            None => {
                logging::log_error(None, "No AI gateway key configured; running offline");
                Arc::new(OfflineClient)
            }
        };
        Self::with_parts(config, client, db)
    }

    pub fn with_parts(config: &AppConfig, client: Arc<dyn CompletionClient>, db: Arc<Database>) -> Result<Self> {
        let detector = IntentDetector::new(client.clone(), &config.classifier_model, config.intent_mode);
        let improver = PromptImprover::new(client.clone(), &config.classifier_model, db.clone());
        let router = TicketRouter::new(client.clone(), &config.classifier_model, db.clone());
        let relay = McpRelay::new(&config.mcp_base_url, config.mcp_api_key.clone())?;

        let mut roster = AgentRoster::new();
        let restored = improver.restore_active(&mut roster)?;
        if restored > 0 {
            logging::log_improve(None, &format!("Restored {} active improvements", restored));
        }

        let conversation_id = uuid::Uuid::new_v4().to_string();
        db.create_conversation(&conversation_id)?;

        Ok(Self {
            chat: ChatEngine::new(client, db.clone()),
            db,
            roster,
            switcher: ContextSwitcher::new(detector),
            relay,
            router,
            improver,
            conversation_id,
            agent: Agent::default(),
            model: config.chat_model.clone(),
            auto_context_switch: config.auto_context_switch,
            auto_create_tickets: config.auto_create_tickets,
            last_reply: None,
        })
    }

    // ============ State ============

    pub fn agent(&self) -> Agent {
        self.agent
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn roster(&self) -> &AgentRoster {
        &self.roster
    }

    pub fn auto_context_switch(&self) -> bool {
        self.auto_context_switch
    }

    pub fn auto_create_tickets(&self) -> bool {
        self.auto_create_tickets
    }

    pub fn set_auto_context_switch(&mut self, on: bool) {
        self.auto_context_switch = on;
    }

    pub fn set_auto_create_tickets(&mut self, on: bool) {
        self.auto_create_tickets = on;
    }

    pub fn select_agent(&mut self, agent: Agent) {
        self.agent = agent;
    }

    pub fn select_model(&mut self, model_id: &str) -> Result<()> {
        let model = agents::find_model(model_id)
            .ok_or_else(|| SwitchboardError::NotFound(format!("Model {}", model_id)))?;
        self.model = model.id.to_string();
        Ok(())
    }

    pub fn new_conversation(&mut self) -> Result<&str> {
        let id = uuid::Uuid::new_v4().to_string();
        self.db.create_conversation(&id)?;
        self.conversation_id = id;
        self.last_reply = None;
        Ok(&self.conversation_id)
    }

    pub fn transcript(&self) -> Result<Vec<Message>> {
        Ok(self.db.get_conversation_messages(&self.conversation_id)?)
    }

    pub fn context_history(&self) -> impl Iterator<Item = &ContextSwitch> {
        self.switcher.history()
    }

    pub fn current_intent(&self) -> Intent {
        self.switcher.current_intent()
    }

    // ============ Messaging ============

    /// Route (when enabled), maybe open a ticket, then run the chat turn.
    pub async fn send_message(&mut self, content: &str) -> Result<SendResult> {
        let mut notices = Vec::new();
        let mut switch = None;

        let detected: Option<DetectedIntent> = if self.auto_context_switch {
            let decision = self.switcher.switch_context(content, self.agent, true).await;
            if let SwitchOutcome::Switched(agent) = decision.outcome {
                notices.push(format!("Switched to {} {}", agent.icon(), agent.name()));
                self.agent = agent;
            }
            let detected = decision.detected.clone();
            switch = Some(decision);
            Some(detected)
        } else if self.auto_create_tickets {
            Some(self.switcher.detect(content).await)
        } else {
            None
        };

        let mut ticket = None;
        if let Some(detected) = detected.as_ref().filter(|_| self.auto_create_tickets) {
            if detected.intent == Intent::Support && detected.confidence > AUTO_TICKET_CONFIDENCE {
                match self.router.create_ticket(AUTO_TICKET_TITLE, content, Some(self.conversation_id.as_str())).await {
                    Ok(created) => {
                        notices.push(format!(
                            "Opened ticket {} ({})",
                            created.id,
                            created.assigned_agent.as_deref().unwrap_or("unassigned")
                        ));
                        ticket = Some(created);
                    }
                    Err(e) => {
                        logging::log_error(Some(self.conversation_id.as_str()), &format!("Auto ticket failed: {}", e));
                        notices.push(format!("Could not open a support ticket: {}", e));
                    }
                }
            }
        }

        let prompt = self.roster.prompt(self.agent).to_string();
        let reply = self
            .chat
            .send(&self.conversation_id, self.agent, &prompt, &self.model, content)
            .await?;
        self.last_reply = Some(reply.clone());

        Ok(SendResult { reply, switch, ticket, notices })
    }

    /// Detect and propose an agent for `content` without switching.
    pub async fn suggest_agent(&mut self, content: &str) -> SwitchDecision {
        self.switcher.switch_context(content, self.agent, false).await
    }

    // ============ Feedback & Improvements ============

    fn last_rated(&self) -> Result<(&Message, Agent)> {
        let reply = self
            .last_reply
            .as_ref()
            .ok_or_else(|| SwitchboardError::NotFound("Reply to rate".to_string()))?;
        let agent = reply
            .agent_id
            .as_deref()
            .and_then(Agent::from_str)
            .unwrap_or(self.agent);
        Ok((reply, agent))
    }

    pub fn rate_last_reply(&self, rating: u8, text: Option<&str>) -> Result<Feedback> {
        let (reply, agent) = self.last_rated()?;
        feedback::submit(&self.db, agent, &reply.id, rating, text, &reply.content)
    }

    pub fn thumbs_up(&self) -> Result<Feedback> {
        let (reply, agent) = self.last_rated()?;
        feedback::submit_quick(&self.db, agent, &reply.id, &reply.content)
    }

    pub fn agent_stats(&self, agent: Agent) -> Result<AgentStats> {
        feedback::stats(&self.db, agent)
    }

    pub async fn generate_improvement(&self, agent: Agent) -> Result<GeneratedImprovement> {
        let stats = feedback::stats(&self.db, agent)?;
        if !feedback::can_generate_improvement(stats.feedback_count) {
            return Err(SwitchboardError::ImprovementNotReady(stats.feedback_count));
        }
        self.improver.generate(agent, self.roster.prompt(agent)).await
    }

    pub fn list_improvements(&self, agent: Agent) -> Result<Vec<Improvement>> {
        self.improver.list(agent)
    }

    pub fn activate_improvement(&mut self, agent: Agent, improvement_id: &str) -> Result<Improvement> {
        self.improver.activate(agent, improvement_id, &mut self.roster)
    }

    pub fn revert_agent(&mut self, agent: Agent) -> Result<()> {
        self.improver.revert(agent, &mut self.roster)
    }

    // ============ Tickets ============

    pub async fn create_ticket(&self, title: &str, description: &str) -> Result<Ticket> {
        self.router.create_ticket(title, description, Some(self.conversation_id.as_str())).await
    }

    pub fn route_ticket(&self, ticket_id: &str) -> Result<String> {
        self.router.route_ticket(ticket_id)
    }

    pub fn update_ticket_status(&self, ticket_id: &str, status: TicketStatus) -> Result<Ticket> {
        self.router.update_status(ticket_id, status)
    }

    pub fn tickets(&self) -> Result<Vec<Ticket>> {
        self.router.load_tickets()
    }

    // ============ Tools ============

    pub fn toggle_tool(&mut self, tool: McpTool) -> bool {
        let on = self.relay.toggle(tool);
        logging::log_mcp(None, &format!("{} {}", tool.name(), if on { "enabled" } else { "disabled" }));
        on
    }

    pub fn tool_enabled(&self, tool: McpTool) -> bool {
        self.relay.is_enabled(tool)
    }

    pub async fn execute_tool(&self, action: &McpAction) -> Result<Value> {
        self.relay.execute(action).await
    }

    pub fn relay(&self) -> &McpRelay {
        &self.relay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntentMode;
    use crate::test_support::ScriptedClient;

    fn config(mode: IntentMode) -> AppConfig {
        AppConfig {
            intent_mode: mode,
            ..AppConfig::default()
        }
    }

    fn session(cfg: &AppConfig, replies: Vec<Result<String>>) -> (Session, Arc<ScriptedClient>, Arc<Database>) {
        let client = Arc::new(ScriptedClient::new(replies));
        let db = Arc::new(Database::open_in_memory().unwrap());
        let session = Session::with_parts(cfg, client.clone(), db.clone()).unwrap();
        (session, client, db)
    }

    #[tokio::test]
    async fn test_remote_switch_then_chat() {
        let (mut s, client, _) = session(
            &config(IntentMode::Remote),
            vec![
                Ok("{\"intent\": \"coding\", \"confidence\": 88}".to_string()),
                Ok("Here is the fix".to_string()),
            ],
        );

        let result = s.send_message("my rust build fails").await.unwrap();
        assert_eq!(s.agent(), Agent::Coder);
        assert_eq!(result.reply.agent_id.as_deref(), Some("coder"));
        assert_eq!(result.switch.map(|d| d.outcome), Some(SwitchOutcome::Switched(Agent::Coder)));
        assert!(result.ticket.is_none());

        // Classifier once, chat once with the coder prompt
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].0, s.model());
        assert_eq!(requests[1].1[0].content, Agent::Coder.default_prompt());
    }

    #[tokio::test]
    async fn test_flags_off_skips_detection() {
        let mut cfg = config(IntentMode::Remote);
        cfg.auto_context_switch = false;
        let (mut s, client, _) = session(&cfg, vec![Ok("hello".to_string())]);

        let result = s.send_message("write me a story").await.unwrap();
        assert!(result.switch.is_none());
        assert_eq!(s.agent(), Agent::General);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_auto_ticket_for_confident_support() {
        let mut cfg = config(IntentMode::Remote);
        cfg.auto_create_tickets = true;
        let (mut s, client, _) = session(
            &cfg,
            vec![
                Ok("{\"intent\": \"support\", \"confidence\": 85}".to_string()),
                Ok("{\"category\": \"technical\", \"priority\": \"high\"}".to_string()),
                Ok("Sorry to hear that".to_string()),
            ],
        );

        let result = s.send_message("my account is broken").await.unwrap();
        let ticket = result.ticket.unwrap();
        assert_eq!(ticket.title, "Support Request");
        assert_eq!(ticket.description, "my account is broken");
        assert_eq!(ticket.assigned_agent.as_deref(), Some("tech-support"));
        assert_eq!(ticket.conversation_id.as_deref(), Some(s.conversation_id()));
        // Detection ran once
        assert_eq!(client.call_count(), 3);
        assert_eq!(s.tickets().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_ticket_needs_more_than_seventy() {
        let mut cfg = config(IntentMode::Remote);
        cfg.auto_create_tickets = true;
        cfg.auto_context_switch = false;
        let (mut s, _, _) = session(
            &cfg,
            vec![
                Ok("{\"intent\": \"support\", \"confidence\": 70}".to_string()),
                Ok("ok".to_string()),
            ],
        );

        let result = s.send_message("help").await.unwrap();
        assert!(result.ticket.is_none());
        assert!(s.tickets().unwrap().is_empty());
        assert_eq!(s.context_history().count(), 0);
    }

    #[tokio::test]
    async fn test_rate_and_improvement_guardrail() {
        let (mut s, _, _) = session(
            &config(IntentMode::Local),
            vec![
                Ok("a".to_string()),
                Ok("b".to_string()),
                Ok("{\"improved_prompt\": \"Shorter.\", \"improvement_reason\": \"brevity\", \"confidence\": 0.7}".to_string()),
            ],
        );

        assert!(matches!(s.rate_last_reply(5, None), Err(SwitchboardError::NotFound(_))));

        s.send_message("hi there").await.unwrap();
        s.rate_last_reply(5, None).unwrap();
        s.send_message("again").await.unwrap();
        s.rate_last_reply(4, Some("fine")).unwrap();

        let err = s.generate_improvement(Agent::General).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::ImprovementNotReady(2)));

        s.thumbs_up().unwrap();
        let stats = s.agent_stats(Agent::General).unwrap();
        assert_eq!(feedback::format_rating(stats.avg_rating), "4.7");
        assert_eq!(stats.conversation_count, 2);

        let generated = s.generate_improvement(Agent::General).await.unwrap();
        s.activate_improvement(Agent::General, &generated.improvement.id).unwrap();
        assert_eq!(s.roster().prompt(Agent::General), "Shorter.");

        s.revert_agent(Agent::General).unwrap();
        assert_eq!(s.roster().prompt(Agent::General), Agent::General.default_prompt());
    }

    #[tokio::test]
    async fn test_session_start_restores_active_prompt() {
        let cfg = config(IntentMode::Local);
        let client = Arc::new(ScriptedClient::new(vec![Ok(
            "{\"improved_prompt\": \"Analyst v2\", \"improvement_reason\": \"r\"}".to_string(),
        )]));
        let db = Arc::new(Database::open_in_memory().unwrap());
        let improver = PromptImprover::new(client.clone(), "m", db.clone());
        let mut roster = AgentRoster::new();
        let generated = improver.generate(Agent::Analyst, "P").await.unwrap();
        improver.activate(Agent::Analyst, &generated.improvement.id, &mut roster).unwrap();

        let s = Session::with_parts(&cfg, client, db).unwrap();
        assert_eq!(s.roster().prompt(Agent::Analyst), "Analyst v2");
    }

    #[tokio::test]
    async fn test_select_model_and_new_conversation() {
        let (mut s, _, _) = session(&config(IntentMode::Local), vec![Ok("x".to_string())]);
        assert!(s.select_model("openai/gpt-5").is_ok());
        assert_eq!(s.model(), "openai/gpt-5");
        assert!(s.select_model("unknown/model").is_err());

        s.send_message("hello").await.unwrap();
        let first = s.conversation_id().to_string();
        s.new_conversation().unwrap();
        assert_ne!(s.conversation_id(), first);
        assert!(s.transcript().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_tool_via_session() {
        let (mut s, _, _) = session(&config(IntentMode::Local), vec![]);
        let action = McpAction::new(McpTool::Gmail, "send_email", serde_json::json!({"to": "a@b.c"}));
        assert!(matches!(s.execute_tool(&action).await, Err(SwitchboardError::ToolDisabled(_))));
        assert!(s.toggle_tool(McpTool::Gmail));
        assert!(s.tool_enabled(McpTool::Gmail));
    }
}
