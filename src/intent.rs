//! Intent detection: a remote classifier call with a keyword-scoring fallback.

use crate::agents::Agent;
use crate::config::IntentMode;
use crate::error::SwitchboardError;
use crate::gateway::{ChatMessage, CompletionClient};
use crate::json_extract;
use crate::logging;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Local keyword confidence never reaches certainty.
const LOCAL_CONFIDENCE_CAP: f64 = 95.0;
/// Confidence reported when the classifier reply cannot be read.
const NEUTRAL_CONFIDENCE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Coding,
    Writing,
    Analysis,
    Support,
    Creative,
    Technical,
    Conversational,
    Research,
}

impl Intent {
    /// Scoring order. Ties keep the earlier entry.
    pub const ALL: [Intent; 8] = [
        Intent::Coding,
        Intent::Writing,
        Intent::Analysis,
        Intent::Support,
        Intent::Creative,
        Intent::Technical,
        Intent::Conversational,
        Intent::Research,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Coding => "coding",
            Intent::Writing => "writing",
            Intent::Analysis => "analysis",
            Intent::Support => "support",
            Intent::Creative => "creative",
            Intent::Technical => "technical",
            Intent::Conversational => "conversational",
            Intent::Research => "research",
        }
    }

    pub fn from_str(s: &str) -> Option<Intent> {
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == s.trim().to_lowercase())
    }

    pub fn agent(&self) -> Agent {
        match self {
            Intent::Coding | Intent::Technical => Agent::Coder,
            Intent::Writing | Intent::Creative => Agent::Writer,
            Intent::Analysis | Intent::Research => Agent::Analyst,
            Intent::Support | Intent::Conversational => Agent::General,
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Intent::Coding => &["code", "bug", "function", "class", "debug", "error", "algorithm", "programming", "syntax"],
            Intent::Writing => &["write", "essay", "article", "story", "email", "letter", "draft", "compose"],
            Intent::Analysis => &["analyze", "data", "statistics", "chart", "graph", "trends", "metrics", "insights"],
            Intent::Support => &["help", "issue", "problem", "broken", "not working", "error message", "ticket"],
            Intent::Creative => &["creative", "imagine", "design", "brainstorm", "idea", "concept", "art"],
            Intent::Technical => &["architecture", "system", "infrastructure", "deployment", "performance", "optimization"],
            Intent::Conversational => &["chat", "talk", "discuss", "opinion", "think", "feel", "what do you"],
            Intent::Research => &["research", "study", "investigate", "explore", "learn about", "find information"],
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Intent::Coding => "Programming and development tasks",
            Intent::Writing => "Creative and professional writing",
            Intent::Analysis => "Data analysis and interpretation",
            Intent::Support => "Support and troubleshooting",
            Intent::Creative => "Creative ideation and design",
            Intent::Technical => "Technical architecture and systems",
            Intent::Conversational => "General conversation",
            Intent::Research => "Research and information gathering",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedIntent {
    pub intent: Intent,
    /// 0-100
    pub confidence: f64,
    pub suggested_agent: Agent,
    pub keywords: Vec<String>,
}

impl DetectedIntent {
    /// Neutral result used when the classifier answer is unusable.
    pub fn neutral() -> Self {
        Self {
            intent: Intent::Conversational,
            confidence: NEUTRAL_CONFIDENCE,
            suggested_agent: Agent::General,
            keywords: Vec::new(),
        }
    }
}

/// Keyword-overlap scoring across the fixed intent table.
pub fn detect_locally(message: &str) -> DetectedIntent {
    let lower = message.to_lowercase();
    let mut max_score = 0.0_f64;
    let mut detected = Intent::Conversational;
    let mut matched_keywords: Vec<String> = Vec::new();

    for intent in Intent::ALL {
        let keywords = intent.keywords();
        let matches: Vec<String> = keywords
            .iter()
            .filter(|kw| lower.contains(*kw))
            .map(|kw| kw.to_string())
            .collect();

        let score = matches.len() as f64 / keywords.len() as f64;
        if score > max_score {
            max_score = score;
            detected = intent;
            matched_keywords = matches;
        }
    }

    DetectedIntent {
        intent: detected,
        confidence: (max_score * 100.0).min(LOCAL_CONFIDENCE_CAP),
        suggested_agent: detected.agent(),
        keywords: matched_keywords,
    }
}

const CLASSIFIER_PROMPT: &str = r#"You are an intent classifier. Analyze user messages and classify their intent.

Available intents:
- coding: Programming, debugging, code-related tasks
- writing: Creative writing, articles, emails, documentation
- analysis: Data analysis, statistics, insights, trends
- support: Help, troubleshooting, issues, problems
- creative: Brainstorming, design, creative ideation
- technical: System architecture, infrastructure, deployment
- conversational: General chat, opinions, casual discussion
- research: Information gathering, learning, exploration

Return ONLY a JSON object:
{
  "intent": "detected_intent",
  "confidence": 0.0-100.0,
  "keywords": ["key", "words", "found"],
  "reasoning": "brief explanation"
}"#;

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    intent: String,
    confidence: f64,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Interpret a classifier reply. Unknown intents and unreadable replies give the neutral result.
pub fn parse_classifier_reply(content: &str) -> DetectedIntent {
    let reply: ClassifierReply = match json_extract::try_extract(content) {
        Ok(reply) => reply,
        Err(e) => {
            logging::log_error(None, &format!("Failed to parse intent reply: {}", e));
            return DetectedIntent::neutral();
        }
    };

    let Some(intent) = Intent::from_str(&reply.intent) else {
        logging::log_intent(None, &format!("Classifier returned unknown intent '{}'", reply.intent));
        return DetectedIntent::neutral();
    };

    if let Some(reasoning) = &reply.reasoning {
        logging::log_intent(None, &format!("Classifier reasoning: {}", reasoning));
    }

    DetectedIntent {
        intent,
        confidence: reply.confidence.clamp(0.0, 100.0),
        suggested_agent: intent.agent(),
        keywords: reply.keywords,
    }
}

pub struct IntentDetector {
    client: Arc<dyn CompletionClient>,
    model: String,
    mode: IntentMode,
}

impl IntentDetector {
    pub fn new(client: Arc<dyn CompletionClient>, model: &str, mode: IntentMode) -> Self {
        Self {
            client,
            model: model.to_string(),
            mode,
        }
    }

    /// Detect the intent of `message`. Never fails: a failed or unreadable
    /// classifier call gives the neutral result, and an unconfigured gateway
    /// falls back to keyword scoring.
    pub async fn detect(&self, message: &str) -> DetectedIntent {
        if self.mode == IntentMode::Local {
            return detect_locally(message);
        }

        let preview: String = message.chars().take(50).collect();
        logging::log_intent(None, &format!("Detecting intent for message: \"{}...\"", preview));

        let messages = vec![
            ChatMessage::system(CLASSIFIER_PROMPT),
            ChatMessage::user(message),
        ];

        let detected = match self.client.chat_completion(&self.model, messages).await {
            Ok(content) => parse_classifier_reply(&content),
            Err(SwitchboardError::Config(reason)) => {
                logging::log_intent(None, &format!("Classifier unavailable ({}), using keywords", reason));
                detect_locally(message)
            }
            Err(e) => {
                logging::log_error(None, &format!("Intent detection failed: {}", e));
                DetectedIntent::neutral()
            }
        };

        logging::log_intent(None, &format!(
            "Detected intent: {} ({:.0}%) -> {}",
            detected.intent.as_str(), detected.confidence, detected.suggested_agent.as_str()
        ));

        detected
    }
}
