// Agent personas, selectable chat models, and the live prompt roster.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    #[default]
    General,
    Coder,
    Writer,
    Analyst,
}

impl Agent {
    pub const ALL: [Agent; 4] = [Agent::General, Agent::Coder, Agent::Writer, Agent::Analyst];

    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::General => "general",
            Agent::Coder => "coder",
            Agent::Writer => "writer",
            Agent::Analyst => "analyst",
        }
    }

    pub fn from_str(s: &str) -> Option<Agent> {
        match s.trim().to_lowercase().as_str() {
            "general" => Some(Agent::General),
            "coder" => Some(Agent::Coder),
            "writer" => Some(Agent::Writer),
            "analyst" => Some(Agent::Analyst),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Agent::General => "General Assistant",
            Agent::Coder => "Code Expert",
            Agent::Writer => "Creative Writer",
            Agent::Analyst => "Data Analyst",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Agent::General => "Helpful for any task",
            Agent::Coder => "Programming help",
            Agent::Writer => "Writing & creativity",
            Agent::Analyst => "Analysis & insights",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Agent::General => "🤖",
            Agent::Coder => "💻",
            Agent::Writer => "✍️",
            Agent::Analyst => "📊",
        }
    }

    /// The built-in system prompt, before any improvement is applied.
    pub fn default_prompt(&self) -> &'static str {
        match self {
            Agent::General => "You are a helpful AI assistant. Keep answers clear, concise, and engaging. Use markdown formatting when appropriate.",
            Agent::Coder => "You are an expert programmer. Help with code, debugging, and technical explanations. Always provide clean, well-commented code examples.",
            Agent::Writer => "You are a creative writing assistant. Help with stories, articles, emails, and any creative content. Be imaginative and engaging.",
            Agent::Analyst => "You are a data analyst. Help interpret data, suggest analyses, and explain findings clearly. Be precise and data-driven.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    OpenAI,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Model {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub provider: Provider,
}

pub const AVAILABLE_MODELS: [Model; 5] = [
    Model { id: "google/gemini-3-flash-preview", name: "Gemini 3 Flash", description: "Fast & balanced", provider: Provider::Google },
    Model { id: "google/gemini-2.5-flash", name: "Gemini 2.5 Flash", description: "Quick responses", provider: Provider::Google },
    Model { id: "google/gemini-2.5-pro", name: "Gemini 2.5 Pro", description: "Best reasoning", provider: Provider::Google },
    Model { id: "openai/gpt-5-mini", name: "GPT-5 Mini", description: "Balanced performance", provider: Provider::OpenAI },
    Model { id: "openai/gpt-5", name: "GPT-5", description: "Most capable", provider: Provider::OpenAI },
];

pub fn find_model(id: &str) -> Option<&'static Model> {
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}

/// Live prompt state per agent. An activated improvement overwrites the
/// prompt; resetting restores the built-in text.
#[derive(Debug, Clone, Default)]
pub struct AgentRoster {
    overrides: HashMap<Agent, String>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompt(&self, agent: Agent) -> &str {
        self.overrides
            .get(&agent)
            .map(String::as_str)
            .unwrap_or_else(|| agent.default_prompt())
    }

    pub fn set_prompt(&mut self, agent: Agent, prompt: impl Into<String>) {
        self.overrides.insert(agent, prompt.into());
    }

    pub fn reset(&mut self, agent: Agent) {
        self.overrides.remove(&agent);
    }

    pub fn is_customized(&self, agent: Agent) -> bool {
        self.overrides.contains_key(&agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_round_trip_ids() {
        for agent in Agent::ALL {
            assert_eq!(Agent::from_str(agent.as_str()), Some(agent));
        }
        assert_eq!(Agent::from_str(" Coder "), Some(Agent::Coder));
        assert_eq!(Agent::from_str("tech-support"), None);
        assert_eq!(Agent::default(), Agent::General);
    }

    #[test]
    fn test_roster_override_and_reset() {
        let mut roster = AgentRoster::new();
        assert_eq!(roster.prompt(Agent::Writer), Agent::Writer.default_prompt());

        roster.set_prompt(Agent::Writer, "Be brief.");
        assert_eq!(roster.prompt(Agent::Writer), "Be brief.");
        assert!(roster.is_customized(Agent::Writer));
        assert_eq!(roster.prompt(Agent::Coder), Agent::Coder.default_prompt());

        roster.reset(Agent::Writer);
        assert_eq!(roster.prompt(Agent::Writer), Agent::Writer.default_prompt());
    }

    #[test]
    fn test_model_catalog() {
        assert_eq!(find_model("openai/gpt-5").map(|m| m.provider), Some(Provider::OpenAI));
        assert!(find_model(crate::config::DEFAULT_CHAT_MODEL).is_some());
        assert!(find_model("acme/unknown-model").is_none());
    }
}
