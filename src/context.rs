//! Intent-driven agent switching.

use crate::agents::Agent;
use crate::intent::{DetectedIntent, Intent, IntentDetector};
use crate::logging;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Minimum confidence (0-100) before a different agent is proposed.
pub const SWITCH_CONFIDENCE_THRESHOLD: f64 = 60.0;
/// Number of switch records kept in memory.
pub const CONTEXT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSwitch {
    pub previous_agent: Agent,
    pub new_agent: Agent,
    pub previous_intent: Intent,
    pub new_intent: Intent,
    pub confidence: f64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchOutcome {
    /// Auto-switch was on; the caller should now use this agent.
    Switched(Agent),
    /// Auto-switch was off; this agent is offered for manual confirmation.
    Suggested(Agent),
    NoAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchDecision {
    pub detected: DetectedIntent,
    pub outcome: SwitchOutcome,
}

pub struct ContextSwitcher {
    detector: IntentDetector,
    history: VecDeque<ContextSwitch>,
    current_intent: Intent,
}

impl ContextSwitcher {
    pub fn new(detector: IntentDetector) -> Self {
        Self {
            detector,
            history: VecDeque::with_capacity(CONTEXT_HISTORY_LIMIT),
            current_intent: Intent::Conversational,
        }
    }

    pub async fn detect(&self, message: &str) -> DetectedIntent {
        self.detector.detect(message).await
    }

    /// Detect the intent of `message` and decide whether to move away from `current_agent`.
    pub async fn switch_context(
        &mut self,
        message: &str,
        current_agent: Agent,
        auto_switch: bool,
    ) -> SwitchDecision {
        let detected = self.detector.detect(message).await;
        let outcome = self.apply(&detected, current_agent, auto_switch);
        SwitchDecision { detected, outcome }
    }

    /// Pure policy step: record the intent and, past the threshold, the switch.
    pub fn apply(
        &mut self,
        detected: &DetectedIntent,
        current_agent: Agent,
        auto_switch: bool,
    ) -> SwitchOutcome {
        let previous_intent = self.current_intent;
        self.current_intent = detected.intent;

        let suggested = detected.suggested_agent;
        if suggested == current_agent || detected.confidence < SWITCH_CONFIDENCE_THRESHOLD {
            return SwitchOutcome::NoAction;
        }

        let record = ContextSwitch {
            previous_agent: current_agent,
            new_agent: suggested,
            previous_intent,
            new_intent: detected.intent,
            confidence: detected.confidence,
            reason: format!(
                "Detected {} intent with {:.0}% confidence",
                detected.intent.as_str(),
                detected.confidence
            ),
            timestamp: Utc::now(),
        };

        logging::log_routing(None, &format!(
            "{} -> {} ({})", current_agent.as_str(), suggested.as_str(), record.reason
        ));

        self.history.push_front(record);
        self.history.truncate(CONTEXT_HISTORY_LIMIT);

        if auto_switch {
            SwitchOutcome::Switched(suggested)
        } else {
            SwitchOutcome::Suggested(suggested)
        }
    }

    /// Switch records, newest first.
    pub fn history(&self) -> impl Iterator<Item = &ContextSwitch> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn current_intent(&self) -> Intent {
        self.current_intent
    }
}
