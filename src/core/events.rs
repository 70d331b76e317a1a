//! Typed notifications from the chat session to the panels that observe it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::api::MessageContent;
use crate::core::envelope::{DebugInfo, RedirectToAgent};

/// Mood attached to every human-agent request raised from the transcript.
pub const HUMAN_AGENT_MOOD: &str = "frustrated";

const EVENT_BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ChatEvent {
    /// Thinking trace, mood and debug info of the latest answer.
    SidebarUpdated {
        id: Option<String>,
        content: Option<String>,
        user_mood: Option<String>,
        debug: Option<DebugInfo>,
        matched_categories: Option<Vec<String>>,
    },
    /// Retrieval sources the backend used, with the query that produced them.
    RagSourcesUpdated {
        sources: Value,
        query: MessageContent,
        debug: Option<DebugInfo>,
    },
    AgentRedirectRequested(RedirectToAgent),
    HumanAgentRequested {
        reason: String,
        mood: String,
        timestamp: DateTime<Utc>,
    },
}

impl ChatEvent {
    pub fn human_agent_requested(redirect: &RedirectToAgent) -> Self {
        let reason = if redirect.reason.is_empty() {
            "Unknown".to_string()
        } else {
            redirect.reason.clone()
        };
        ChatEvent::HumanAgentRequested {
            reason,
            mood: HUMAN_AGENT_MOOD.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::SidebarUpdated { .. } => "updateSidebar",
            ChatEvent::RagSourcesUpdated { .. } => "updateRagSources",
            ChatEvent::AgentRedirectRequested(_) => "agentRedirectRequested",
            ChatEvent::HumanAgentRequested { .. } => "humanAgentRequested",
        }
    }
}

/// Cloneable handle onto a broadcast channel of [`ChatEvent`]s.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: ChatEvent) {
        let name = event.name();
        match self.tx.send(event) {
            Ok(receivers) => debug!(event = name, receivers, "published chat event"),
            Err(_) => debug!(event = name, "no subscribers for chat event"),
        }
    }
}
