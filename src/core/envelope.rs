//! The JSON envelope stored as the content of every assistant turn.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// `response` value the backend uses while an answer is still being produced.
pub const SENTINEL_RESPONSE: &str = "...";

/// Status text carried by the optimistic placeholder turn.
pub const PLACEHOLDER_THINKING: &str = "AI is processing...";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    #[serde(default)]
    pub context_used: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectToAgent {
    #[serde(default)]
    pub should_redirect: bool,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "string_or_null")]
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to_agent: Option<RedirectToAgent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_questions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_categories: Option<Vec<String>>,
    /// Set only on envelopes the client writes after a failed request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn is_sentinel_response(response: &str) -> bool {
    response.is_empty() || response == SENTINEL_RESPONSE
}

impl ResponseEnvelope {
    /// The optimistic assistant turn appended on submit.
    pub fn placeholder() -> Self {
        Self {
            thinking: Some(PLACEHOLDER_THINKING.to_string()),
            user_mood: Some("neutral".to_string()),
            debug: Some(DebugInfo::default()),
            ..Self::default()
        }
    }

    /// Terminal envelope that replaces the placeholder when the backend call
    /// fails, so the turn does not stay stuck in the thinking state.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            user_mood: Some("neutral".to_string()),
            debug: Some(DebugInfo::default()),
            ..Self::default()
        }
    }

    /// Envelope wrapping literal display text that was not JSON.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            response: text.into(),
            ..Self::default()
        }
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> String {
        // Every map key here is a string, so serialization is infallible.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Whether the answer is ready to render as final.
    pub fn is_terminal(&self) -> bool {
        !is_sentinel_response(&self.response)
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn suggestions(&self) -> &[String] {
        self.suggested_questions.as_deref().unwrap_or(&[])
    }

    pub fn set_suggested_questions(&mut self, questions: Vec<String>) {
        self.suggested_questions = Some(questions);
    }

    /// The redirect request, only when the backend asked for a human agent.
    pub fn agent_redirect(&self) -> Option<&RedirectToAgent> {
        self.redirect_to_agent
            .as_ref()
            .filter(|redirect| redirect.should_redirect)
    }

    pub fn trimmed_thinking(&self) -> Option<String> {
        self.thinking.as_deref().map(|text| text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholder_matches_wire_shape() {
        let value: Value = serde_json::from_str(&ResponseEnvelope::placeholder().to_json()).unwrap();
        assert_eq!(
            value,
            json!({
                "response": "",
                "thinking": "AI is processing...",
                "user_mood": "neutral",
                "debug": {"context_used": false}
            })
        );
    }

    #[test]
    fn sentinel_values_are_not_terminal() {
        assert!(!ResponseEnvelope::from_text("").is_terminal());
        assert!(!ResponseEnvelope::from_text("...").is_terminal());
        assert!(ResponseEnvelope::from_text("....").is_terminal());
        assert!(ResponseEnvelope::from_text("Hi").is_terminal());
    }

    #[test]
    fn missing_or_null_response_parses_as_empty() {
        let envelope = ResponseEnvelope::parse(r#"{"thinking":"working"}"#).unwrap();
        assert_eq!(envelope.response, "");
        let envelope = ResponseEnvelope::parse(r#"{"response":null}"#).unwrap();
        assert_eq!(envelope.response, "");
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let raw = r#"{"response":"Hi","user_mood":"happy","debug":{"context_used":true,"kb":"x"},"confidence":0.9}"#;
        let envelope = ResponseEnvelope::parse(raw).unwrap();
        assert_eq!(envelope.extra.get("confidence"), Some(&json!(0.9)));
        assert_eq!(
            envelope.debug.as_ref().and_then(|d| d.extra.get("kb")),
            Some(&json!("x"))
        );

        let reparsed = ResponseEnvelope::parse(&envelope.to_json()).unwrap();
        assert_eq!(reparsed, envelope);
    }

    #[test]
    fn agent_redirect_requires_should_redirect() {
        let envelope = ResponseEnvelope::parse(
            r#"{"response":"ok","redirect_to_agent":{"should_redirect":false,"reason":"x"}}"#,
        )
        .unwrap();
        assert!(envelope.agent_redirect().is_none());

        let envelope = ResponseEnvelope::parse(
            r#"{"response":"ok","redirect_to_agent":{"should_redirect":true,"reason":"billing"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.agent_redirect().unwrap().reason, "billing");
    }

    #[test]
    fn failure_envelope_is_flagged() {
        let envelope = ResponseEnvelope::failure("status 502");
        assert!(envelope.is_failure());
        assert!(!envelope.is_terminal());
        let reparsed = ResponseEnvelope::parse(&envelope.to_json()).unwrap();
        assert_eq!(reparsed.error.as_deref(), Some("status 502"));
    }
}
