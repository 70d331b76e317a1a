//! Auxiliary data the backend sends in response headers rather than in the
//! envelope body.

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::DebugHeader;
use crate::core::envelope::ResponseEnvelope;

pub const SUGGESTED_QUESTIONS_HEADER: &str = "x-suggested-questions";
pub const RAG_SOURCES_HEADER: &str = "x-rag-sources";
pub const DEBUG_DATA_HEADER: &str = "x-debug-data";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SideChannel {
    pub suggested_questions: Option<Vec<String>>,
    pub rag_sources: Option<Value>,
    pub debug: Option<DebugHeader>,
}

fn header_json<T: DeserializeOwned>(headers: &HeaderMap, name: &str) -> Option<T> {
    let value = headers.get(name)?;
    let raw = String::from_utf8_lossy(value.as_bytes());
    match serde_json::from_str(&raw) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(header = name, %err, "ignoring malformed side-channel header");
            None
        }
    }
}

impl SideChannel {
    /// Read every side-channel header once. Malformed values are logged and
    /// dropped; they never fail the response.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let debug = header_json::<DebugHeader>(headers, DEBUG_DATA_HEADER);
        if let Some(debug_data) = &debug {
            debug!(
                msg = debug_data.msg.as_deref().unwrap_or_default(),
                data = %debug_data.data,
                "server debug"
            );
        }

        Self {
            suggested_questions: header_json(headers, SUGGESTED_QUESTIONS_HEADER),
            rag_sources: header_json(headers, RAG_SOURCES_HEADER),
            debug,
        }
    }

    /// Merge the header-borne fields that belong in the stored envelope.
    pub fn merge_into(&self, envelope: &mut ResponseEnvelope) {
        if let Some(questions) = &self.suggested_questions {
            envelope.set_suggested_questions(questions.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};
    use serde_json::json;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn suggested_questions_merge_into_envelope() {
        let side = SideChannel::from_headers(&headers(&[(
            "x-suggested-questions",
            r#"["A?","B?"]"#,
        )]));
        let mut envelope = ResponseEnvelope::from_text("Hi");
        side.merge_into(&mut envelope);
        assert_eq!(envelope.suggestions(), ["A?".to_string(), "B?".to_string()]);
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let side = SideChannel::from_headers(&headers(&[
            ("X-Debug-Data", r#"{"msg":"kb hit","data":{"score":1}}"#),
            ("X-RAG-Sources", r#"[{"id":"doc-1"}]"#),
        ]));
        assert_eq!(side.debug.unwrap().msg.as_deref(), Some("kb hit"));
        assert_eq!(side.rag_sources, Some(json!([{"id": "doc-1"}])));
    }

    #[test]
    fn malformed_headers_are_ignored() {
        let side = SideChannel::from_headers(&headers(&[
            ("x-suggested-questions", "not json"),
            ("x-rag-sources", "{"),
        ]));
        assert_eq!(side, SideChannel::default());

        let mut envelope = ResponseEnvelope::from_text("Hi");
        side.merge_into(&mut envelope);
        assert!(envelope.suggested_questions.is_none());
    }

    #[test]
    fn absent_headers_leave_envelope_untouched() {
        let side = SideChannel::from_headers(&HeaderMap::new());
        let mut envelope = ResponseEnvelope::parse(r#"{"response":"x","suggested_questions":["keep"]}"#).unwrap();
        side.merge_into(&mut envelope);
        assert_eq!(envelope.suggestions(), ["keep".to_string()]);
    }
}
