pub mod models;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::message::ChatMessage;

/// Source payload of an image block. Only inline base64 data is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    pub fn base64(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: "base64".to_string(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Image { .. } => None,
        }
    }
}

/// Content of a single turn: a plain string, or an ordered list of blocks
/// for multimodal turns. Serialized untagged so it matches the wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Build the content of a user turn: plain text when no image is attached,
    /// otherwise exactly one text block followed by one image block.
    pub fn user_turn(text: impl Into<String>, image: Option<ImageSource>) -> Self {
        let text = text.into();
        match image {
            None => MessageContent::Text(text),
            Some(source) => MessageContent::Blocks(vec![
                ContentBlock::Text { text },
                ContentBlock::Image { source },
            ]),
        }
    }

    /// Normalize into a block list, wrapping plain text as one text block.
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::Text { text }],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    /// Text blocks joined with single spaces, or `None` when there are none.
    pub fn joined_text(&self) -> Option<String> {
        match self {
            MessageContent::Text(text) => Some(text.clone()),
            MessageContent::Blocks(blocks) => {
                let texts: Vec<&str> = blocks.iter().filter_map(ContentBlock::as_text).collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join(" "))
                }
            }
        }
    }

    pub fn has_image(&self) -> bool {
        match self {
            MessageContent::Text(_) => false,
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .any(|block| matches!(block, ContentBlock::Image { .. })),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

/// A message as the upstream inference API sees it. The role is carried
/// verbatim; the adapter does not validate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ApiMessage {
    pub fn new(role: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Upstream message after shaping: content is always a block list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvokeMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvokeRequest {
    pub anthropic_version: String,
    pub max_tokens: u32,
    pub messages: Vec<InvokeMessage>,
    pub system: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvokeResponseBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvokeUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Provider reply. Only the fields the client reads are typed; the full body
/// is kept alongside in [`crate::core::adapter::InvokeOutcome`].
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<InvokeResponseBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub usage: Option<InvokeUsage>,
}

impl InvokeResponse {
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Body of the client's submit call to the chat backend.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    #[serde(rename = "knowledgeBaseId")]
    pub knowledge_base_id: String,
}

/// `X-Debug-Data` header payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DebugHeader {
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Value,
}
