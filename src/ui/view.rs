//! How a transcript entry looks in the terminal.

use crate::api::MessageContent;
use crate::core::decoder::DecodeState;
use crate::core::envelope::ResponseEnvelope;
use crate::ui::markdown::{render_markdown, CodeBlock, RenderOptions};

pub const THINKING_TEXT: &str = "Thinking...";
pub const ERROR_TEXT: &str = "Something went wrong. Please try again.";
pub const HUMAN_AGENT_LABEL: &str = "Talk to a human";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewOptions {
    pub markdown: bool,
    pub render: RenderOptions,
}

impl ViewOptions {
    pub fn plain() -> Self {
        Self {
            markdown: true,
            render: RenderOptions::plain(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerView {
    pub lines: Vec<String>,
    pub code_blocks: Vec<CodeBlock>,
}

pub fn render_user(content: &MessageContent) -> Vec<String> {
    let mut lines = Vec::new();
    let text = content.joined_text().unwrap_or_default();
    if !text.is_empty() {
        let mut body = text.lines();
        if let Some(first) = body.next() {
            lines.push(format!("You: {first}"));
        }
        lines.extend(body.map(|line| format!("     {line}")));
    }
    if content.has_image() {
        lines.push("You: [image attached]".to_string());
    }
    lines
}

/// Render an assistant turn from its decoding state.
pub fn render_state(state: &DecodeState, options: ViewOptions) -> AnswerView {
    match state {
        DecodeState::Pending => AnswerView {
            lines: vec![THINKING_TEXT.to_string()],
            code_blocks: Vec::new(),
        },
        DecodeState::Errored => AnswerView {
            lines: vec![ERROR_TEXT.to_string()],
            code_blocks: Vec::new(),
        },
        DecodeState::Parsed(envelope) => render_envelope(envelope, options),
    }
}

pub fn render_envelope(envelope: &ResponseEnvelope, options: ViewOptions) -> AnswerView {
    let mut view = if options.markdown {
        let rendered = render_markdown(&envelope.response, options.render);
        AnswerView {
            lines: rendered.lines,
            code_blocks: rendered.code_blocks,
        }
    } else {
        AnswerView {
            lines: envelope.response.lines().map(str::to_string).collect(),
            code_blocks: Vec::new(),
        }
    };

    if let Some(redirect) = envelope.agent_redirect() {
        view.lines.push(String::new());
        let reason = if redirect.reason.is_empty() {
            String::new()
        } else {
            format!(" ({})", redirect.reason)
        };
        view.lines
            .push(format!("[{HUMAN_AGENT_LABEL}] type /human{reason}"));
    }

    let suggestions = envelope.suggestions();
    if !suggestions.is_empty() {
        view.lines.push(String::new());
        view.lines.push("Suggested questions (/ask <n>):".to_string());
        for (i, question) in suggestions.iter().enumerate() {
            view.lines.push(format!("  {}. {}", i + 1, question));
        }
    }

    view
}
