//! Decoding state machine for assistant turns.
//!
//! An assistant turn starts out holding the placeholder envelope and is
//! replaced wholesale once the backend answers. [`EnvelopeDecoder`] tracks a
//! single turn through `Pending -> Parsed` or `Pending -> Errored`;
//! [`EnvelopeWatch`] drives it from a stream of content updates and enforces
//! the timeout.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::MessageContent;
use crate::core::envelope::ResponseEnvelope;
use crate::core::message::ChatMessage;

pub const DEFAULT_ENVELOPE_TIMEOUT: Duration = Duration::from_secs(30);
/// Longer timeouts are clamped so the deadline always fits in an `Instant`.
pub const MAX_ENVELOPE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub enum DecodeState {
    Pending,
    Parsed(ResponseEnvelope),
    Errored,
}

impl DecodeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DecodeState::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct EnvelopeDecoder {
    state: DecodeState,
    deadline: Instant,
    thinking: Option<String>,
}

impl EnvelopeDecoder {
    pub fn new(started_at: Instant, timeout: Duration) -> Self {
        Self {
            state: DecodeState::Pending,
            deadline: started_at + timeout.min(MAX_ENVELOPE_TIMEOUT),
            thinking: None,
        }
    }

    /// Start decoding a transcript entry. User turns render their raw content
    /// and never get a decoder.
    pub fn for_message(message: &ChatMessage, started_at: Instant, timeout: Duration) -> Option<Self> {
        if !message.is_assistant() {
            return None;
        }
        let mut decoder = Self::new(started_at, timeout);
        decoder.observe(&message.content);
        Some(decoder)
    }

    pub fn state(&self) -> &DecodeState {
        &self.state
    }

    pub fn into_state(self) -> DecodeState {
        self.state
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Status text of the most recent non-final envelope, if any.
    pub fn thinking(&self) -> Option<&str> {
        self.thinking.as_deref()
    }

    /// Feed the current content of the turn. Terminal states are final and
    /// ignore further updates.
    pub fn observe(&mut self, content: &MessageContent) -> &DecodeState {
        if self.is_terminal() {
            return &self.state;
        }

        match content {
            MessageContent::Text(raw) => {
                if raw.is_empty() {
                    return &self.state;
                }
                match ResponseEnvelope::parse(raw) {
                    Ok(envelope) => self.apply(envelope),
                    Err(err) => {
                        debug!(%err, "assistant content is not a JSON envelope");
                        self.state = DecodeState::Errored;
                    }
                }
            }
            MessageContent::Blocks(_) => match content.joined_text() {
                None => {
                    debug!("assistant content has no text blocks");
                    self.state = DecodeState::Errored;
                }
                Some(text) => match ResponseEnvelope::parse(&text) {
                    Ok(envelope) => self.apply(envelope),
                    Err(err) => {
                        debug!(%err, "displaying assistant text blocks verbatim");
                        self.state = DecodeState::Parsed(ResponseEnvelope::from_text(text));
                    }
                },
            },
        }

        &self.state
    }

    fn apply(&mut self, envelope: ResponseEnvelope) {
        if envelope.is_failure() {
            self.state = DecodeState::Errored;
        } else if envelope.is_terminal() {
            self.state = DecodeState::Parsed(envelope);
        } else {
            self.thinking = envelope.thinking;
        }
    }

    /// Fail a still-pending turn once the deadline has passed. Returns `true`
    /// only for the call that performed the transition.
    pub fn expire(&mut self, now: Instant) -> bool {
        if self.is_terminal() || now < self.deadline {
            return false;
        }
        self.state = DecodeState::Errored;
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Settled(DecodeState),
    Cancelled,
}

/// Drives an [`EnvelopeDecoder`] from content updates until it settles, the
/// deadline passes, or the token is cancelled.
pub struct EnvelopeWatch {
    decoder: EnvelopeDecoder,
    updates: watch::Receiver<MessageContent>,
    cancel: CancellationToken,
}

impl EnvelopeWatch {
    pub fn new(
        decoder: EnvelopeDecoder,
        updates: watch::Receiver<MessageContent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            decoder,
            updates,
            cancel,
        }
    }

    pub async fn run(mut self) -> WatchOutcome {
        let current = self.updates.borrow_and_update().clone();
        self.decoder.observe(&current);
        let mut updates_open = true;

        loop {
            if self.decoder.is_terminal() {
                return WatchOutcome::Settled(self.decoder.into_state());
            }

            let deadline = self.decoder.deadline();
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return WatchOutcome::Cancelled,
                _ = sleep_until(deadline) => {
                    self.decoder.expire(Instant::now());
                }
                changed = self.updates.changed(), if updates_open => match changed {
                    Ok(()) => {
                        let content = self.updates.borrow_and_update().clone();
                        self.decoder.observe(&content);
                    }
                    Err(_) => updates_open = false,
                },
            }
        }
    }
}
