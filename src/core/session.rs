//! Transcript ownership and the submit/response cycle of one chat session.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::api::{ImageSource, MessageContent, SubmitRequest};
use crate::core::backend::{BackendClient, BackendError, BackendReply};
use crate::core::decoder::{DecodeState, EnvelopeDecoder, EnvelopeWatch, WatchOutcome};
use crate::core::envelope::ResponseEnvelope;
use crate::core::events::{ChatEvent, EventBus};
use crate::core::message::ChatMessage;

#[derive(Debug)]
pub enum SessionError {
    /// A turn is already waiting for the backend.
    Busy,
    EmptyPrompt,
    NoSuggestion { index: usize },
    Backend(BackendError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Busy => write!(f, "A response is still pending; wait for it to finish"),
            SessionError::EmptyPrompt => write!(f, "Type a message or attach an image first"),
            SessionError::NoSuggestion { index } => {
                write!(f, "No suggested question #{index} on the last answer")
            }
            SessionError::Backend(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Backend(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for SessionError {
    fn from(err: BackendError) -> Self {
        SessionError::Backend(err)
    }
}

/// Clears the session's in-flight flag when dropped.
#[derive(Debug)]
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A submitted turn whose backend request has not been sent yet.
#[derive(Debug)]
pub struct PendingTurn {
    placeholder_id: String,
    query: MessageContent,
    request: SubmitRequest,
    _guard: InFlightGuard,
}

impl PendingTurn {
    pub fn placeholder_id(&self) -> &str {
        &self.placeholder_id
    }

    pub fn request(&self) -> &SubmitRequest {
        &self.request
    }

    /// Send the request. The session is not borrowed while the call is in
    /// flight, so callers can keep watching the placeholder meanwhile.
    pub async fn send(self, backend: &BackendClient) -> CompletedTurn {
        let result = backend.submit(&self.request).await;
        CompletedTurn {
            pending: self,
            result,
        }
    }
}

#[derive(Debug)]
pub struct CompletedTurn {
    pending: PendingTurn,
    result: Result<BackendReply, BackendError>,
}

/// How a turn looked to the user once it settled.
#[derive(Debug)]
pub struct TurnReport {
    pub placeholder_id: String,
    pub state: DecodeState,
    /// The backend failure behind an `Errored` state, if there was one.
    pub error: Option<SessionError>,
    /// The decoder gave up before the backend answered. The request keeps
    /// running; its answer is committed by [`ChatSession::commit_late_turns`].
    pub timed_out: bool,
}

/// A turn whose answer arrived after its watch had already timed out.
#[derive(Debug)]
pub struct LateTurn {
    pub placeholder_id: String,
    pub result: Result<ResponseEnvelope, SessionError>,
}

pub struct ChatSession {
    backend: BackendClient,
    events: EventBus,
    transcript: Vec<ChatMessage>,
    model: String,
    knowledge_base_id: String,
    pending_image: Option<ImageSource>,
    in_flight: Arc<AtomicBool>,
    watchers: HashMap<String, watch::Sender<MessageContent>>,
    late_tx: mpsc::UnboundedSender<CompletedTurn>,
    late_rx: mpsc::UnboundedReceiver<CompletedTurn>,
}

impl ChatSession {
    pub fn new(
        backend: BackendClient,
        events: EventBus,
        model: impl Into<String>,
        knowledge_base_id: impl Into<String>,
    ) -> Self {
        let (late_tx, late_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            events,
            transcript: Vec::new(),
            model: model.into(),
            knowledge_base_id: knowledge_base_id.into(),
            pending_image: None,
            in_flight: Arc::new(AtomicBool::new(false)),
            watchers: HashMap::new(),
            late_tx,
            late_rx,
        }
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.transcript.iter().find(|message| message.id == id)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn attach_image(&mut self, source: ImageSource) {
        self.pending_image = Some(source);
    }

    pub fn clear_image(&mut self) {
        self.pending_image = None;
    }

    pub fn pending_image(&self) -> Option<&ImageSource> {
        self.pending_image.as_ref()
    }

    /// Updates to the content of the message with `id`. The receiver starts
    /// at the current content and sees the replacement when the turn settles.
    pub fn subscribe(&mut self, id: &str) -> watch::Receiver<MessageContent> {
        if let Some(tx) = self.watchers.get(id) {
            return tx.subscribe();
        }
        let current = self
            .message(id)
            .map(|message| message.content.clone())
            .unwrap_or_else(|| MessageContent::Text(String::new()));
        let (tx, rx) = watch::channel(current);
        self.watchers.insert(id.to_string(), tx);
        rx
    }

    /// Append the user turn and the placeholder, and capture the request body.
    /// The pending image is consumed.
    pub fn begin_turn(&mut self, text: &str) -> Result<PendingTurn, SessionError> {
        if text.trim().is_empty() && self.pending_image.is_none() {
            return Err(SessionError::EmptyPrompt);
        }
        // A late answer still holds the guard until it is committed.
        self.commit_late_turns();
        let guard = InFlightGuard::acquire(&self.in_flight).ok_or(SessionError::Busy)?;

        let content = MessageContent::user_turn(text, self.pending_image.take());
        self.transcript.push(ChatMessage::user(content.clone()));
        let request = SubmitRequest {
            messages: self.transcript.clone(),
            model: self.model.clone(),
            knowledge_base_id: self.knowledge_base_id.clone(),
        };

        let placeholder = ChatMessage::assistant(&ResponseEnvelope::placeholder());
        let placeholder_id = placeholder.id.clone();
        self.transcript.push(placeholder);
        debug!(
            placeholder = %placeholder_id,
            messages = request.messages.len(),
            model = %self.model,
            "turn submitted"
        );

        Ok(PendingTurn {
            placeholder_id,
            query: content,
            request,
            _guard: guard,
        })
    }

    /// Commit the backend's answer (or a failure envelope) in place of the
    /// placeholder and publish the resulting events.
    pub fn finish_turn(&mut self, completed: CompletedTurn) -> Result<ResponseEnvelope, SessionError> {
        let CompletedTurn { pending, result } = completed;

        match result {
            Ok(BackendReply {
                envelope,
                side_channel,
            }) => {
                if let Some(sources) = side_channel.rag_sources {
                    self.events.publish(ChatEvent::RagSourcesUpdated {
                        sources,
                        query: pending.query.clone(),
                        debug: envelope.debug.clone(),
                    });
                }

                self.replace_placeholder(&pending.placeholder_id, &envelope);
                self.events.publish(ChatEvent::SidebarUpdated {
                    id: envelope.id.clone(),
                    content: envelope.trimmed_thinking(),
                    user_mood: envelope.user_mood.clone(),
                    debug: envelope.debug.clone(),
                    matched_categories: envelope.matched_categories.clone(),
                });
                if let Some(redirect) = envelope.agent_redirect() {
                    self.events
                        .publish(ChatEvent::AgentRedirectRequested(redirect.clone()));
                }
                Ok(envelope)
            }
            Err(err) => {
                error!(placeholder = %pending.placeholder_id, %err, "chat submit failed");
                let failure = ResponseEnvelope::failure(err.to_string());
                self.replace_placeholder(&pending.placeholder_id, &failure);
                Err(SessionError::Backend(err))
            }
        }
    }

    fn replace_placeholder(&mut self, placeholder_id: &str, envelope: &ResponseEnvelope) {
        let content = MessageContent::Text(envelope.to_json());
        match self
            .transcript
            .iter_mut()
            .find(|message| message.id == placeholder_id)
        {
            Some(message) => message.content = content.clone(),
            None => debug!(placeholder = %placeholder_id, "placeholder no longer in transcript"),
        }
        if let Some(tx) = self.watchers.remove(placeholder_id) {
            tx.send_replace(content);
        }
    }

    /// Send a begun turn while watching its placeholder. Returns once the
    /// placeholder is replaced or `timeout` passes, whichever comes first.
    /// On timeout the request is not aborted: it finishes in the background
    /// and is committed by the next [`ChatSession::commit_late_turns`].
    pub async fn await_turn(&mut self, pending: PendingTurn, timeout: Duration) -> TurnReport {
        let placeholder_id = pending.placeholder_id.clone();
        let updates = self.subscribe(&placeholder_id);
        let decoder = EnvelopeDecoder::new(Instant::now(), timeout);
        let cancel = CancellationToken::new();
        let watch = EnvelopeWatch::new(decoder, updates, cancel.clone()).run();
        tokio::pin!(watch);

        let backend = self.backend.clone();
        let mut send = tokio::spawn(async move { pending.send(&backend).await });

        tokio::select! {
            biased;
            joined = &mut send => {
                let error = match joined {
                    Ok(completed) => self.finish_turn(completed).err(),
                    Err(err) => {
                        error!(placeholder = %placeholder_id, %err, "chat submit task failed");
                        self.replace_placeholder(&placeholder_id, &ResponseEnvelope::failure(err.to_string()));
                        None
                    }
                };
                let outcome = watch.await;
                cancel.cancel();
                let state = match outcome {
                    WatchOutcome::Settled(state) => state,
                    WatchOutcome::Cancelled => DecodeState::Errored,
                };
                TurnReport {
                    placeholder_id,
                    state,
                    error,
                    timed_out: false,
                }
            }
            _ = &mut watch => {
                warn!(placeholder = %placeholder_id, "no answer before the timeout");
                let late_tx = self.late_tx.clone();
                tokio::spawn(async move {
                    if let Ok(completed) = send.await {
                        let _ = late_tx.send(completed);
                    }
                });
                TurnReport {
                    placeholder_id,
                    state: DecodeState::Errored,
                    error: None,
                    timed_out: true,
                }
            }
        }
    }

    /// Commit answers that arrived after their turn timed out, oldest first.
    pub fn commit_late_turns(&mut self) -> Vec<LateTurn> {
        let mut late = Vec::new();
        while let Ok(completed) = self.late_rx.try_recv() {
            let placeholder_id = completed.pending.placeholder_id.clone();
            debug!(placeholder = %placeholder_id, "committing late answer");
            let result = self.finish_turn(completed);
            late.push(LateTurn {
                placeholder_id,
                result,
            });
        }
        late
    }

    /// Submit and wait for the answer in one step.
    pub async fn submit(&mut self, text: &str) -> Result<ResponseEnvelope, SessionError> {
        let pending = self.begin_turn(text)?;
        let backend = self.backend.clone();
        let completed = pending.send(&backend).await;
        self.finish_turn(completed)
    }

    /// The suggestions of the most recent settled assistant turn.
    pub fn last_suggestions(&self) -> Vec<String> {
        self.last_envelope()
            .map(|envelope| envelope.suggestions().to_vec())
            .unwrap_or_default()
    }

    /// The most recent assistant turn that decodes as an envelope.
    pub fn last_envelope(&self) -> Option<ResponseEnvelope> {
        self.transcript
            .iter()
            .rev()
            .filter(|message| message.is_assistant())
            .find_map(|message| match &message.content {
                MessageContent::Text(raw) => ResponseEnvelope::parse(raw).ok(),
                MessageContent::Blocks(_) => None,
            })
    }

    /// The 1-based `index`th suggested question of the last answer.
    pub fn suggested_question(&self, index: usize) -> Result<String, SessionError> {
        index
            .checked_sub(1)
            .and_then(|i| self.last_suggestions().get(i).cloned())
            .ok_or(SessionError::NoSuggestion { index })
    }

    /// Resubmit a suggested question of the last answer.
    pub async fn ask_suggested(&mut self, index: usize) -> Result<ResponseEnvelope, SessionError> {
        let question = self.suggested_question(index)?;
        self.submit(&question).await
    }

    /// Broadcast a human-agent request for the last answer's redirect, if any.
    pub fn request_human_agent(&self) -> bool {
        let Some(envelope) = self.last_envelope() else {
            return false;
        };
        let Some(redirect) = envelope.agent_redirect() else {
            return false;
        };
        self.events
            .publish(ChatEvent::human_agent_requested(redirect));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ContentBlock;
    use crate::core::decoder::DEFAULT_ENVELOPE_TIMEOUT;
    use crate::utils::test_utils::{read_http_request, serve_once, StubResponse};
    use serde_json::json;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    fn session(base_url: String) -> ChatSession {
        ChatSession::new(
            BackendClient::new(reqwest::Client::new(), base_url),
            EventBus::new(),
            "claude-sonnet-4-20250514",
            "",
        )
    }

    fn offline_session() -> ChatSession {
        session("http://127.0.0.1:9".to_string())
    }

    #[tokio::test]
    async fn hello_round_trip_replaces_placeholder() {
        let (base_url, server) = serve_once(StubResponse::json(
            r#"{"response":"Hi there!","thinking":"  greeting  ","user_mood":"happy","debug":{"context_used":false}}"#,
        ))
        .await;
        let mut session = session(base_url);
        let mut events = session.events().subscribe();

        let envelope = session.submit("Hello").await.unwrap();
        assert_eq!(envelope.response, "Hi there!");

        let transcript = session.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, MessageContent::Text("Hello".into()));
        let mut decoder = EnvelopeDecoder::new(Instant::now(), DEFAULT_ENVELOPE_TIMEOUT);
        match decoder.observe(&transcript[1].content) {
            DecodeState::Parsed(parsed) => assert_eq!(parsed.response, "Hi there!"),
            other => panic!("expected parsed, got {other:?}"),
        }

        let captured = server.await.unwrap().json();
        let sent = captured["messages"].as_array().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["content"], json!("Hello"));
        assert_eq!(sent[0]["role"], json!("user"));

        match events.recv().await.unwrap() {
            ChatEvent::SidebarUpdated {
                content, user_mood, ..
            } => {
                assert_eq!(content.as_deref(), Some("greeting"));
                assert_eq!(user_mood.as_deref(), Some("happy"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!session.is_in_flight());
    }

    #[tokio::test]
    async fn answer_without_thinking_leaves_sidebar_content_empty() {
        let (base_url, _server) = serve_once(StubResponse::json(
            r#"{"response":"Hi there!","user_mood":"neutral","debug":{"context_used":false}}"#,
        ))
        .await;
        let mut session = session(base_url);
        let mut events = session.events().subscribe();

        let envelope = session.submit("Hello").await.unwrap();
        assert_eq!(envelope.response, "Hi there!");
        assert_eq!(session.transcript()[0].content, MessageContent::Text("Hello".into()));

        match events.recv().await.unwrap() {
            ChatEvent::SidebarUpdated {
                content,
                user_mood,
                debug,
                ..
            } => {
                assert_eq!(content, None);
                assert_eq!(user_mood.as_deref(), Some("neutral"));
                assert!(debug.is_some());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn suggested_questions_header_lands_in_transcript() {
        let (base_url, _server) = serve_once(
            StubResponse::json(r#"{"response":"Sure."}"#)
                .with_header("x-suggested-questions", r#"["A?","B?"]"#),
        )
        .await;
        let mut session = session(base_url);

        session.submit("Help").await.unwrap();
        assert_eq!(session.last_suggestions(), vec!["A?".to_string(), "B?".to_string()]);
    }

    #[tokio::test]
    async fn rag_sources_are_published_with_the_query() {
        let (base_url, _server) = serve_once(
            StubResponse::json(r#"{"response":"From the docs."}"#)
                .with_header("x-rag-sources", r#"[{"title":"Returns policy"}]"#),
        )
        .await;
        let mut session = session(base_url);
        let mut events = session.events().subscribe();

        session.submit("Can I return it?").await.unwrap();

        match events.recv().await.unwrap() {
            ChatEvent::RagSourcesUpdated { sources, query, .. } => {
                assert_eq!(sources, json!([{"title": "Returns policy"}]));
                assert_eq!(query, MessageContent::Text("Can I return it?".into()));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn redirect_publishes_and_enables_human_request() {
        let (base_url, _server) = serve_once(StubResponse::json(
            r#"{"response":"Let me get someone.","redirect_to_agent":{"should_redirect":true,"reason":"billing dispute"}}"#,
        ))
        .await;
        let mut session = session(base_url);
        let mut events = session.events().subscribe();

        session.submit("I was double charged").await.unwrap();
        assert!(matches!(events.recv().await.unwrap(), ChatEvent::SidebarUpdated { .. }));
        match events.recv().await.unwrap() {
            ChatEvent::AgentRedirectRequested(redirect) => {
                assert_eq!(redirect.reason, "billing dispute")
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert!(session.request_human_agent());
        match events.recv().await.unwrap() {
            ChatEvent::HumanAgentRequested { reason, mood, .. } => {
                assert_eq!(reason, "billing dispute");
                assert_eq!(mood, "frustrated");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn backend_failure_writes_a_failure_envelope() {
        let (base_url, _server) =
            serve_once(StubResponse::json("{}").with_status("500 Internal Server Error")).await;
        let mut session = session(base_url);

        let err = session.submit("Hello").await.unwrap_err();
        assert!(matches!(err, SessionError::Backend(BackendError::Status { status: 500, .. })));

        let mut decoder = EnvelopeDecoder::new(Instant::now(), DEFAULT_ENVELOPE_TIMEOUT);
        assert_eq!(decoder.observe(&session.transcript()[1].content), &DecodeState::Errored);
        assert!(!session.is_in_flight());
    }

    #[test]
    fn second_turn_while_in_flight_is_refused() {
        let mut session = offline_session();
        let first = session.begin_turn("one").unwrap();
        assert!(matches!(session.begin_turn("two"), Err(SessionError::Busy)));
        assert_eq!(session.transcript().len(), 2);

        drop(first);
        assert!(session.begin_turn("two").is_ok());
    }

    #[test]
    fn empty_prompt_without_image_is_refused() {
        let mut session = offline_session();
        assert!(matches!(session.begin_turn("   "), Err(SessionError::EmptyPrompt)));
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn image_turn_is_text_then_image_and_consumes_attachment() {
        let mut session = offline_session();
        session.attach_image(ImageSource::base64("image/jpeg", "AAAA"));

        let pending = session.begin_turn("").unwrap();
        let MessageContent::Blocks(blocks) = &pending.request().messages[0].content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks[0], ContentBlock::text(""));
        assert!(matches!(blocks[1], ContentBlock::Image { .. }));
        assert!(session.pending_image().is_none());
    }

    #[test]
    fn request_excludes_the_placeholder() {
        let mut session = offline_session();
        let pending = session.begin_turn("Hello").unwrap();
        assert_eq!(pending.request().messages.len(), 1);
        assert!(session
            .transcript()
            .iter()
            .any(|message| message.id == pending.placeholder_id()));
    }

    #[tokio::test]
    async fn placeholder_is_replaced_by_id_and_watchers_notified() {
        let (base_url, _server) = serve_once(StubResponse::json(r#"{"response":"Done"}"#)).await;
        let mut session = session(base_url);
        let pending = session.begin_turn("Go").unwrap();
        let placeholder_id = pending.placeholder_id().to_string();
        let mut updates = session.subscribe(&placeholder_id);

        let mut decoder = EnvelopeDecoder::new(Instant::now(), DEFAULT_ENVELOPE_TIMEOUT);
        assert_eq!(decoder.observe(&updates.borrow_and_update()), &DecodeState::Pending);

        let backend = session.backend().clone();
        let completed = pending.send(&backend).await;
        session.finish_turn(completed).unwrap();

        updates.changed().await.unwrap();
        assert!(matches!(
            decoder.observe(&updates.borrow()),
            DecodeState::Parsed(envelope) if envelope.response == "Done"
        ));
        assert_eq!(session.transcript()[1].id, placeholder_id);
    }

    #[tokio::test]
    async fn ask_suggested_rejects_out_of_range_indexes() {
        let mut session = offline_session();
        assert!(matches!(
            session.ask_suggested(1).await,
            Err(SessionError::NoSuggestion { index: 1 })
        ));
        assert!(matches!(
            session.ask_suggested(0).await,
            Err(SessionError::NoSuggestion { index: 0 })
        ));
    }

    #[test]
    fn human_request_without_redirect_is_a_no_op() {
        let session = offline_session();
        assert!(!session.request_human_agent());
    }

    #[tokio::test]
    async fn await_turn_settles_with_the_answer() {
        let (base_url, _server) = serve_once(
            StubResponse::json(r#"{"response":"Hi there!"}"#)
                .with_header("x-suggested-questions", r#"["A?","B?"]"#),
        )
        .await;
        let mut session = session(base_url);

        let pending = session.begin_turn("Hello").unwrap();
        let report = session.await_turn(pending, DEFAULT_ENVELOPE_TIMEOUT).await;
        assert!(!report.timed_out);
        assert!(report.error.is_none());
        match report.state {
            DecodeState::Parsed(envelope) => {
                assert_eq!(envelope.response, "Hi there!");
                assert_eq!(envelope.suggestions(), ["A?".to_string(), "B?".to_string()]);
            }
            other => panic!("expected parsed, got {other:?}"),
        }
        assert_eq!(session.suggested_question(2).unwrap(), "B?");
    }

    #[tokio::test]
    async fn await_turn_reports_backend_failures() {
        let (base_url, _server) =
            serve_once(StubResponse::json(r#"{"error":"down"}"#).with_status("503 Service Unavailable"))
                .await;
        let mut session = session(base_url);

        let pending = session.begin_turn("Hello").unwrap();
        let report = session.await_turn(pending, DEFAULT_ENVELOPE_TIMEOUT).await;
        assert_eq!(report.state, DecodeState::Errored);
        assert!(!report.timed_out);
        assert!(matches!(
            report.error,
            Some(SessionError::Backend(BackendError::Status { status: 503, .. }))
        ));
    }

    /// Accepts one chat request and answers "Late" only once `release` fires.
    async fn stalled_backend(release: oneshot::Receiver<()>) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_http_request(&mut stream).await.unwrap();
            if release.await.is_err() {
                return;
            }
            let body = r#"{"response":"Late"}"#;
            let reply = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_at_the_deadline_while_backend_hangs() {
        let (_release, held) = oneshot::channel();
        let mut session = session(stalled_backend(held).await);

        let started = Instant::now();
        let pending = session.begin_turn("Hello").unwrap();
        let report = tokio::time::timeout(
            Duration::from_secs(300),
            session.await_turn(pending, Duration::from_secs(30)),
        )
        .await
        .expect("await_turn should return at the envelope deadline");

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(30), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(60), "{elapsed:?}");
        assert!(report.timed_out);
        assert_eq!(report.state, DecodeState::Errored);
        assert!(report.error.is_none());

        // The request is still running, so the session stays busy.
        assert!(session.is_in_flight());
        assert!(matches!(session.begin_turn("Again"), Err(SessionError::Busy)));
        assert!(session.commit_late_turns().is_empty());
    }

    #[tokio::test]
    async fn late_answer_is_committed_after_the_timeout() {
        let (release, held) = oneshot::channel();
        let mut session = session(stalled_backend(held).await);

        let pending = session.begin_turn("Hello").unwrap();
        let report = session
            .await_turn(pending, Duration::from_millis(100))
            .await;
        assert!(report.timed_out);
        assert_eq!(report.state, DecodeState::Errored);

        release.send(()).unwrap();
        let mut late = Vec::new();
        for _ in 0..500 {
            late = session.commit_late_turns();
            if !late.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].placeholder_id, report.placeholder_id);
        assert_eq!(late[0].result.as_ref().unwrap().response, "Late");

        assert!(!session.is_in_flight());
        assert_eq!(session.last_envelope().unwrap().response, "Late");
        let mut decoder = EnvelopeDecoder::new(Instant::now(), DEFAULT_ENVELOPE_TIMEOUT);
        let placeholder = session.message(&report.placeholder_id).unwrap();
        assert!(matches!(decoder.observe(&placeholder.content), DecodeState::Parsed(_)));
        assert!(session.begin_turn("Thanks").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn very_large_timeouts_do_not_overflow() {
        let (base_url, _server) = serve_once(StubResponse::json(r#"{"response":"Hi"}"#)).await;
        let mut session = session(base_url);

        let pending = session.begin_turn("Hello").unwrap();
        let report = session
            .await_turn(pending, Duration::from_secs(u64::MAX))
            .await;
        assert!(!report.timed_out);
        assert!(matches!(report.state, DecodeState::Parsed(_)));
    }
}
