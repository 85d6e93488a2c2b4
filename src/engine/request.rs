// Sloganforge Engine — Request controller
//
// Orchestrates one request/response cycle: builds the signed payload, issues
// the call, pumps the stream decoder into the conversation, and resolves to
// archived, aborted, or failed. Explicit state machine:
//
//   Idle → Sending → Streaming → (Archived | Aborted | Failed) → Idle
//
// Concurrency discipline: one outstanding request per controller. The UI is
// expected to disable submit/retry while a request runs, but the controller
// defends the invariant itself and rejects such calls as no-ops.
//
// Outcome rules (intentional asymmetry):
//   • user cancel    → partial text is archived as a completed message
//   • failure        → accumulated partial text is discarded

use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::{GeneratePayload, Role};
use crate::engine::config::ChatConfig;
use crate::engine::conversation::ConversationState;
use crate::engine::prompt;
use crate::engine::signing::Signer;
use crate::engine::stream::StreamDecoder;
use crate::engine::transport::Transport;

// ── States and outcomes ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
}

/// How a submit/retry call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Stream completed; the reply was archived into the log.
    Archived,
    /// User cancelled; any partial reply was archived.
    Aborted,
    /// The call was a no-op (empty input, request already in flight,
    /// system-role editor open, or retry without a trailing reply).
    Rejected,
}

// ── Cancellation handle ────────────────────────────────────────────────

/// Cloneable handle that cancels the request it was taken out for.
/// Obtain a fresh one before each submit/retry; handles from finished
/// requests are inert.
#[derive(Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    /// Trigger cancellation. Takes effect at the next chunk boundary; the
    /// partial text streamed so far is preserved as a completed message.
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

// ── Controller ─────────────────────────────────────────────────────────

pub struct RequestController {
    config: ChatConfig,
    transport: Box<dyn Transport>,
    signer: Box<dyn Signer>,
    conversation: ConversationState,
    phase: Phase,
    /// Externally owned gate: true while the system-role editor is open.
    system_role_editing: bool,
    /// Token for the next (or current) request; replaced after each cycle.
    cancel: CancellationToken,
}

impl RequestController {
    pub fn new(config: ChatConfig, transport: Box<dyn Transport>, signer: Box<dyn Signer>) -> Self {
        RequestController {
            config,
            transport,
            signer,
            conversation: ConversationState::new(),
            phase: Phase::Idle,
            system_role_editing: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut ConversationState {
        &mut self.conversation
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_system_role_editing(&mut self, editing: bool) {
        self.system_role_editing = editing;
    }

    /// Handle for cancelling the next submit/retry call.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    // ── Operations ─────────────────────────────────────────────────────

    /// Append the user's input and run one request cycle.
    ///
    /// On the very first exchange the raw input is rewritten into the
    /// promotional-brief template before being appended (see
    /// `engine::prompt`).
    pub async fn submit(&mut self, input: &str) -> EngineResult<Outcome> {
        if let Some(rejection) = self.gate("submit") {
            return Ok(rejection);
        }
        if input.trim().is_empty() {
            return Ok(Outcome::Rejected);
        }
        let text = if self.conversation.messages().is_empty() {
            prompt::wrap_first_prompt(input)
        } else {
            input.to_string()
        };
        self.conversation.append_user(&text);
        self.run_cycle().await
    }

    /// Drop the trailing assistant reply and resubmit the existing trailing
    /// user message. Rejected unless the log ends with an assistant message.
    pub async fn retry(&mut self) -> EngineResult<Outcome> {
        if let Some(rejection) = self.gate("retry") {
            return Ok(rejection);
        }
        if !matches!(self.conversation.messages().last(), Some(m) if m.role == Role::Assistant) {
            warn!("[engine] retry rejected: log does not end with an assistant message");
            return Ok(Outcome::Rejected);
        }
        self.conversation.drop_last_assistant_message();
        self.run_cycle().await
    }

    /// Shared submit/retry preconditions. Returns the rejection, if any.
    fn gate(&self, op: &str) -> Option<Outcome> {
        if self.system_role_editing {
            warn!("[engine] {op} rejected: system-role editor is open");
            return Some(Outcome::Rejected);
        }
        if self.phase != Phase::Idle || self.conversation.in_flight() {
            warn!("[engine] {op} rejected: request already in flight");
            return Some(Outcome::Rejected);
        }
        None
    }

    // ── Request cycle ──────────────────────────────────────────────────

    async fn run_cycle(&mut self) -> EngineResult<Outcome> {
        self.phase = Phase::Sending;
        self.conversation.begin_assistant_response();
        let cancel = self.cancel.clone();

        let result = self.run_request(&cancel).await;

        // Hand out a fresh token next time; the old one stays owned by any
        // handles already given to callers and is inert from here on.
        self.cancel = CancellationToken::new();
        self.phase = Phase::Idle;

        match result {
            Ok(()) => {
                self.conversation.finalize_assistant_response();
                info!("[engine] request archived");
                Ok(Outcome::Archived)
            }
            Err(EngineError::Aborted) => {
                // User-initiated: keep what was streamed.
                self.conversation.finalize_assistant_response();
                info!("[engine] request aborted by user, partial reply kept");
                Ok(Outcome::Aborted)
            }
            Err(e) => {
                // Failure: the data is suspect, discard the partial text.
                self.conversation.discard_pending();
                error!("[engine] request failed: {e}");
                Err(e)
            }
        }
    }

    async fn run_request(&mut self, cancel: &CancellationToken) -> EngineResult<()> {
        let messages = self.conversation.request_messages();
        let time = chrono::Utc::now().timestamp_millis();
        let last_content = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let sign = self.signer.sign(time, last_content);
        let payload = GeneratePayload { messages, time, sign };

        let response = self
            .transport
            .send(&self.config.endpoint, &payload, cancel)
            .await?;
        if !(200..300).contains(&response.status) {
            // Body is not parsed on failure statuses.
            return Err(EngineError::api(response.status, "generation request failed"));
        }

        self.phase = Phase::Streaming;
        let mut decoder = StreamDecoder::new(self.config.mode);
        let mut body = response.body;

        use futures::StreamExt;
        loop {
            // Cancellation takes effect at the next chunk boundary.
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Aborted),
                chunk = body.next() => chunk,
            };
            match next {
                Some(chunk) => {
                    for fragment in decoder.feed(&chunk?)? {
                        self.conversation.append_pending_fragment(&fragment);
                    }
                    if decoder.is_done() {
                        break;
                    }
                }
                None => {
                    for fragment in decoder.finish()? {
                        self.conversation.append_pending_fragment(&fragment);
                    }
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::StreamMode;
    use crate::engine::signing::Sha256Signer;
    use crate::engine::transport::{ByteStream, StreamingResponse, Transport};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted response: a status plus the body chunks to replay.
    struct Scripted {
        status: u16,
        chunks: Vec<Vec<u8>>,
        /// Keep the body open (never complete) after the chunks.
        hang: bool,
    }

    struct StubTransport {
        responses: Mutex<VecDeque<Scripted>>,
    }

    impl StubTransport {
        fn new(responses: Vec<Scripted>) -> Box<Self> {
            Box::new(StubTransport { responses: Mutex::new(responses.into_iter().collect()) })
        }

        fn ok(chunks: &[&[u8]]) -> Box<Self> {
            Self::new(vec![Scripted {
                status: 200,
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                hang: false,
            }])
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(
            &self,
            _endpoint: &str,
            _payload: &GeneratePayload,
            _cancel: &CancellationToken,
        ) -> EngineResult<StreamingResponse> {
            let scripted = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra request");
            let chunks = futures::stream::iter(scripted.chunks.into_iter().map(Ok));
            let body: ByteStream = if scripted.hang {
                chunks.chain(futures::stream::pending()).boxed()
            } else {
                chunks.boxed()
            };
            Ok(StreamingResponse { status: scripted.status, body })
        }
    }

    fn controller(transport: Box<dyn Transport>, mode: StreamMode) -> RequestController {
        let config = ChatConfig::new("http://localhost/api/generate", mode)
            .with_signing_secret("test-secret");
        RequestController::new(config, transport, Box::new(Sha256Signer::new("test-secret")))
    }

    #[tokio::test]
    async fn submit_streams_and_archives() {
        let mut ctl = controller(
            StubTransport::ok(&[b"Crispy ", b"and ", b"bold"]),
            StreamMode::RawChunks,
        );
        // Seed the log so the first-exchange template does not kick in.
        ctl.conversation_mut().append_user("warmup");
        ctl.conversation_mut().begin_assistant_response();
        ctl.conversation_mut().append_pending_fragment("seed");
        ctl.conversation_mut().finalize_assistant_response();

        let outcome = ctl.submit("KFC").await.unwrap();
        assert_eq!(outcome, Outcome::Archived);
        let log = ctl.conversation().messages();
        assert_eq!(log.last().unwrap().content, "Crispy and bold");
        assert_eq!(log.last().unwrap().role, Role::Assistant);
        assert!(!ctl.conversation().in_flight());
        assert_eq!(ctl.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn first_submit_applies_template() {
        let mut ctl = controller(StubTransport::ok(&[b"slogans"]), StreamMode::RawChunks);
        ctl.submit("炸鸡").await.unwrap();

        let log = ctl.conversation().messages();
        assert_eq!(log.len(), 2);
        assert!(log[0].content.contains("炸鸡"));
        assert!(log[0].content.starts_with(prompt::TEMPLATE_PREFIX));
        assert_eq!(prompt::strip_template(&log[0].content), "炸鸡");
    }

    #[tokio::test]
    async fn second_submit_is_not_templated() {
        let mut ctl = controller(
            StubTransport::new(vec![
                Scripted { status: 200, chunks: vec![b"one".to_vec()], hang: false },
                Scripted { status: 200, chunks: vec![b"two".to_vec()], hang: false },
            ]),
            StreamMode::RawChunks,
        );
        ctl.submit("KFC").await.unwrap();
        ctl.submit("shorter please").await.unwrap();
        let log = ctl.conversation().messages();
        assert_eq!(log[2].content, "shorter please");
    }

    #[tokio::test]
    async fn empty_input_is_silently_ignored() {
        let mut ctl = controller(StubTransport::new(vec![]), StreamMode::RawChunks);
        assert_eq!(ctl.submit("   ").await.unwrap(), Outcome::Rejected);
        assert!(ctl.conversation().messages().is_empty());
        assert!(!ctl.conversation().in_flight());
    }

    #[tokio::test]
    async fn submit_gated_while_editing_system_role() {
        let mut ctl = controller(StubTransport::new(vec![]), StreamMode::RawChunks);
        ctl.set_system_role_editing(true);
        assert_eq!(ctl.submit("KFC").await.unwrap(), Outcome::Rejected);
        assert!(ctl.conversation().messages().is_empty());
    }

    #[tokio::test]
    async fn submit_rejected_while_in_flight() {
        let mut ctl = controller(StubTransport::new(vec![]), StreamMode::RawChunks);
        ctl.conversation_mut().begin_assistant_response();
        assert_eq!(ctl.submit("KFC").await.unwrap(), Outcome::Rejected);
    }

    #[tokio::test]
    async fn non_success_status_fails_without_archiving() {
        let mut ctl = controller(
            StubTransport::new(vec![Scripted { status: 503, chunks: vec![], hang: false }]),
            StreamMode::RawChunks,
        );
        let err = ctl.submit("KFC").await.unwrap_err();
        assert!(matches!(err, EngineError::Api { status: 503, .. }));
        // User message stays, nothing archived, controller usable again.
        assert_eq!(ctl.conversation().messages().len(), 1);
        assert_eq!(ctl.conversation().pending(), "");
        assert!(!ctl.conversation().in_flight());
        assert_eq!(ctl.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn decode_failure_discards_partial_text() {
        let mut ctl = controller(
            StubTransport::ok(&[
                b"data: {\"choices\":[{\"delta\":{\"content\":\"half a reply\"}}]}\n\n",
                b"data: {broken\n\n",
            ]),
            StreamMode::EventFramed,
        );
        let err = ctl.submit("KFC").await.unwrap_err();
        assert!(matches!(err, EngineError::Decode(_)));
        // Failure discards what was streamed; only the user message remains.
        assert_eq!(ctl.conversation().messages().len(), 1);
        assert_eq!(ctl.conversation().pending(), "");
    }

    #[tokio::test]
    async fn cancel_preserves_partial_reply() {
        let mut ctl = controller(
            StubTransport::new(vec![Scripted {
                status: 200,
                chunks: vec![b"Buy now".to_vec()],
                hang: true,
            }]),
            StreamMode::RawChunks,
        );
        let handle = ctl.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            handle.cancel();
        });

        let outcome = ctl.submit("KFC").await.unwrap();
        assert_eq!(outcome, Outcome::Aborted);
        let log = ctl.conversation().messages();
        assert_eq!(log.last().unwrap().content, "Buy now");
        assert_eq!(log.last().unwrap().role, Role::Assistant);
        assert!(!ctl.conversation().in_flight());
    }

    #[tokio::test]
    async fn cancel_before_any_fragment_archives_nothing() {
        let mut ctl = controller(
            StubTransport::new(vec![Scripted { status: 200, chunks: vec![], hang: true }]),
            StreamMode::RawChunks,
        );
        let handle = ctl.cancel_handle();
        handle.cancel();
        let outcome = ctl.submit("KFC").await.unwrap();
        assert_eq!(outcome, Outcome::Aborted);
        // Only the user message: empty pending is never archived.
        assert_eq!(ctl.conversation().messages().len(), 1);
    }

    #[tokio::test]
    async fn retry_replaces_trailing_assistant_message() {
        let mut ctl = controller(StubTransport::ok(&[b"<new reply>"]), StreamMode::RawChunks);
        ctl.conversation_mut().append_user("KFC");
        ctl.conversation_mut().begin_assistant_response();
        ctl.conversation_mut().append_pending_fragment("old reply");
        ctl.conversation_mut().finalize_assistant_response();

        let outcome = ctl.retry().await.unwrap();
        assert_eq!(outcome, Outcome::Archived);
        let log = ctl.conversation().messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].content, "KFC");
        assert_eq!(log[1].content, "<new reply>");
    }

    #[tokio::test]
    async fn cancel_during_retry_preserves_partial_reply() {
        let mut ctl = controller(
            StubTransport::new(vec![Scripted {
                status: 200,
                chunks: vec![b"Fresh take".to_vec()],
                hang: true,
            }]),
            StreamMode::RawChunks,
        );
        ctl.conversation_mut().append_user("KFC");
        ctl.conversation_mut().begin_assistant_response();
        ctl.conversation_mut().append_pending_fragment("old reply");
        ctl.conversation_mut().finalize_assistant_response();

        let handle = ctl.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            handle.cancel();
        });

        let outcome = ctl.retry().await.unwrap();
        assert_eq!(outcome, Outcome::Aborted);
        let log = ctl.conversation().messages();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].role, Role::Assistant);
        // The dropped reply is replaced by whatever streamed before the cancel.
        assert_eq!(log[1].content, "Fresh take");
        assert!(!ctl.conversation().in_flight());
    }

    #[tokio::test]
    async fn retry_rejected_without_trailing_assistant() {
        let mut ctl = controller(StubTransport::new(vec![]), StreamMode::RawChunks);
        assert_eq!(ctl.retry().await.unwrap(), Outcome::Rejected);
        ctl.conversation_mut().append_user("KFC");
        assert_eq!(ctl.retry().await.unwrap(), Outcome::Rejected);
    }

    #[tokio::test]
    async fn cancelled_handle_does_not_poison_next_request() {
        let mut ctl = controller(
            StubTransport::new(vec![
                Scripted { status: 200, chunks: vec![], hang: true },
                Scripted { status: 200, chunks: vec![b"fresh".to_vec()], hang: false },
            ]),
            StreamMode::RawChunks,
        );
        let stale = ctl.cancel_handle();
        stale.cancel();
        assert_eq!(ctl.submit("KFC").await.unwrap(), Outcome::Aborted);

        // The stale handle belongs to the finished request only.
        stale.cancel();
        assert_eq!(ctl.submit("more").await.unwrap(), Outcome::Archived);
        assert_eq!(ctl.conversation().messages().last().unwrap().content, "fresh");
    }

    #[tokio::test]
    async fn system_prompt_rides_along_on_the_wire() {
        // Capture the payload the transport sees.
        struct Capture(std::sync::Arc<Mutex<Option<GeneratePayload>>>);
        #[async_trait]
        impl Transport for Capture {
            async fn send(
                &self,
                _endpoint: &str,
                payload: &GeneratePayload,
                _cancel: &CancellationToken,
            ) -> EngineResult<StreamingResponse> {
                *self.0.lock().unwrap() = Some(payload.clone());
                Ok(StreamingResponse {
                    status: 200,
                    body: futures::stream::iter([Ok(b"ok".to_vec())]).boxed(),
                })
            }
        }

        let seen = std::sync::Arc::new(Mutex::new(None));
        let mut ctl = controller(Box::new(Capture(seen.clone())), StreamMode::RawChunks);
        ctl.conversation_mut().set_system_prompt(Some("be punchy".into()));
        ctl.submit("KFC").await.unwrap();

        let payload = seen.lock().unwrap().clone().unwrap();
        assert_eq!(payload.messages[0].role, Role::System);
        assert_eq!(payload.messages[0].content, "be punchy");
        // Signature covers (time, last message content).
        let expected = Sha256Signer::new("test-secret")
            .sign(payload.time, &payload.messages.last().unwrap().content);
        assert_eq!(payload.sign, expected);
        // System prompt is wire-only, never in the rendered log.
        assert!(ctl.conversation().messages().iter().all(|m| m.role != Role::System));
    }
}
