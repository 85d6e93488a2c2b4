// Sloganforge Engine — Conversation state
//
// Single owner of truth for what is rendered: the ordered message log, the
// separately-held system prompt, the in-progress assistant text, and the
// in-flight flag. UI layers subscribe to change events instead of owning
// state themselves.
//
// Invariants defended here:
//   • `pending` is non-empty only while a request is in flight or in the
//     instant before it is archived into the log.
//   • The system prompt never appears in the log; it is prepended to the
//     outgoing request only.

use log::info;

use crate::atoms::types::{Message, Role};

// ── Change notification ────────────────────────────────────────────────

/// Emitted after every externally visible state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A message was appended to the log.
    MessageAppended(Message),
    /// A fragment was appended to the pending assistant text.
    PendingAppended { fragment: String },
    /// The pending assistant text was archived into the log.
    PendingArchived,
    /// The trailing assistant message was removed (retry).
    LastAssistantDropped,
    /// Everything was cleared.
    Cleared,
}

type Listener = Box<dyn Fn(&ConversationEvent) + Send>;

// ── State container ────────────────────────────────────────────────────

#[derive(Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    system_prompt: Option<String>,
    pending: String,
    in_flight: bool,
    listeners: Vec<Listener>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn set_system_prompt(&mut self, prompt: Option<String>) {
        self.system_prompt = prompt.filter(|p| !p.trim().is_empty());
    }

    /// The message log as sent on the wire: system prompt prepended if set.
    pub fn request_messages(&self) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if let Some(sp) = &self.system_prompt {
            out.push(Message::system(sp.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }

    /// Subscribe to state changes. Listeners are dropped with the state.
    pub fn subscribe(&mut self, listener: impl Fn(&ConversationEvent) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn notify(&self, event: ConversationEvent) {
        for listener in &self.listeners {
            listener(&event);
        }
    }

    // ── Operations ─────────────────────────────────────────────────────

    /// Append a user message. Empty or whitespace-only input is silently
    /// ignored; returns whether a message was appended.
    pub fn append_user(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let message = Message::user(text);
        self.messages.push(message.clone());
        self.notify(ConversationEvent::MessageAppended(message));
        true
    }

    /// Start a new assistant response: clears `pending`, raises `in_flight`.
    pub fn begin_assistant_response(&mut self) {
        self.pending.clear();
        self.in_flight = true;
    }

    /// Concatenate a streamed fragment onto the pending assistant text.
    /// No-op for empty fragments.
    pub fn append_pending_fragment(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.pending.push_str(fragment);
        self.notify(ConversationEvent::PendingAppended { fragment: fragment.to_string() });
    }

    /// Archive the pending text as a completed assistant message. With an
    /// empty pending buffer (request aborted before any fragment arrived)
    /// only the flags are cleared.
    pub fn finalize_assistant_response(&mut self) {
        self.in_flight = false;
        if self.pending.is_empty() {
            return;
        }
        let message = Message::assistant(std::mem::take(&mut self.pending));
        info!("[engine] archived assistant message ({} chars)", message.content.len());
        self.messages.push(message.clone());
        self.notify(ConversationEvent::PendingArchived);
        self.notify(ConversationEvent::MessageAppended(message));
    }

    /// Discard the pending text without archiving (transport failure).
    pub fn discard_pending(&mut self) {
        self.pending.clear();
        self.in_flight = false;
    }

    /// Remove the trailing assistant message ahead of a retry. No-op when
    /// the log does not end with one.
    pub fn drop_last_assistant_message(&mut self) {
        if matches!(self.messages.last(), Some(m) if m.role == Role::Assistant) {
            self.messages.pop();
            self.notify(ConversationEvent::LastAssistantDropped);
        }
    }

    /// Clear the log, pending text, system prompt, and flags.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.system_prompt = None;
        self.pending.clear();
        self.in_flight = false;
        self.notify(ConversationEvent::Cleared);
    }
}
