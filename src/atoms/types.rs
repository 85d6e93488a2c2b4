// Sloganforge — Core chat types
// The data structures that flow through the entire engine.
// They are independent of any specific generation backend.

use serde::{Deserialize, Serialize};

// ── Messages ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One exchanged chat message. Immutable once appended to the conversation
/// log; only the in-progress assistant text (held outside the log) grows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message { role: Role::Assistant, content: content.into() }
    }
}

// ── Outgoing wire payload ──────────────────────────────────────────────

/// JSON body POSTed to the generation endpoint, one per submit/retry.
///
/// `time` is epoch milliseconds; `sign` is produced by the signing
/// collaborator over `(time, content of the last message)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePayload {
    pub messages: Vec<Message>,
    pub time: i64,
    pub sign: String,
}
