// Sloganforge — streaming chat engine for promotional-copy generation.
//
// The pipeline: user input → ConversationState (append user message) →
// RequestController (build signed request, send, stream) → StreamDecoder
// (bytes → text fragments) → ConversationState (pending assistant text) →
// render (markdown → HTML) → UI.

pub mod atoms;
pub mod engine;

pub use atoms::error::{EngineError, EngineResult};
pub use atoms::types::{GeneratePayload, Message, Role};
pub use engine::config::{ChatConfig, StreamMode};
pub use engine::conversation::{ConversationEvent, ConversationState};
pub use engine::render::{render_markdown, render_message};
pub use engine::request::{CancelHandle, Outcome, Phase, RequestController};
pub use engine::signing::{Sha256Signer, Signer};
pub use engine::stream::StreamDecoder;
pub use engine::transport::{HttpTransport, StreamingResponse, Transport};
