// ── Sloganforge Atoms: Error Types ─────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, Network, Api, Decode…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • Cancellation is a distinguished `Aborted` variant, never a generic
//     transport error, so the controller can archive partial output instead
//     of discarding it.
//   • No variant carries secret material (signing secrets) in its message.

use thiserror::Error;

// ── Primary error enum ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The generation endpoint answered with a non-success status.
    /// The response body is not parsed in this case.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Malformed structured payload in an event-framed stream.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The request was cancelled by the caller. Not a failure: fragments
    /// already applied remain valid and are archived.
    #[error("Request aborted")]
    Aborted,

    /// Engine configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),
}

// ── Classification helpers ─────────────────────────────────────────────────

impl EngineError {
    /// Create an API error from a status code.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api { status, message: message.into() }
    }
}

// ── Convenience alias ──────────────────────────────────────────────────────

/// All engine operations should return this type.
pub type EngineResult<T> = Result<T, EngineError>;
