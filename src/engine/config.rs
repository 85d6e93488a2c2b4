// Sloganforge Engine — Deployment configuration
// Which endpoint to call and how its response stream is framed.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::atoms::error::{EngineError, EngineResult};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

// ── Stream framing mode ────────────────────────────────────────────────

/// How the response body of the generation endpoint is framed.
///
/// Selected by deployment configuration, not by content negotiation:
/// a proxy backend relays plain text chunks, the direct API speaks the
/// line-oriented `data:` event protocol terminated by `[DONE]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamMode {
    /// Each byte chunk is decoded as UTF-8 and emitted verbatim.
    RawChunks,
    /// Blank-line separated records carrying a `data:` field.
    EventFramed,
}

impl std::str::FromStr for StreamMode {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "raw-chunks" | "raw" => Ok(StreamMode::RawChunks),
            "event-framed" | "sse" => Ok(StreamMode::EventFramed),
            other => Err(EngineError::Config(format!(
                "unsupported stream mode '{other}' (expected 'raw-chunks' or 'event-framed')"
            ))),
        }
    }
}

// ── Engine configuration ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Full URL of the generation endpoint.
    pub endpoint: String,
    /// Response body framing, see [`StreamMode`].
    pub mode: StreamMode,
    /// Secret material handed to the signing collaborator.
    pub signing_secret: String,
    /// TCP connect timeout for the HTTP client.
    pub connect_timeout: Duration,
    /// Overall request timeout. `None` leaves the request in flight until
    /// the transport resolves, errors, or is aborted.
    pub request_timeout: Option<Duration>,
}

impl ChatConfig {
    pub fn new(endpoint: impl Into<String>, mode: StreamMode) -> Self {
        ChatConfig {
            endpoint: endpoint.into(),
            mode,
            signing_secret: String::new(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
        }
    }

    pub fn with_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.signing_secret = secret.into();
        self
    }

    /// Validate the parts the engine cannot work without.
    pub fn validate(&self) -> EngineResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(EngineError::Config("endpoint must not be empty".into()));
        }
        Ok(())
    }
}
