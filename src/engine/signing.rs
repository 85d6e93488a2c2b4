// Sloganforge Engine — Request signing
//
// Every outgoing payload carries a signature computed over the request
// timestamp and the content of the last message, so the backend can reject
// tampered or replayed requests. The engine consumes the signer as an
// opaque collaborator behind a trait.

use sha2::{Digest, Sha256};

/// Signing collaborator: deterministic per call, no side effects visible
/// to the engine.
pub trait Signer: Send + Sync {
    /// Produce the signature for `(timestamp, content of last message)`.
    fn sign(&self, timestamp: i64, content: &str) -> String;
}

// ── Default implementation ─────────────────────────────────────────────

/// SHA-256 hex digest of `timestamp:content:secret`.
pub struct Sha256Signer {
    secret: String,
}

impl Sha256Signer {
    pub fn new(secret: impl Into<String>) -> Self {
        Sha256Signer { secret: secret.into() }
    }
}

impl Signer for Sha256Signer {
    fn sign(&self, timestamp: i64, content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(timestamp.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(content.as_bytes());
        hasher.update(b":");
        hasher.update(self.secret.as_bytes());
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}
