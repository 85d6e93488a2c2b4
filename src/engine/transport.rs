// Sloganforge Engine — Transport seam
// Direct HTTP call to the generation endpoint with a streamed response body.
// The trait keeps the controller testable without a network.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::info;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::types::GeneratePayload;
use crate::engine::config::ChatConfig;

/// Byte chunks of a streamed response body.
pub type ByteStream = BoxStream<'static, EngineResult<Vec<u8>>>;

/// A response whose body has not been consumed yet.
pub struct StreamingResponse {
    pub status: u16,
    pub body: ByteStream,
}

/// One request/response cycle against the generation endpoint.
///
/// Cancellation contract: a triggered token must surface as
/// [`EngineError::Aborted`], never as a generic transport error, so the
/// caller can tell "the user stopped this" apart from "the network broke".
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        payload: &GeneratePayload,
        cancel: &CancellationToken,
    ) -> EngineResult<StreamingResponse>;
}

// ── Production implementation ──────────────────────────────────────────

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ChatConfig) -> EngineResult<Self> {
        let mut builder = Client::builder().connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        payload: &GeneratePayload,
        cancel: &CancellationToken,
    ) -> EngineResult<StreamingResponse> {
        info!("[engine] POST {} ({} messages)", endpoint, payload.messages.len());
        let request = self.client.post(endpoint).json(payload).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Aborted),
            result = request => result?,
        };
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|result| result.map(|bytes| bytes.to_vec()).map_err(EngineError::from))
            .boxed();
        Ok(StreamingResponse { status, body })
    }
}
