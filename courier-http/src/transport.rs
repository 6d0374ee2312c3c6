//! The network seam.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::request::{Body, TransportRequest};
use crate::{HttpError, PipelineConfig, Response, Result, TransportError};

/// Performs the network call for a fully prepared request.
///
/// Any HTTP status is a successful call here; the pipeline decides which
/// statuses are failures. Implementations should stop work once `cancel`
/// fires, though the pipeline ignores late results either way.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`.
    async fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<Response, TransportError>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport from the pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;

        Ok(Self { inner })
    }

    /// Wrap an existing client.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    async fn execute(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<Response, TransportError> {
        let mut builder = self
            .inner
            .request(request.method, request.url)
            .headers(request.headers);

        builder = match request.body {
            Body::Empty => builder,
            Body::Bytes(bytes) => builder.body(bytes),
            Body::Multipart(multipart) => builder.multipart(multipart.into_reqwest()),
        };

        let response = builder.send().await?;
        Ok(Response::from_reqwest(response).await?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: TransportRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<Response, TransportError> {
        debug!(method = %request.method, url = %request.url, "Sending HTTP request");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::cancelled()),
            result = self.execute(request) => {
                if let Ok(response) = &result {
                    debug!(status = %response.status(), url = %response.url(), "Received HTTP response");
                }
                result
            }
        }
    }
}
