//! The request pipeline.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::FORM_URLENCODED;
use crate::hooks::{Hooks, Preprocessed, Recovery};
use crate::pending::{PendingRequests, RequestFingerprint};
use crate::request::RequestDescriptor;
use crate::response::{Outcome, Payload};
use crate::transport::{ReqwestTransport, Transport};
use crate::upload::UploadFileParams;
use crate::{HttpError, PipelineConfig, Result, TransportError};

/// Sequences hooks, de-duplication and the transport for every call.
///
/// Cloning is cheap; clones share configuration, default headers and the
/// in-flight tracker.
#[derive(Clone)]
pub struct HttpPipeline {
    config: Arc<PipelineConfig>,
    transport: Arc<dyn Transport>,
    hooks: Hooks,
    pending: PendingRequests,
    headers: Arc<RwLock<HeaderMap>>,
}

impl HttpPipeline {
    /// Create a pipeline over `transport`.
    pub fn new(config: PipelineConfig, transport: Arc<dyn Transport>, hooks: Hooks) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }

        Ok(Self {
            config: Arc::new(config),
            transport,
            hooks,
            pending: PendingRequests::new(),
            headers: Arc::new(RwLock::new(headers)),
        })
    }

    /// Create a pipeline over a [`ReqwestTransport`] built from `config`.
    pub fn with_reqwest(config: PipelineConfig, hooks: Hooks) -> Result<Self> {
        let transport = ReqwestTransport::new(&config)?;
        Self::new(config, Arc::new(transport), hooks)
    }

    /// Get the pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the hook set.
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// Get the in-flight request tracker.
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Set a header sent with every request.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.headers.write().insert(name, value);
        Ok(())
    }

    /// Remove a default header.
    pub fn remove_header(&self, name: &str) {
        self.headers.write().remove(name);
    }

    /// Send a GET request.
    pub async fn get(&self, mut request: RequestDescriptor) -> Result<Outcome<Payload>> {
        request.method = Method::GET;
        self.send(request).await
    }

    /// Send a POST request.
    ///
    /// The body is form-url-encoded unless a content type is set.
    pub async fn post(&self, mut request: RequestDescriptor) -> Result<Outcome<Payload>> {
        request.method = Method::POST;
        request.set_default_content_type(FORM_URLENCODED);
        self.send(request).await
    }

    /// Send a PUT request.
    pub async fn put(&self, mut request: RequestDescriptor) -> Result<Outcome<Payload>> {
        request.method = Method::PUT;
        self.send(request).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, mut request: RequestDescriptor) -> Result<Outcome<Payload>> {
        request.method = Method::DELETE;
        self.send(request).await
    }

    /// Upload a file as `multipart/form-data`.
    ///
    /// Always a POST and never de-duplicated.
    pub async fn upload_file(
        &self,
        mut request: RequestDescriptor,
        params: UploadFileParams,
    ) -> Result<Outcome<Payload>> {
        request.method = Method::POST;
        request.multipart = Some(params.into_multipart());
        request.options = request.options.ignore_deduplication(true);
        self.send(request).await
    }

    /// Send a request through the pipeline.
    ///
    /// Resolves to [`Outcome::Aborted`] when the pre-process hook abandons
    /// the call and to [`Outcome::Superseded`] when an identical request
    /// replaced it; neither runs the response hooks.
    pub async fn send(&self, request: RequestDescriptor) -> Result<Outcome<Payload>> {
        let options = self.config.request_options.merge(&request.options);

        let mut request = match &self.hooks.pre_process {
            Some(hook) => match hook(request, options).await? {
                Preprocessed::Proceed(request) => request,
                Preprocessed::Abort => {
                    debug!("Request aborted by pre-process hook");
                    return Ok(Outcome::Aborted);
                }
            },
            None => request,
        };

        if let Some(hook) = &self.hooks.pre_send {
            hook(&mut request, &options)?;
        }

        let fingerprint = RequestFingerprint::of(&request);
        let default_headers = self.headers.read().clone();
        let transport_request =
            request.into_transport(self.config.base_url.as_deref(), &default_headers)?;

        let handle = (!options.ignore_deduplication).then(|| self.pending.register(fingerprint));
        let token = match &handle {
            Some(handle) => handle.token().clone(),
            None => CancellationToken::new(),
        };

        debug!(
            method = %transport_request.method,
            url = %transport_request.url,
            "Dispatching request"
        );

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.transport.send(transport_request, token.clone()) => Some(result),
        };

        if let Some(handle) = &handle {
            self.pending.resolve(handle);
        }

        let result = match result {
            Some(result) if !token.is_cancelled() => result,
            _ => {
                debug!("Request superseded by a newer duplicate");
                return Ok(Outcome::Superseded);
            }
        };

        let result = result.and_then(|response| {
            if response.is_success() {
                Ok(response)
            } else {
                Err(TransportError::status(response))
            }
        });

        match result {
            Ok(response) => {
                debug!(status = %response.status(), "Request succeeded");
                let payload = match &self.hooks.post_receive {
                    Some(hook) => hook(response, &options)?,
                    None => Payload::Native(response),
                };
                Ok(Outcome::Completed(payload))
            }
            Err(error) => {
                if let Some(hook) = &self.hooks.on_error {
                    hook(&error, &options);
                }

                let error = HttpError::from_transport(error);
                match &self.hooks.recover {
                    Some(hook) => match hook(error, options).await {
                        Recovery::Recovered(payload) => Ok(Outcome::Completed(payload)),
                        Recovery::Rejected(error) => Err(error),
                    },
                    None => Err(error),
                }
            }
        }
    }
}

impl std::fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(name)
        .map_err(|e| HttpError::Build(format!("invalid header name {:?}: {}", name, e)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| HttpError::Build(format!("invalid header value for {}: {}", name, e)))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Response;
    use crate::request::TransportRequest;
    use async_trait::async_trait;
    use http::StatusCode;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with a fixed status and body, recording what
    /// it was sent.
    struct StubTransport {
        status: u16,
        body: &'static str,
        sent: Mutex<Vec<TransportRequest>>,
    }

    impl StubTransport {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn send(
            &self,
            request: TransportRequest,
            _cancel: CancellationToken,
        ) -> std::result::Result<Response, TransportError> {
            let url = request.url.clone();
            self.sent.lock().push(request);
            Ok(Response::new(
                StatusCode::from_u16(self.status).unwrap(),
                HeaderMap::new(),
                self.body,
                url,
            ))
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::builder()
            .base_url("http://localhost:3000")
            .build()
    }

    #[tokio::test]
    async fn test_bare_pipeline_returns_native_response() {
        let transport = StubTransport::new(200, r#"{"code":0,"data":1}"#);
        let pipeline = HttpPipeline::new(config(), transport.clone(), Hooks::new()).unwrap();

        let outcome = pipeline.get(RequestDescriptor::get("/x")).await.unwrap();
        let payload = outcome.completed().unwrap();
        assert_eq!(payload.native().unwrap().status(), StatusCode::OK);
        assert!(pipeline.pending().is_empty());
    }

    #[tokio::test]
    async fn test_post_defaults_to_form() {
        let transport = StubTransport::new(200, "{}");
        let pipeline = HttpPipeline::new(config(), transport.clone(), Hooks::new()).unwrap();

        let request = RequestDescriptor::post("/login")
            .data(&serde_json::json!({"username": "alice"}))
            .unwrap();
        let _ = pipeline.post(request).await.unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent[0].header("content-type"), Some(FORM_URLENCODED));
        assert_eq!(
            sent[0].body.as_bytes().map(|b| b.as_ref()),
            Some(&b"username=alice"[..])
        );
    }

    #[tokio::test]
    async fn test_abort_skips_transport() {
        let transport = StubTransport::new(200, "{}");
        let hooks = Hooks::new().pre_process(|_, _| async { Ok(Preprocessed::Abort) });
        let pipeline = HttpPipeline::new(config(), transport.clone(), hooks).unwrap();

        let outcome = pipeline.get(RequestDescriptor::get("/x")).await.unwrap();
        assert!(outcome.is_aborted());
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failure_runs_error_hooks() {
        let transport = StubTransport::new(404, r#"{"message":"no such item"}"#);
        let on_error = Arc::new(AtomicUsize::new(0));
        let counter = on_error.clone();
        let hooks = Hooks::new()
            .on_error(move |error, _| {
                assert_eq!(error.status_code(), Some(404));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .post_receive(|_, _| panic!("post_receive must not run on failure"));
        let pipeline = HttpPipeline::new(config(), transport, hooks).unwrap();

        let err = pipeline.get(RequestDescriptor::get("/x")).await.unwrap_err();
        let classification = err.classification().unwrap();
        assert_eq!(classification.message_key, "errMsg404");
        assert_eq!(classification.message.as_deref(), Some("no such item"));
        assert_eq!(on_error.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recover_substitutes_result() {
        let transport = StubTransport::new(500, "");
        let hooks = Hooks::new().recover(|_, _| async {
            Recovery::Recovered(Payload::Data(serde_json::json!("fallback")))
        });
        let pipeline = HttpPipeline::new(config(), transport, hooks).unwrap();

        let payload = pipeline
            .delete(RequestDescriptor::delete("/x"))
            .await
            .unwrap()
            .completed()
            .unwrap();
        assert_eq!(payload.data(), Some(&serde_json::json!("fallback")));
    }

    #[tokio::test]
    async fn test_default_headers() {
        let transport = StubTransport::new(200, "{}");
        let config = PipelineConfig::builder()
            .base_url("http://localhost:3000")
            .default_header("X-Client", "courier")
            .build();
        let pipeline = HttpPipeline::new(config, transport.clone(), Hooks::new()).unwrap();
        pipeline.set_header("X-Tenant", "7").unwrap();
        assert!(pipeline.set_header("bad header", "x").is_err());

        let _ = pipeline.put(RequestDescriptor::put("/x")).await.unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent[0].header("x-client"), Some("courier"));
        assert_eq!(sent[0].header("x-tenant"), Some("7"));
    }
}
