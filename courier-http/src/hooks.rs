//! The hook set.
//!
//! Hooks run in a fixed order for every call:
//!
//! 1. `pre_process` (async, may abort the call)
//! 2. `pre_send` (sync, rewrites the descriptor)
//! 3. `post_receive` on success
//! 4. `on_error` then `recover` on failure
//!
//! Every hook is optional; a missing hook is a no-op.

use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::options::CallOptions;
use crate::request::RequestDescriptor;
use crate::response::{Payload, Response};
use crate::{HttpError, Result, TransportError};

/// Decision of the pre-process hook.
#[derive(Debug)]
pub enum Preprocessed {
    /// Continue with the (possibly rewritten) request.
    Proceed(RequestDescriptor),
    /// Abandon the call. It resolves to [`Outcome::Aborted`](crate::Outcome::Aborted).
    Abort,
}

/// Decision of the recover hook.
#[derive(Debug)]
pub enum Recovery {
    /// Substitute a successful result.
    Recovered(Payload),
    /// Reject the call with this error.
    Rejected(HttpError),
}

/// Async hook run before anything else.
pub type PreProcessHook =
    Arc<dyn Fn(RequestDescriptor, CallOptions) -> BoxFuture<'static, Result<Preprocessed>> + Send + Sync>;

/// Sync hook rewriting the request before it is encoded.
pub type PreSendHook = Arc<dyn Fn(&mut RequestDescriptor, &CallOptions) -> Result<()> + Send + Sync>;

/// Hook turning a successful response into the call's payload.
pub type PostReceiveHook = Arc<dyn Fn(Response, &CallOptions) -> Result<Payload> + Send + Sync>;

/// Side-effecting hook observing a failure.
pub type OnErrorHook = Arc<dyn Fn(&TransportError, &CallOptions) + Send + Sync>;

/// Async hook deciding whether a classified failure can be recovered.
pub type RecoverHook = Arc<dyn Fn(HttpError, CallOptions) -> BoxFuture<'static, Recovery> + Send + Sync>;

/// Optional hooks applied by the pipeline.
#[derive(Clone, Default)]
pub struct Hooks {
    /// Runs first; may suspend and may abort the call.
    pub pre_process: Option<PreProcessHook>,
    /// Rewrites the request.
    pub pre_send: Option<PreSendHook>,
    /// Transforms a successful response.
    pub post_receive: Option<PostReceiveHook>,
    /// Observes a failure.
    pub on_error: Option<OnErrorHook>,
    /// Recovers or rejects a failure.
    pub recover: Option<RecoverHook>,
}

impl Hooks {
    /// No hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pre-process hook.
    pub fn pre_process<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(RequestDescriptor, CallOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Preprocessed>> + Send + 'static,
    {
        self.pre_process = Some(Arc::new(move |request, options| Box::pin(hook(request, options))));
        self
    }

    /// Set the pre-send hook.
    pub fn pre_send<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestDescriptor, &CallOptions) -> Result<()> + Send + Sync + 'static,
    {
        self.pre_send = Some(Arc::new(hook));
        self
    }

    /// Set the post-receive hook.
    pub fn post_receive<F>(mut self, hook: F) -> Self
    where
        F: Fn(Response, &CallOptions) -> Result<Payload> + Send + Sync + 'static,
    {
        self.post_receive = Some(Arc::new(hook));
        self
    }

    /// Set the on-error hook.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TransportError, &CallOptions) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Set the recover hook.
    pub fn recover<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(HttpError, CallOptions) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Recovery> + Send + 'static,
    {
        self.recover = Some(Arc::new(move |error, options| Box::pin(hook(error, options))));
        self
    }

    /// Check if no hook is set.
    pub fn is_empty(&self) -> bool {
        self.pre_process.is_none()
            && self.pre_send.is_none()
            && self.post_receive.is_none()
            && self.on_error.is_none()
            && self.recover.is_none()
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("pre_process", &self.pre_process.is_some())
            .field("pre_send", &self.pre_send.is_some())
            .field("post_receive", &self.post_receive.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("recover", &self.recover.is_some())
            .finish()
    }
}
