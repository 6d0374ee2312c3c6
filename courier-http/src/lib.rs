//! # Courier HTTP
//!
//! A request pipeline that wraps every outgoing call with hooks, in-flight
//! de-duplication, credential refresh and error classification.
//!
//! ## Features
//!
//! - **Hooks**: optional pre-process, pre-send, post-receive, on-error and
//!   recover stages that run in a fixed order
//! - **De-duplication**: a newer identical request supersedes the one in flight
//! - **Credentials**: access token caching with single-flight refresh
//! - **Error classification**: status codes mapped to user-facing categories
//! - **Uploads**: multipart bodies from structured parameters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use courier_http::{HttpPipeline, PipelineConfig, RequestDescriptor, StandardHooks};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .base_url("http://localhost:3000")
//!         .url_prefix("/basic-api")
//!         .build();
//!     let hooks = StandardHooks::new(&config).into_hooks();
//!     let pipeline = HttpPipeline::with_reqwest(config, hooks)?;
//!
//!     let outcome = pipeline
//!         .get(RequestDescriptor::get("/demo").param("keyword", "foo"))
//!         .await?;
//!
//!     if let Some(payload) = outcome.completed() {
//!         println!("{:?}", payload.data());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## With Credentials
//!
//! ```rust,no_run
//! use courier_http::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .base_url("http://localhost:3000")
//!         .build();
//!
//!     let refresher = HttpTokenRefresher::from_config(config.clone())?;
//!     let credentials =
//!         CredentialManager::from_config(Arc::new(MemoryCredentialStore::new()), &config)
//!             .refresher(Arc::new(refresher))
//!             .build_restored()
//!             .await?;
//!
//!     let hooks = StandardHooks::new(&config)
//!         .credentials(credentials)
//!         .into_hooks();
//!     let pipeline = HttpPipeline::with_reqwest(config, hooks)?;
//!
//!     // Resolves to `Outcome::Aborted` when no credential can be obtained
//!     let outcome = pipeline.get(RequestDescriptor::get("/user/info")).await?;
//!     println!("aborted: {}", outcome.is_aborted());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod classify;
mod client;
mod config;
mod credential;
mod error;
mod hooks;
mod options;
mod params;
mod pending;
mod presenter;
mod request;
mod response;
mod standard;
mod store;
mod transport;
mod upload;

pub use classify::{
    Classification, ERROR_TITLE_KEY, ErrorCategory, NETWORK_MESSAGE_KEY, NETWORK_TITLE_KEY,
    TIMEOUT_MESSAGE_KEY, classify, classify_transport, present,
};
pub use client::HttpPipeline;
pub use config::{ConfigError, FORM_URLENCODED, JSON, PipelineConfig, PipelineConfigBuilder};
pub use credential::{
    Credential, CredentialManager, CredentialManagerBuilder, CredentialState, HttpTokenRefresher,
    LOGOUT_CONTENT_KEY, LOGOUT_TITLE_KEY, TokenGrant, TokenRefresher, UserProfile,
};
pub use error::{HttpError, Result, TransportError, TransportErrorKind};
pub use hooks::{
    Hooks, OnErrorHook, PostReceiveHook, PreProcessHook, PreSendHook, Preprocessed, RecoverHook,
    Recovery,
};
pub use options::{CallOptions, CallOverrides, ErrorMessageMode};
pub use params::{
    DATE_TIME_FORMAT, LOCALE_PARAM, TIMESTAMP_PARAM, format_request_date, join_locale, join_prefix,
    join_timestamp,
};
pub use pending::{PendingHandle, PendingRequests, RequestFingerprint};
pub use presenter::{Confirmation, Notice, OnConfirm, Presenter, RecordingPresenter, SilentPresenter};
pub use request::{Body, RequestDescriptor, TransportRequest};
pub use response::{Outcome, Payload, Response};
pub use standard::StandardHooks;
pub use store::{CredentialStore, DEFAULT_TTL, MemoryCredentialStore, StoreError, StoreKey, TtlPolicy};
pub use transport::{ReqwestTransport, Transport};
pub use upload::{MultipartBody, Part, PartValue, UploadFileParams};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use tokio_util::sync::CancellationToken;
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use courier_http::prelude::*;
/// ```
pub mod prelude {
    pub use crate::classify::{Classification, ErrorCategory};
    pub use crate::client::HttpPipeline;
    pub use crate::config::{PipelineConfig, PipelineConfigBuilder};
    pub use crate::credential::{CredentialManager, HttpTokenRefresher, TokenGrant, UserProfile};
    pub use crate::error::HttpError;
    pub use crate::hooks::{Hooks, Preprocessed, Recovery};
    pub use crate::options::{CallOptions, CallOverrides, ErrorMessageMode};
    pub use crate::presenter::Presenter;
    pub use crate::request::RequestDescriptor;
    pub use crate::response::{Outcome, Payload, Response};
    pub use crate::standard::StandardHooks;
    pub use crate::store::{CredentialStore, MemoryCredentialStore};
    pub use crate::transport::{ReqwestTransport, Transport};
    pub use crate::upload::UploadFileParams;
    pub use http::{HeaderMap, Method, StatusCode, header};
}
