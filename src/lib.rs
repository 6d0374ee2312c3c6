// Courier - HTTP request orchestration for Rust
//
// This library wraps outgoing HTTP calls in a pipeline of hooks, with
// in-flight de-duplication, credential refresh and error classification.

// Re-export the pipeline
pub use courier_http::*;

// Re-export runtime crates used in hook signatures
pub use async_trait::async_trait;
pub use serde;
pub use serde_json;
pub use tokio;

// Prelude for common imports
pub mod prelude {
    pub use courier_http::prelude::*;
    pub use courier_http::{
        CancellationToken, Credential, CredentialState, Notice, RecordingPresenter,
        SilentPresenter, TransportError, TransportRequest,
    };
}
