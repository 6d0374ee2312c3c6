//! The stock hook set.

use http::{HeaderName, HeaderValue, Method};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::classify::{self, NETWORK_MESSAGE_KEY, NETWORK_TITLE_KEY, TIMEOUT_MESSAGE_KEY};
use crate::credential::CredentialManager;
use crate::hooks::{Hooks, Preprocessed, Recovery};
use crate::options::{CallOptions, ErrorMessageMode};
use crate::presenter::{Notice, Presenter, SilentPresenter};
use crate::request::RequestDescriptor;
use crate::response::{Payload, Response};
use crate::{HttpError, PipelineConfig, Result, TransportError, params};

/// Builds the standard [`Hooks`]:
///
/// - `pre_process` attaches the access credential, aborting the call when
///   none can be obtained
/// - `pre_send` joins the URL prefix, formats dates, adds `_t` to GET
///   requests and the `lang` parameter
/// - `post_receive` unwraps the `{code, message, data}` envelope
/// - `on_error` logs and shows timeout and connectivity notices
/// - `recover` presents status failures, then rejects
#[derive(Clone)]
pub struct StandardHooks {
    url_prefix: String,
    locale: String,
    credential_header: String,
    credentials: Option<CredentialManager>,
    presenter: Arc<dyn Presenter>,
}

impl StandardHooks {
    /// Standard hooks for `config`, without credentials.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            url_prefix: config.url_prefix.clone(),
            locale: config.locale.clone(),
            credential_header: config.credential_header.clone(),
            credentials: None,
            presenter: Arc::new(SilentPresenter),
        }
    }

    /// Attach credentials from `manager`.
    pub fn credentials(mut self, manager: CredentialManager) -> Self {
        self.credentials = Some(manager);
        self
    }

    /// Show notices through `presenter`.
    pub fn presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// Build the hook set.
    pub fn into_hooks(self) -> Hooks {
        let this = Arc::new(self);

        let pre_process = this.clone();
        let pre_send = this.clone();
        let on_error = this.clone();
        let recover = this;

        Hooks::new()
            .pre_process(move |request, options| {
                let hooks = pre_process.clone();
                async move { hooks.attach_credential(request, options).await }
            })
            .pre_send(move |request, options| {
                pre_send.shape_request(request, options, chrono::Utc::now().timestamp_millis());
                Ok(())
            })
            .post_receive(transform_response)
            .on_error(move |error, options| on_error.report(error, options))
            .recover(move |error, options| {
                let hooks = recover.clone();
                async move { hooks.present_and_reject(error, options) }
            })
    }

    async fn attach_credential(
        &self,
        mut request: RequestDescriptor,
        options: CallOptions,
    ) -> Result<Preprocessed> {
        let Some(credentials) = &self.credentials else {
            return Ok(Preprocessed::Proceed(request));
        };
        if !options.with_credential {
            return Ok(Preprocessed::Proceed(request));
        }

        let name = HeaderName::try_from(self.credential_header.as_str())
            .map_err(|e| HttpError::Hook(format!("invalid credential header: {}", e)))?;
        if request.headers.contains_key(&name) {
            return Ok(Preprocessed::Proceed(request));
        }

        match credentials.get_access_auth().await {
            Some(token) => {
                let value = HeaderValue::try_from(token)
                    .map_err(|e| HttpError::Hook(format!("invalid access token: {}", e)))?;
                request.headers.insert(name, value);
                Ok(Preprocessed::Proceed(request))
            }
            None => {
                debug!(url = %request.url, "No credential available, aborting request");
                Ok(Preprocessed::Abort)
            }
        }
    }

    fn shape_request(&self, request: &mut RequestDescriptor, options: &CallOptions, now_millis: i64) {
        if options.join_prefix {
            request.url = params::join_prefix(&self.url_prefix, &request.url);
        }

        if options.format_date {
            if let Some(query) = request.params.as_mut() {
                params::format_request_date(query);
            }
            if let Some(data) = request.data.as_mut() {
                params::format_request_date(data);
            }
        }

        if options.join_time && request.method == Method::GET {
            params::join_timestamp(&mut request.params, now_millis);
        }

        if options.join_locale {
            params::join_locale(&mut request.params, &self.locale);
        }
    }

    fn report(&self, error: &TransportError, options: &CallOptions) {
        warn!(
            status = ?error.status_code(),
            kind = ?error.kind(),
            error = %error.message(),
            "Request failed"
        );

        if options.error_message_mode == ErrorMessageMode::None || error.status_code().is_some() {
            return;
        }

        if error.is_timeout() {
            self.presenter.notify(
                Notice {
                    title_key: None,
                    message_key: TIMEOUT_MESSAGE_KEY,
                    message: None,
                },
                ErrorMessageMode::Message,
            );
        } else if error.is_network() {
            self.presenter.notify(
                Notice {
                    title_key: Some(NETWORK_TITLE_KEY),
                    message_key: NETWORK_MESSAGE_KEY,
                    message: None,
                },
                ErrorMessageMode::Modal,
            );
        }
    }

    fn present_and_reject(&self, error: HttpError, options: CallOptions) -> Recovery {
        if let HttpError::Classified(classification) = &error
            && classification.status.is_some()
        {
            classify::present(classification, options.error_message_mode, &*self.presenter);
        }
        Recovery::Rejected(error)
    }
}

fn transform_response(response: Response, options: &CallOptions) -> Result<Payload> {
    if options.is_return_native_response {
        return Ok(Payload::Native(response));
    }
    Ok(Payload::Data(response.unwrap_envelope()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorCategory;
    use crate::credential::Credential;
    use crate::presenter::RecordingPresenter;
    use crate::store::MemoryCredentialStore;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> PipelineConfig {
        PipelineConfig::builder().url_prefix("/basic-api").build()
    }

    #[test]
    fn test_shape_request_get() {
        let hooks = StandardHooks::new(&config());
        let mut request = RequestDescriptor::get("/demo").param("keyword", " foo ");
        let options = CallOptions {
            join_locale: true,
            ..CallOptions::default()
        };

        hooks.shape_request(&mut request, &options, 42);

        assert_eq!(request.url, "/basic-api/demo");
        assert_eq!(
            request.params,
            Some(json!({"keyword": "foo", "_t": 42, "lang": "zh"}))
        );
    }

    #[test]
    fn test_shape_request_post_skips_timestamp() {
        let hooks = StandardHooks::new(&config());
        let mut request = RequestDescriptor::post("/items")
            .data(&json!({"at": "2024-05-01T10:00:00Z"}))
            .unwrap();
        let options = CallOptions {
            join_prefix: false,
            ..CallOptions::default()
        };

        hooks.shape_request(&mut request, &options, 42);

        assert_eq!(request.url, "/items");
        assert_eq!(request.params, None);
        assert_eq!(request.data, Some(json!({"at": "2024-05-01 10:00:00"})));
    }

    #[tokio::test]
    async fn test_attach_credential() {
        let manager = CredentialManager::new(Arc::new(MemoryCredentialStore::new()));
        manager
            .set_credential(Credential::new("tok", "ref", chrono::Utc::now().timestamp() + 3600))
            .await;
        let hooks = StandardHooks::new(&config()).credentials(manager);

        let request = match hooks
            .attach_credential(RequestDescriptor::get("/x"), CallOptions::default())
            .await
            .unwrap()
        {
            Preprocessed::Proceed(r) => r,
            Preprocessed::Abort => panic!("unexpected abort"),
        };
        assert_eq!(request.headers.get("Access-Token").unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_missing_credential_aborts() {
        let manager = CredentialManager::new(Arc::new(MemoryCredentialStore::new()));
        let hooks = StandardHooks::new(&config()).credentials(manager);

        let decision = hooks
            .attach_credential(RequestDescriptor::get("/x"), CallOptions::default())
            .await
            .unwrap();
        assert!(matches!(decision, Preprocessed::Abort));

        let options = CallOptions {
            with_credential: false,
            ..CallOptions::default()
        };
        let decision = hooks
            .attach_credential(RequestDescriptor::get("/x"), options)
            .await
            .unwrap();
        assert!(matches!(decision, Preprocessed::Proceed(_)));
    }

    #[test]
    fn test_timeout_and_network_notices() {
        let presenter = RecordingPresenter::new();
        let hooks = StandardHooks::new(&config()).presenter(Arc::new(presenter.clone()));

        hooks.report(&TransportError::timeout(Duration::from_secs(20)), &CallOptions::default());
        hooks.report(&TransportError::network("Network Error"), &CallOptions::default());

        let silent = CallOptions {
            error_message_mode: ErrorMessageMode::None,
            ..CallOptions::default()
        };
        hooks.report(&TransportError::network("Network Error"), &silent);

        let notices = presenter.notices();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].0.message_key, TIMEOUT_MESSAGE_KEY);
        assert_eq!(notices[0].1, ErrorMessageMode::Message);
        assert_eq!(notices[1].0.title_key, Some(NETWORK_TITLE_KEY));
        assert_eq!(notices[1].1, ErrorMessageMode::Modal);
    }

    #[test]
    fn test_recover_presents_status_errors() {
        let presenter = RecordingPresenter::new();
        let hooks = StandardHooks::new(&config()).presenter(Arc::new(presenter.clone()));
        let options = CallOptions {
            error_message_mode: ErrorMessageMode::Modal,
            ..CallOptions::default()
        };

        let error = HttpError::Classified(classify::classify(Some(500), ""));
        match hooks.present_and_reject(error, options) {
            Recovery::Rejected(e) => assert_eq!(e.category(), Some(ErrorCategory::ServerError)),
            Recovery::Recovered(_) => panic!("unexpected recovery"),
        }

        let notices = presenter.notices_in(ErrorMessageMode::Modal);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].message_key, "errMsg500");
    }
}
