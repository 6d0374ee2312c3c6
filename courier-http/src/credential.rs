//! Credential lifecycle.
//!
//! [`CredentialManager`] owns the access/refresh pair and hands out a
//! usable access token, refreshing it when it is close to expiry.
//! Concurrent refreshes are coalesced: callers that find the credential
//! stale while a refresh is running wait for it and reuse its result.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::HttpPipeline;
use crate::options::{CallOverrides, ErrorMessageMode};
use crate::presenter::{Confirmation, Presenter, SilentPresenter};
use crate::request::RequestDescriptor;
use crate::store::{CredentialStore, StoreError, StoreKey, TtlPolicy};
use crate::{HttpError, Outcome, PipelineConfig, Result, params};

/// Title key of the re-login prompt.
pub const LOGOUT_TITLE_KEY: &str = "sys.app.logoutTip";
/// Content key of the re-login prompt.
pub const LOGOUT_CONTENT_KEY: &str = "sys.api.timeoutMessage";

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Lifecycle state of a credential, computed when asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// No usable credential.
    Absent,
    /// More than the safety margin left before expiry.
    Valid,
    /// Still valid, but within the safety margin.
    NearExpiry,
    /// Past its expiry instant.
    Expired,
}

/// Access/refresh pair with its absolute expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Bearer access token.
    pub access_token: String,
    /// Token used to obtain a new access token.
    pub refresh_token: String,
    /// Expiry instant, epoch seconds.
    pub expires_at: i64,
}

impl Credential {
    /// Create a credential.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Credential for a grant received at `now`.
    pub fn from_grant(grant: TokenGrant, now: i64) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: now.saturating_add(grant.expires_in),
        }
    }

    /// Check validity at `now`: both tokens set and not yet expired.
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty() && self.expires_at > now
    }

    /// Lifecycle state at `now` given a safety `margin` in seconds.
    ///
    /// Only the access token decides usability here: a credential with an
    /// empty refresh token is still `Valid` until the margin is reached, it
    /// just cannot be refreshed afterwards. [`Credential::is_valid_at`]
    /// requires both tokens.
    pub fn state_at(&self, now: i64, margin: i64) -> CredentialState {
        if self.access_token.is_empty() {
            CredentialState::Absent
        } else if self.expires_at > now.saturating_add(margin) {
            CredentialState::Valid
        } else if self.expires_at > now {
            CredentialState::NearExpiry
        } else {
            CredentialState::Expired
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token pair as issued by the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// Access token.
    pub access_token: String,
    /// Refresh token. Empty when the server did not rotate it.
    #[serde(default)]
    pub refresh_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// Signed-in user's profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    /// User id.
    pub user_id: String,
    /// Login name.
    pub username: String,
    /// Display name.
    pub nickname: String,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Role codes.
    pub roles: Vec<String>,
    /// Permission codes.
    pub authorities: Vec<String>,
}

/// Exchanges a refresh token for a new grant.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Refresh using `refresh_token`.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// [`TokenRefresher`] calling the refresh endpoint through its own pipeline.
///
/// The pipeline should carry no credential hooks, otherwise a refresh
/// could wait on itself.
#[derive(Clone)]
pub struct HttpTokenRefresher {
    pipeline: HttpPipeline,
    path: String,
}

impl HttpTokenRefresher {
    /// Refresh through `pipeline`, posting to the configured refresh path.
    pub fn new(pipeline: HttpPipeline) -> Self {
        let config = pipeline.config();
        let path = params::join_prefix(&config.url_prefix, &config.refresh_path);
        Self { pipeline, path }
    }

    /// Build a refresher over a plain reqwest pipeline.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        Ok(Self::new(HttpPipeline::with_reqwest(config, Default::default())?))
    }

    /// URL the refresh is posted to.
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant> {
        let request = RequestDescriptor::post(self.path.clone())
            .data(&json!({ "refreshToken": refresh_token }))?
            .options(
                CallOverrides::new()
                    .with_credential(false)
                    .error_message_mode(ErrorMessageMode::None)
                    .ignore_deduplication(true),
            );

        match self.pipeline.post(request).await? {
            Outcome::Completed(payload) => payload.into_json(),
            Outcome::Aborted | Outcome::Superseded => {
                Err(HttpError::Refresh("refresh request did not complete".to_string()))
            }
        }
    }
}

struct Inner {
    credential: RwLock<Option<Credential>>,
    profile: RwLock<Option<UserProfile>>,
    roles: RwLock<Vec<String>>,
    store: Arc<dyn CredentialStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    presenter: Arc<dyn Presenter>,
    refresh_lock: tokio::sync::Mutex<()>,
    margin: Duration,
}

/// Owns the credential and the identity state tied to it.
///
/// Cloning is cheap; clones share state.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

impl CredentialManager {
    /// Create a manager with a silent presenter and no refresher.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::builder(store).build()
    }

    /// Create a builder.
    pub fn builder(store: Arc<dyn CredentialStore>) -> CredentialManagerBuilder {
        CredentialManagerBuilder {
            store,
            refresher: None,
            presenter: Arc::new(SilentPresenter),
            margin: Duration::from_secs(180),
        }
    }

    /// Create a builder using the refresh margin from `config`.
    pub fn from_config(
        store: Arc<dyn CredentialStore>,
        config: &PipelineConfig,
    ) -> CredentialManagerBuilder {
        Self::builder(store).margin(config.refresh_margin)
    }

    /// Reload credential, profile and roles from the store.
    pub async fn restore(&self) -> std::result::Result<(), StoreError> {
        let credential = read::<Credential>(&*self.inner.store, StoreKey::Token).await?;
        let profile = read::<UserProfile>(&*self.inner.store, StoreKey::UserInfo).await?;
        let roles = read::<Vec<String>>(&*self.inner.store, StoreKey::Roles).await?;

        debug!(
            credential = credential.is_some(),
            profile = profile.is_some(),
            "Restored credential state"
        );
        *self.inner.credential.write() = credential;
        *self.inner.profile.write() = profile;
        *self.inner.roles.write() = roles.unwrap_or_default();
        Ok(())
    }

    /// Snapshot of the current credential.
    pub fn credential(&self) -> Option<Credential> {
        self.inner.credential.read().clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CredentialState {
        self.state_at(now_secs())
    }

    fn state_at(&self, now: i64) -> CredentialState {
        match &*self.inner.credential.read() {
            Some(credential) => credential.state_at(now, self.margin_secs()),
            None => CredentialState::Absent,
        }
    }

    fn margin_secs(&self) -> i64 {
        i64::try_from(self.inner.margin.as_secs()).unwrap_or(i64::MAX)
    }

    /// Check if a valid credential is held.
    pub fn is_logged_in(&self) -> bool {
        self.inner
            .credential
            .read()
            .as_ref()
            .is_some_and(|c| c.is_valid_at(now_secs()))
    }

    /// Signed-in user's profile.
    pub fn profile(&self) -> Option<UserProfile> {
        self.inner.profile.read().clone()
    }

    /// Role codes.
    pub fn roles(&self) -> Vec<String> {
        self.inner.roles.read().clone()
    }

    /// A usable access token, refreshing if needed.
    ///
    /// Returns `None` when no credential can be obtained; the user is then
    /// asked to log in again.
    pub async fn get_access_auth(&self) -> Option<String> {
        let snapshot = self.credential();
        if let Some(credential) = &snapshot
            && credential.state_at(now_secs(), self.margin_secs()) == CredentialState::Valid
        {
            return Some(credential.access_token.clone());
        }

        if let Some(token) = self.refresh().await {
            return Some(token);
        }

        self.prompt_login();
        None
    }

    /// Refresh the credential, coalescing with any refresh in flight.
    ///
    /// Returns the new access token, or `None` if there is nothing to
    /// refresh with or the refresh failed.
    pub async fn refresh(&self) -> Option<String> {
        let refresher = self.inner.refresher.clone()?;
        let _guard = self.inner.refresh_lock.lock().await;

        let current = self.credential()?;
        if current.state_at(now_secs(), self.margin_secs()) == CredentialState::Valid {
            debug!("Credential refreshed by a concurrent caller");
            return Some(current.access_token);
        }
        if current.refresh_token.is_empty() {
            debug!("No refresh token available");
            return None;
        }

        match refresher.refresh(&current.refresh_token).await {
            Ok(grant) if grant.access_token.is_empty() => {
                warn!("Refresh returned an empty access token");
                self.discard().await;
                None
            }
            Ok(mut grant) => {
                if grant.refresh_token.is_empty() {
                    grant.refresh_token = current.refresh_token;
                }
                let credential = Credential::from_grant(grant, now_secs());
                let token = credential.access_token.clone();
                info!(expires_at = credential.expires_at, "Credential refreshed");
                self.replace(credential).await;
                Some(token)
            }
            Err(e) => {
                warn!(error = %e, "Credential refresh failed");
                self.discard().await;
                None
            }
        }
    }

    /// Install a freshly issued grant.
    pub async fn set_token(&self, grant: TokenGrant) {
        self.replace(Credential::from_grant(grant, now_secs())).await;
    }

    /// Install a credential as-is.
    pub async fn set_credential(&self, credential: Credential) {
        self.replace(credential).await;
    }

    async fn replace(&self, credential: Credential) {
        let value = serde_json::to_value(&credential);
        *self.inner.credential.write() = Some(credential);
        match value {
            Ok(value) => self.persist(StoreKey::Token, value).await,
            Err(e) => warn!(error = %e, "Failed to serialize credential"),
        }
    }

    /// Install the signed-in user's profile and roles.
    pub async fn set_profile(&self, profile: UserProfile) {
        let roles = profile.roles.clone();
        let value = serde_json::to_value(&profile);
        *self.inner.profile.write() = Some(profile);
        *self.inner.roles.write() = roles.clone();

        match value {
            Ok(value) => self.persist(StoreKey::UserInfo, value).await,
            Err(e) => warn!(error = %e, "Failed to serialize profile"),
        }
        self.persist(StoreKey::Roles, Value::from(roles)).await;
    }

    async fn persist(&self, key: StoreKey, value: Value) {
        if let Err(e) = self.inner.store.set(key, value, TtlPolicy::Default).await {
            warn!(key = key.as_str(), error = %e, "Failed to persist credential state");
        }
    }

    /// Clear credential, profile and roles. Safe to call when logged out.
    pub async fn logout(&self) {
        self.discard().await;
    }

    /// Drop a credential that can no longer be refreshed.
    async fn discard(&self) {
        self.clear_local();
        remove_all(&*self.inner.store).await;
    }

    fn clear_local(&self) {
        let had_credential = self.inner.credential.write().take().is_some();
        self.inner.profile.write().take();
        self.inner.roles.write().clear();
        if had_credential {
            info!("Logged out");
        }
    }

    fn prompt_login(&self) {
        let manager = self.clone();
        self.inner.presenter.confirm(
            Confirmation {
                title_key: LOGOUT_TITLE_KEY,
                content_key: LOGOUT_CONTENT_KEY,
            },
            Box::new(move || {
                manager.clear_local();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        let store = manager.inner.store.clone();
                        handle.spawn(async move { remove_all(&*store).await });
                    }
                    Err(_) => warn!("No runtime available, stored credential left in place"),
                }
            }),
        );
    }
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("state", &self.state())
            .field("margin", &self.inner.margin)
            .finish()
    }
}

async fn read<T: serde::de::DeserializeOwned>(
    store: &dyn CredentialStore,
    key: StoreKey,
) -> std::result::Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| StoreError::Invalid {
                key: key.as_str(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

async fn remove_all(store: &dyn CredentialStore) {
    for key in [StoreKey::Token, StoreKey::UserInfo, StoreKey::Roles] {
        if let Err(e) = store.remove(key).await {
            warn!(key = key.as_str(), error = %e, "Failed to remove credential state");
        }
    }
}

/// Builder for [`CredentialManager`].
pub struct CredentialManagerBuilder {
    store: Arc<dyn CredentialStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    presenter: Arc<dyn Presenter>,
    margin: Duration,
}

impl CredentialManagerBuilder {
    /// Set the refresher.
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Set the presenter used for the re-login prompt.
    pub fn presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// Set the refresh safety margin.
    pub fn margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// Build the manager.
    pub fn build(self) -> CredentialManager {
        CredentialManager {
            inner: Arc::new(Inner {
                credential: RwLock::new(None),
                profile: RwLock::new(None),
                roles: RwLock::new(Vec::new()),
                store: self.store,
                refresher: self.refresher,
                presenter: self.presenter,
                refresh_lock: tokio::sync::Mutex::new(()),
                margin: self.margin,
            }),
        }
    }

    /// Build the manager and load its state from the store.
    pub async fn build_restored(self) -> std::result::Result<CredentialManager, StoreError> {
        let manager = self.build();
        manager.restore().await?;
        Ok(manager)
    }
}
