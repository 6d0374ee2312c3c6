//! User-facing presentation seam.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::options::ErrorMessageMode;

/// A message to show the user.
///
/// Keys are resolved by the presenter's localization layer. `message`,
/// when set, is server text shown verbatim instead of the keyed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Dialog title key (modal mode only).
    pub title_key: Option<&'static str>,
    /// Message key.
    pub message_key: &'static str,
    /// Verbatim text overriding the keyed message.
    pub message: Option<String>,
}

/// A blocking yes/no prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Title key.
    pub title_key: &'static str,
    /// Content key.
    pub content_key: &'static str,
}

/// Callback run when the user accepts a [`Confirmation`].
pub type OnConfirm = Box<dyn FnOnce() + Send>;

/// Shows notices and confirmations.
pub trait Presenter: Send + Sync {
    /// Show a notice. `mode` is never [`ErrorMessageMode::None`].
    fn notify(&self, notice: Notice, mode: ErrorMessageMode);

    /// Ask for confirmation; run `on_confirm` if accepted.
    fn confirm(&self, confirmation: Confirmation, on_confirm: OnConfirm);
}

/// Presenter that shows nothing and declines every confirmation.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentPresenter;

impl Presenter for SilentPresenter {
    fn notify(&self, notice: Notice, mode: ErrorMessageMode) {
        tracing::trace!(key = notice.message_key, ?mode, "Notice suppressed");
    }

    fn confirm(&self, confirmation: Confirmation, _on_confirm: OnConfirm) {
        tracing::trace!(key = confirmation.content_key, "Confirmation declined");
    }
}

/// Presenter that records everything it is asked to show.
///
/// Confirmations are accepted when built with [`RecordingPresenter::accepting`].
#[derive(Clone, Default)]
pub struct RecordingPresenter {
    notices: Arc<Mutex<Vec<(Notice, ErrorMessageMode)>>>,
    confirmations: Arc<Mutex<Vec<Confirmation>>>,
    accept: bool,
}

impl RecordingPresenter {
    /// Create a presenter that declines confirmations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a presenter that accepts confirmations.
    pub fn accepting() -> Self {
        Self {
            accept: true,
            ..Self::default()
        }
    }

    /// Notices shown so far.
    pub fn notices(&self) -> Vec<(Notice, ErrorMessageMode)> {
        self.notices.lock().clone()
    }

    /// Notices shown in `mode`.
    pub fn notices_in(&self, mode: ErrorMessageMode) -> Vec<Notice> {
        self.notices
            .lock()
            .iter()
            .filter(|(_, m)| *m == mode)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Confirmations requested so far.
    pub fn confirmations(&self) -> Vec<Confirmation> {
        self.confirmations.lock().clone()
    }
}

impl Presenter for RecordingPresenter {
    fn notify(&self, notice: Notice, mode: ErrorMessageMode) {
        self.notices.lock().push((notice, mode));
    }

    fn confirm(&self, confirmation: Confirmation, on_confirm: OnConfirm) {
        self.confirmations.lock().push(confirmation);
        if self.accept {
            on_confirm();
        }
    }
}
