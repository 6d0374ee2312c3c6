//! Per-call options.

use serde::{Deserialize, Serialize};

/// How failures are shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMessageMode {
    /// Show nothing.
    #[serde(alias = "silent")]
    None,
    /// Transient inline notice.
    #[default]
    #[serde(alias = "inline")]
    Message,
    /// Blocking dialog.
    Modal,
}

/// Resolved options for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallOptions {
    /// Format date values and trim strings in params and body.
    pub format_date: bool,
    /// Prepend the configured URL prefix.
    pub join_prefix: bool,
    /// Add the `_t` freshness parameter to GET requests.
    pub join_time: bool,
    /// Add the `lang` parameter.
    pub join_locale: bool,
    /// Return the raw response instead of the unwrapped envelope.
    pub is_return_native_response: bool,
    /// How failures are shown.
    #[serde(alias = "errMsgMode")]
    pub error_message_mode: ErrorMessageMode,
    /// Skip in-flight de-duplication.
    pub ignore_deduplication: bool,
    /// Attach the access credential.
    pub with_credential: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            format_date: true,
            join_prefix: true,
            join_time: true,
            join_locale: false,
            is_return_native_response: false,
            error_message_mode: ErrorMessageMode::Message,
            ignore_deduplication: false,
            with_credential: true,
        }
    }
}

impl CallOptions {
    /// Apply `overrides` on top of these options.
    ///
    /// Shallow: a field set in `overrides` wins, otherwise the default stays.
    pub fn merge(&self, overrides: &CallOverrides) -> Self {
        Self {
            format_date: overrides.format_date.unwrap_or(self.format_date),
            join_prefix: overrides.join_prefix.unwrap_or(self.join_prefix),
            join_time: overrides.join_time.unwrap_or(self.join_time),
            join_locale: overrides.join_locale.unwrap_or(self.join_locale),
            is_return_native_response: overrides
                .is_return_native_response
                .unwrap_or(self.is_return_native_response),
            error_message_mode: overrides
                .error_message_mode
                .unwrap_or(self.error_message_mode),
            ignore_deduplication: overrides
                .ignore_deduplication
                .unwrap_or(self.ignore_deduplication),
            with_credential: overrides.with_credential.unwrap_or(self.with_credential),
        }
    }
}

/// Per-call overrides of [`CallOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CallOverrides {
    /// Override of [`CallOptions::format_date`].
    pub format_date: Option<bool>,
    /// Override of [`CallOptions::join_prefix`].
    pub join_prefix: Option<bool>,
    /// Override of [`CallOptions::join_time`].
    pub join_time: Option<bool>,
    /// Override of [`CallOptions::join_locale`].
    pub join_locale: Option<bool>,
    /// Override of [`CallOptions::is_return_native_response`].
    pub is_return_native_response: Option<bool>,
    /// Override of [`CallOptions::error_message_mode`].
    #[serde(alias = "errMsgMode")]
    pub error_message_mode: Option<ErrorMessageMode>,
    /// Override of [`CallOptions::ignore_deduplication`].
    pub ignore_deduplication: Option<bool>,
    /// Override of [`CallOptions::with_credential`].
    pub with_credential: Option<bool>,
}

impl CallOverrides {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Format dates and trim strings in params and body.
    pub fn format_date(mut self, enable: bool) -> Self {
        self.format_date = Some(enable);
        self
    }

    /// Prepend the configured URL prefix.
    pub fn join_prefix(mut self, enable: bool) -> Self {
        self.join_prefix = Some(enable);
        self
    }

    /// Add the `_t` freshness param to GET requests.
    pub fn join_time(mut self, enable: bool) -> Self {
        self.join_time = Some(enable);
        self
    }

    /// Add the `lang` param.
    pub fn join_locale(mut self, enable: bool) -> Self {
        self.join_locale = Some(enable);
        self
    }

    /// Return the raw response instead of the unwrapped envelope.
    pub fn native_response(mut self, enable: bool) -> Self {
        self.is_return_native_response = Some(enable);
        self
    }

    /// Set how failures are shown.
    pub fn error_message_mode(mut self, mode: ErrorMessageMode) -> Self {
        self.error_message_mode = Some(mode);
        self
    }

    /// Skip in-flight de-duplication.
    pub fn ignore_deduplication(mut self, enable: bool) -> Self {
        self.ignore_deduplication = Some(enable);
        self
    }

    /// Attach the access token.
    pub fn with_credential(mut self, enable: bool) -> Self {
        self.with_credential = Some(enable);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_overrides() {
        let defaults = CallOptions::default();
        let merged = defaults.merge(
            &CallOverrides::new()
                .join_time(false)
                .error_message_mode(ErrorMessageMode::Modal),
        );

        assert!(!merged.join_time);
        assert_eq!(merged.error_message_mode, ErrorMessageMode::Modal);
        assert_eq!(merged.format_date, defaults.format_date);
        assert_eq!(merged.with_credential, defaults.with_credential);
    }

    #[test]
    fn test_merge_empty_is_identity() {
        let defaults = CallOptions {
            join_locale: true,
            ..Default::default()
        };
        assert_eq!(defaults.merge(&CallOverrides::default()), defaults);
    }

    #[test]
    fn test_mode_aliases() {
        let mode: ErrorMessageMode = serde_json::from_str("\"silent\"").unwrap();
        assert_eq!(mode, ErrorMessageMode::None);
        let mode: ErrorMessageMode = serde_json::from_str("\"inline\"").unwrap();
        assert_eq!(mode, ErrorMessageMode::Message);
        let mode: ErrorMessageMode = serde_json::from_str("\"modal\"").unwrap();
        assert_eq!(mode, ErrorMessageMode::Modal);
    }

    #[test]
    fn test_overrides_from_json() {
        let overrides: CallOverrides =
            serde_json::from_str(r#"{"joinTime": false, "errMsgMode": "none"}"#).unwrap();
        assert_eq!(overrides.join_time, Some(false));
        assert_eq!(overrides.error_message_mode, Some(ErrorMessageMode::None));
        assert_eq!(overrides.format_date, None);
    }
}
