//! Request parameter shaping.
//!
//! Parameters and bodies are `serde_json::Value` trees. Dates travel as
//! RFC 3339 strings (what `chrono` serializes to) and are rewritten to
//! `YYYY-MM-DD HH:mm:ss` when date formatting is on.

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};

/// Output format for date values.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Name of the freshness query parameter.
pub const TIMESTAMP_PARAM: &str = "_t";

/// Name of the locale query parameter.
pub const LOCALE_PARAM: &str = "lang";

fn parse_date(s: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.format(DATE_TIME_FORMAT).to_string());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.format(DATE_TIME_FORMAT).to_string())
}

/// Rewrite date values and trim string leaves, recursively.
///
/// Already formatted values are left as they are, so this is idempotent.
pub fn format_request_date(value: &mut Value) {
    match value {
        Value::String(s) => {
            let trimmed = s.trim().to_string();
            *s = parse_date(&trimmed).unwrap_or(trimmed);
        }
        Value::Object(map) => map.values_mut().for_each(format_request_date),
        Value::Array(items) => items.iter_mut().for_each(format_request_date),
        _ => {}
    }
}

fn params_object(params: &mut Option<Value>) -> Option<&mut Map<String, Value>> {
    let value = params.get_or_insert_with(|| Value::Object(Map::new()));
    value.as_object_mut()
}

/// Add the `_t` freshness parameter.
pub fn join_timestamp(params: &mut Option<Value>, now_millis: i64) {
    match params_object(params) {
        Some(map) => {
            map.insert(TIMESTAMP_PARAM.to_string(), Value::from(now_millis));
        }
        None => tracing::debug!("Params are not an object, skipping timestamp"),
    }
}

/// Add the `lang` parameter. `zh_CN` is sent as `zh`.
pub fn join_locale(params: &mut Option<Value>, locale: &str) {
    let lang = if locale == "zh_CN" { "zh" } else { locale };
    match params_object(params) {
        Some(map) => {
            map.insert(LOCALE_PARAM.to_string(), Value::from(lang));
        }
        None => tracing::debug!("Params are not an object, skipping locale"),
    }
}

/// Join `prefix` onto a relative `path`. Absolute URLs are left alone.
pub fn join_prefix(prefix: &str, path: &str) -> String {
    if prefix.is_empty() || path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}{}", prefix, path)
}

/// Render a scalar as a form value. `None` for nulls.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}[{}]", prefix, key)
                };
                flatten_into(&name, child, out);
            }
        }
        Value::Array(items) => {
            let name = format!("{}[]", prefix);
            for item in items {
                flatten_into(&name, item, out);
            }
        }
        scalar => {
            if let Some(s) = scalar_to_string(scalar) {
                out.push((prefix.to_string(), s));
            }
        }
    }
}

/// Flatten an object into form pairs using bracket notation.
///
/// `{"ids": [1, 2], "page": {"size": 10}}` becomes
/// `ids[]=1`, `ids[]=2`, `page[size]=10`. Nulls are dropped.
pub fn to_pairs(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    match value {
        Value::Object(_) => flatten_into("", value, &mut out),
        Value::Null => {}
        other => tracing::debug!(value = %other, "Cannot flatten non-object params"),
    }
    out
}

/// Serialize an object as `application/x-www-form-urlencoded`.
pub fn to_form(value: &Value) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in to_pairs(value) {
        serializer.append_pair(&k, &v);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_request_date_nested() {
        let mut params = json!({
            "name": "  alice ",
            "range": {
                "start": "2024-03-01T08:30:00+08:00",
                "end": "2024-03-02T09:00:05.250",
            },
            "tags": [" a ", "2024-01-01T00:00:00Z"],
            "count": 3,
        });

        format_request_date(&mut params);

        assert_eq!(
            params,
            json!({
                "name": "alice",
                "range": {
                    "start": "2024-03-01 08:30:00",
                    "end": "2024-03-02 09:00:05",
                },
                "tags": ["a", "2024-01-01 00:00:00"],
                "count": 3,
            })
        );
    }

    #[test]
    fn test_format_request_date_idempotent() {
        let mut params = json!({"at": "2024-03-01T08:30:00Z", "q": " x "});
        format_request_date(&mut params);
        let once = params.clone();
        format_request_date(&mut params);
        assert_eq!(params, once);
    }

    #[test]
    fn test_chrono_values_are_formatted() {
        let at = chrono::DateTime::parse_from_rfc3339("2023-12-31T23:59:59Z").unwrap();
        let mut params = json!({ "at": at });
        format_request_date(&mut params);
        assert_eq!(params["at"], "2023-12-31 23:59:59");
    }

    #[test]
    fn test_join_timestamp_creates_params() {
        let mut params = None;
        join_timestamp(&mut params, 1_700_000_000_000);
        assert_eq!(params, Some(json!({"_t": 1_700_000_000_000i64})));
    }

    #[test]
    fn test_join_locale() {
        let mut params = Some(json!({"q": "x"}));
        join_locale(&mut params, "zh_CN");
        assert_eq!(params.as_ref().unwrap()["lang"], "zh");

        join_locale(&mut params, "en");
        assert_eq!(params.as_ref().unwrap()["lang"], "en");
    }

    #[test]
    fn test_join_prefix() {
        assert_eq!(join_prefix("/basic-api", "/login"), "/basic-api/login");
        assert_eq!(join_prefix("", "/login"), "/login");
        assert_eq!(
            join_prefix("/basic-api", "https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn test_to_form_brackets() {
        let body = json!({"ids": [1, 2], "name": "a b", "page": {"size": 10}, "skip": null});
        assert_eq!(to_form(&body), "ids%5B%5D=1&ids%5B%5D=2&name=a+b&page%5Bsize%5D=10");
    }

    #[test]
    fn test_to_pairs_ignores_scalars() {
        assert!(to_pairs(&json!("text")).is_empty());
        assert!(to_pairs(&Value::Null).is_empty());
    }
}
