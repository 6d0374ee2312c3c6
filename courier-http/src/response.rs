//! HTTP response wrapper and call outcomes.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{HttpError, Result};

/// HTTP response wrapper.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: url::Url,
}

impl Response {
    /// Create a response from its parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>, url: url::Url) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            url,
        }
    }

    /// Create a response from a reqwest response.
    pub(crate) async fn from_reqwest(response: reqwest::Response) -> std::result::Result<Self, reqwest::Error> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        Ok(Self {
            status,
            headers,
            body,
            url,
        })
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the response URL.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Get the response body as bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Get the response body as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec()).map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Text describing a failed response.
    ///
    /// JSON bodies are rendered compactly, a `message` field wins if present.
    pub fn error_message(&self) -> String {
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(Value::Object(map)) => {
                if let Some(Value::String(m)) = map.get("message") {
                    return m.clone();
                }
                Value::Object(map).to_string()
            }
            Ok(Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(_) => String::from_utf8_lossy(&self.body).into_owned(),
        }
    }

    /// Decode the `{code, message, data}` envelope, returning `data`.
    ///
    /// Bodies that are not envelopes are returned whole; an empty body is
    /// `null`.
    pub fn unwrap_envelope(&self) -> Result<Value> {
        if self.body.is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_slice(&self.body)?;
        match value {
            Value::Object(mut map) if map.contains_key("code") && map.contains_key("data") => {
                Ok(map.remove("data").unwrap_or(Value::Null))
            }
            other => Ok(other),
        }
    }
}

/// Successful result of a call.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Decoded response data.
    Data(Value),
    /// The raw response.
    Native(Response),
}

impl Payload {
    /// Decoded data, if this is not a raw response.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Data(v) => Some(v),
            Self::Native(_) => None,
        }
    }

    /// The raw response, if requested.
    pub fn native(&self) -> Option<&Response> {
        match self {
            Self::Native(r) => Some(r),
            Self::Data(_) => None,
        }
    }

    /// Deserialize the payload.
    ///
    /// Raw responses are unwrapped first.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        let value = match self {
            Self::Data(v) => v,
            Self::Native(r) => r.unwrap_envelope()?,
        };
        Ok(serde_json::from_value(value)?)
    }
}

/// How a call settled.
///
/// Aborted and superseded calls are not errors: the caller can match on
/// them when it cares, and otherwise treat them as "nothing happened".
#[derive(Debug, Clone)]
#[must_use]
pub enum Outcome<T> {
    /// The call completed.
    Completed(T),
    /// A pre-process hook abandoned the call.
    Aborted,
    /// A newer identical request replaced this one.
    Superseded,
}

impl<T> Outcome<T> {
    /// Check if the call completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Check if the call was abandoned by a hook.
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Check if the call was replaced by a newer duplicate.
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }

    /// The completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(v) => Some(v),
            _ => None,
        }
    }

    /// Map the completed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Completed(v) => Outcome::Completed(f(v)),
            Self::Aborted => Outcome::Aborted,
            Self::Superseded => Outcome::Superseded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(status: u16, body: &str) -> Response {
        Response::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body.to_string(),
            url::Url::parse("http://localhost/x").unwrap(),
        )
    }

    #[test]
    fn test_unwrap_envelope() {
        let r = response(200, r#"{"code":0,"message":"ok","data":{"id":7}}"#);
        assert_eq!(r.unwrap_envelope().unwrap(), json!({"id": 7}));
    }

    #[test]
    fn test_non_envelope_passes_through() {
        let r = response(200, r#"{"accessToken":"a","expiresIn":3600}"#);
        assert_eq!(r.unwrap_envelope().unwrap()["expiresIn"], 3600);
        assert_eq!(response(200, "").unwrap_envelope().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_message() {
        assert_eq!(response(400, r#"{"message":"bad"}"#).error_message(), "bad");
        assert_eq!(response(500, "oops").error_message(), "oops");
        assert_eq!(response(400, r#"{"field":"x"}"#).error_message(), r#"{"field":"x"}"#);
    }

    #[test]
    fn test_outcome_map() {
        let o: Outcome<u8> = Outcome::Completed(1);
        assert_eq!(o.map(|v| v + 1).completed(), Some(2));
        assert!(Outcome::<u8>::Superseded.map(|v| v + 1).is_superseded());
    }

    #[test]
    fn test_payload_into_json() {
        #[derive(serde::Deserialize)]
        struct Item {
            id: u32,
        }
        let item: Item = Payload::Data(json!({"id": 3})).into_json().unwrap();
        assert_eq!(item.id, 3);

        let native = Payload::Native(response(200, r#"{"code":0,"data":{"id":4}}"#));
        let item: Item = native.into_json().unwrap();
        assert_eq!(item.id, 4);
    }
}
