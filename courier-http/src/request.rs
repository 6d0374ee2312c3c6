//! Request descriptors and their transport form.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, header};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::{FORM_URLENCODED, JSON};
use crate::options::CallOverrides;
use crate::params;
use crate::upload::MultipartBody;
use crate::{HttpError, Result};

/// A request as the caller describes it.
///
/// Hooks may rewrite every field before the request is encoded. Once
/// encoded into a [`TransportRequest`] it is no longer touched.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, or a path resolved against the configured base URL.
    pub url: String,
    /// Query parameters (a JSON object).
    pub params: Option<Value>,
    /// Body data (a JSON object for form bodies).
    pub data: Option<Value>,
    /// Request headers.
    pub headers: HeaderMap,
    /// Per-call option overrides.
    pub options: CallOverrides,
    pub(crate) multipart: Option<MultipartBody>,
}

impl RequestDescriptor {
    /// Create a descriptor.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: None,
            data: None,
            headers: HeaderMap::new(),
            options: CallOverrides::default(),
            multipart: None,
        }
    }

    /// Create a GET descriptor.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Create a POST descriptor.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Create a PUT descriptor.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    /// Create a DELETE descriptor.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Add a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let params = self
            .params
            .get_or_insert_with(|| Value::Object(Map::new()));
        if let Some(map) = params.as_object_mut() {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Replace the query parameters.
    pub fn params<T: Serialize>(mut self, params: &T) -> Result<Self> {
        self.params = Some(serde_json::to_value(params).map_err(|e| HttpError::Encode(e.to_string()))?);
        Ok(self)
    }

    /// Replace the body data.
    pub fn data<T: Serialize>(mut self, data: &T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data).map_err(|e| HttpError::Encode(e.to_string()))?);
        Ok(self)
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            self.headers.insert(name, value);
        } else {
            tracing::warn!(header = name.as_ref(), "Ignoring invalid header");
        }
        self
    }

    /// Set the content type.
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Set the per-call overrides.
    pub fn options(mut self, options: CallOverrides) -> Self {
        self.options = options;
        self
    }

    /// Check if the body should be sent url-encoded.
    pub fn is_form_urlencoded(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
    }

    pub(crate) fn set_default_content_type(&mut self, content_type: &'static str) {
        if !self.headers.contains_key(header::CONTENT_TYPE) {
            self.headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }

    fn resolve_url(&self, base_url: Option<&str>) -> Result<url::Url> {
        match url::Url::parse(&self.url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = base_url.ok_or_else(|| {
                    HttpError::InvalidUrl(format!("relative URL without base: {}", self.url))
                })?;
                Ok(url::Url::parse(base)?.join(&self.url)?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Encode into the form handed to the transport.
    pub fn into_transport(
        mut self,
        base_url: Option<&str>,
        default_headers: &HeaderMap,
    ) -> Result<TransportRequest> {
        let mut url = self.resolve_url(base_url)?;

        if let Some(query) = &self.params {
            let pairs = params::to_pairs(query);
            if !pairs.is_empty() {
                url.query_pairs_mut().extend_pairs(pairs);
            }
        }

        let mut headers = default_headers.clone();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }

        let body = if let Some(multipart) = self.multipart.take() {
            headers.remove(header::CONTENT_TYPE);
            Body::Multipart(multipart)
        } else {
            match &self.data {
                None => Body::Empty,
                Some(_) if self.method == Method::GET => {
                    tracing::debug!(url = %url, "Dropping body on GET request");
                    Body::Empty
                }
                Some(data) if self.is_form_urlencoded() => {
                    Body::Bytes(Bytes::from(params::to_form(data)))
                }
                Some(data) => {
                    if !headers.contains_key(header::CONTENT_TYPE) {
                        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(JSON));
                    }
                    let bytes =
                        serde_json::to_vec(data).map_err(|e| HttpError::Encode(e.to_string()))?;
                    Body::Bytes(Bytes::from(bytes))
                }
            }
        };

        Ok(TransportRequest {
            method: self.method,
            url,
            headers,
            body,
        })
    }
}

/// Request body as sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// No body.
    Empty,
    /// Encoded bytes.
    Bytes(Bytes),
    /// Multipart form.
    Multipart(MultipartBody),
}

impl Body {
    /// Encoded bytes, if any.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// A fully prepared request.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including query.
    pub url: url::Url,
    /// Headers.
    pub headers: HeaderMap,
    /// Body.
    pub body: Body,
}

impl TransportRequest {
    /// Value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_relative_url() {
        let req = RequestDescriptor::get("/basic-api/demo?keyword=foo")
            .param("page", 2)
            .into_transport(Some("http://localhost:3000"), &HeaderMap::new())
            .unwrap();

        assert_eq!(req.url.path(), "/basic-api/demo");
        assert_eq!(req.query_param("keyword").as_deref(), Some("foo"));
        assert_eq!(req.query_param("page").as_deref(), Some("2"));
        assert_eq!(req.body, Body::Empty);
    }

    #[test]
    fn test_relative_url_without_base_fails() {
        let err = RequestDescriptor::get("/demo")
            .into_transport(None, &HeaderMap::new())
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidUrl(_)));
    }

    #[test]
    fn test_form_body_uses_brackets() {
        let req = RequestDescriptor::post("http://localhost/items")
            .content_type(FORM_URLENCODED)
            .data(&json!({"ids": [1, 2]}))
            .unwrap()
            .into_transport(None, &HeaderMap::new())
            .unwrap();

        assert_eq!(
            req.body.as_bytes().map(|b| b.as_ref()),
            Some(&b"ids%5B%5D=1&ids%5B%5D=2"[..])
        );
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let req = RequestDescriptor::put("http://localhost/items/1")
            .data(&json!({"name": "x"}))
            .unwrap()
            .into_transport(None, &HeaderMap::new())
            .unwrap();

        assert_eq!(req.header("content-type"), Some(JSON));
        assert_eq!(
            req.body.as_bytes().map(|b| b.as_ref()),
            Some(&br#"{"name":"x"}"#[..])
        );
    }

    #[test]
    fn test_get_with_form_content_type_keeps_body_out() {
        let req = RequestDescriptor::get("http://localhost/items")
            .content_type(FORM_URLENCODED)
            .data(&json!({"a": 1}))
            .unwrap()
            .into_transport(None, &HeaderMap::new())
            .unwrap();
        assert_eq!(req.body, Body::Empty);
    }

    #[test]
    fn test_request_headers_override_defaults() {
        let mut defaults = HeaderMap::new();
        defaults.insert("x-client", HeaderValue::from_static("default"));
        let req = RequestDescriptor::get("http://localhost/")
            .header("X-Client", "custom")
            .into_transport(None, &defaults)
            .unwrap();
        assert_eq!(req.header("x-client"), Some("custom"));
    }
}
