//! Multipart file uploads.

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::params::scalar_to_string;

/// One field of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: PartValue,
}

/// Value of a multipart field.
#[derive(Debug, Clone, PartialEq)]
pub enum PartValue {
    /// Text field.
    Text(String),
    /// Binary file field.
    File {
        /// File name sent with the part.
        filename: Option<String>,
        /// MIME type of the file.
        content_type: Option<String>,
        /// File contents.
        bytes: Bytes,
    },
}

/// A `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartBody {
    parts: Vec<Part>,
}

impl MultipartBody {
    /// Empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text field.
    pub fn text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push(Part {
            name: name.into(),
            value: PartValue::Text(value.into()),
        });
    }

    /// Append a file field.
    pub fn file(
        &mut self,
        name: impl Into<String>,
        bytes: Bytes,
        filename: Option<String>,
        content_type: Option<String>,
    ) {
        self.parts.push(Part {
            name: name.into(),
            value: PartValue::File {
                filename,
                content_type,
                bytes,
            },
        });
    }

    /// Fields in order.
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Text values of every field named `name`.
    pub fn texts(&self, name: &str) -> Vec<&str> {
        self.parts
            .iter()
            .filter(|p| p.name == name)
            .filter_map(|p| match &p.value {
                PartValue::Text(t) => Some(t.as_str()),
                PartValue::File { .. } => None,
            })
            .collect()
    }

    /// Convert into a reqwest form.
    pub(crate) fn into_reqwest(self) -> reqwest::multipart::Form {
        let mut form = reqwest::multipart::Form::new();
        for part in self.parts {
            form = match part.value {
                PartValue::Text(text) => form.text(part.name, text),
                PartValue::File {
                    filename,
                    content_type,
                    bytes,
                } => {
                    let file = file_part(&bytes, filename.clone());
                    let file = match content_type {
                        Some(content_type) => match file.mime_str(&content_type) {
                            Ok(file) => file,
                            Err(e) => {
                                tracing::warn!(error = %e, content_type, "Ignoring invalid file MIME type");
                                file_part(&bytes, filename)
                            }
                        },
                        None => file,
                    };
                    form.part(part.name, file)
                }
            };
        }
        form
    }
}

fn file_part(bytes: &Bytes, filename: Option<String>) -> reqwest::multipart::Part {
    let part = reqwest::multipart::Part::bytes(bytes.to_vec());
    match filename {
        Some(filename) => part.file_name(filename),
        None => part,
    }
}

/// Parameters of a file upload.
#[derive(Debug, Clone)]
pub struct UploadFileParams {
    /// Structured fields sent alongside the file.
    pub data: Option<Map<String, Value>>,
    /// Name of the file field (default `file`).
    pub name: Option<String>,
    /// File contents.
    pub file: Bytes,
    /// File name.
    pub filename: Option<String>,
    /// MIME type of the file.
    pub content_type: Option<String>,
    /// Extra scalar fields appended after the file.
    pub extra: Vec<(String, String)>,
}

impl UploadFileParams {
    /// Upload `file` under the default field name.
    pub fn new(file: impl Into<Bytes>) -> Self {
        Self {
            data: None,
            name: None,
            file: file.into(),
            filename: None,
            content_type: None,
            extra: Vec::new(),
        }
    }

    /// Set the structured fields.
    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the file field name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the file name.
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the file MIME type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add an extra scalar field.
    pub fn extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// Build the multipart body.
    ///
    /// Scalars are appended as-is, arrays once per element as `field[]`,
    /// then the file part, then the extra fields.
    pub fn into_multipart(self) -> MultipartBody {
        let mut body = MultipartBody::new();

        if let Some(data) = &self.data {
            for (key, value) in data {
                match value {
                    Value::Array(items) => {
                        let name = format!("{}[]", key);
                        for item in items {
                            body.text(name.clone(), scalar_to_string(item).unwrap_or_default());
                        }
                    }
                    other => body.text(key.clone(), scalar_to_string(other).unwrap_or_default()),
                }
            }
        }

        body.file(
            self.name.unwrap_or_else(|| "file".to_string()),
            self.file,
            self.filename,
            self.content_type,
        );

        for (name, value) in self.extra {
            body.text(name, value);
        }

        body
    }
}
