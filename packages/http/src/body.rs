//! Request bodies and content typing.

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::form::Form;

const CONTENT_TYPE: &str = "content-type";

/// A request body before encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    #[default]
    Empty,
    /// Objects and arrays are sent as JSON; scalars as their plain text
    Json(Value),
    Text(String),
    Multipart(Form),
    /// Wrapped into a multipart form on send
    Binary {
        bytes: Bytes,
        file_name: Option<String>,
    },
    /// Pre-serialized bytes, sent unchanged
    Raw(Bytes),
}

impl Body {
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }

    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Body::Binary {
            bytes: bytes.into(),
            file_name: None,
        }
    }

    pub fn file(bytes: impl Into<Bytes>, file_name: impl Into<String>) -> Self {
        Body::Binary {
            bytes: bytes.into(),
            file_name: Some(file_name.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<Form> for Body {
    fn from(form: Form) -> Self {
        Body::Multipart(form)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Raw(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Raw(Bytes::from(bytes))
    }
}

impl<T: Into<Body>> From<Option<T>> for Body {
    fn from(body: Option<T>) -> Self {
        body.map_or(Body::Empty, Into::into)
    }
}

/// A body as handed to the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EncodedBody {
    #[default]
    None,
    Bytes(Bytes),
    /// The transport is responsible for the boundary.
    Multipart(Form),
}

impl EncodedBody {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            EncodedBody::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Encode `body`, setting the content type in `headers` where the body
/// implies one.
pub fn encode_body(body: Body, headers: &mut HashMap<String, String>) -> Result<EncodedBody> {
    let encoded = match body {
        Body::Empty | Body::Json(Value::Null) => EncodedBody::None,
        Body::Multipart(form) => {
            headers.insert(CONTENT_TYPE.to_string(), "multipart/form-data".to_string());
            EncodedBody::Multipart(form)
        }
        Body::Binary { bytes, file_name } => {
            headers.insert(CONTENT_TYPE.to_string(), "multipart/form-data".to_string());
            let mut form = Form::new().with_file("content", bytes, file_name.clone());
            if let Some(name) = file_name {
                form = form.with_text("fileName", name);
            }
            EncodedBody::Multipart(form)
        }
        Body::Json(value @ (Value::Object(_) | Value::Array(_))) => {
            headers.insert(CONTENT_TYPE.to_string(), "application/json".to_string());
            EncodedBody::Bytes(Bytes::from(serde_json::to_vec(&value)?))
        }
        Body::Json(Value::String(text)) | Body::Text(text) => EncodedBody::Bytes(Bytes::from(text)),
        Body::Json(scalar) => EncodedBody::Bytes(Bytes::from(scalar.to_string())),
        Body::Raw(bytes) => EncodedBody::Bytes(bytes),
    };
    Ok(encoded)
}
