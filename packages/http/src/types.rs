use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::body::EncodedBody;
use crate::error::Result;
use crate::form::Form;

/// HTTP method for requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::PATCH => "PATCH",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET => http::Method::GET,
            Method::POST => http::Method::POST,
            Method::PUT => http::Method::PUT,
            Method::DELETE => http::Method::DELETE,
            Method::PATCH => http::Method::PATCH,
            Method::HEAD => http::Method::HEAD,
            Method::OPTIONS => http::Method::OPTIONS,
        }
    }
}

/// A finalized request, ready for a [`Transport`](crate::Transport).
///
/// This is what `on_send` hooks observe and may mutate. Header names are
/// lowercase.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: Method,

    /// Absolute URL including the query string
    pub url: String,

    pub headers: HashMap<String, String>,

    pub body: EncodedBody,

    /// Transport-level timeout for this request only
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Lowercase header names inserted directly into `headers`.
    pub fn normalize_headers(&mut self) {
        normalize_header_names(&mut self.headers);
    }
}

/// Lowercase every header name in place.
///
/// An entry whose name was not already lowercase replaces the lowercase
/// entry it collides with.
pub fn normalize_header_names(headers: &mut HashMap<String, String>) {
    let mut raw: Vec<String> = headers
        .keys()
        .filter(|name| name.bytes().any(|b| b.is_ascii_uppercase()))
        .cloned()
        .collect();
    raw.sort();

    for name in raw {
        if let Some(value) = headers.remove(&name) {
            headers.insert(name.to_ascii_lowercase(), value);
        }
    }
}

/// HTTP response as returned by a transport
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,

    /// Status text (e.g., "OK", "Not Found")
    pub status_text: String,

    /// Response headers, keyed by lowercase name
    pub headers: HashMap<String, String>,

    /// Raw body bytes
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: HashMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Check if the response status indicates success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if the response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn blob(&self) -> Bytes {
        self.body.clone()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON. An empty body reads as `null`.
    pub fn json(&self) -> Result<serde_json::Value> {
        if self.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn form_data(&self) -> Result<Form> {
        Form::parse(self.content_type().unwrap_or_default(), &self.body)
    }

    /// Decode the body according to the declared content type.
    pub fn decode(&self) -> Result<Payload> {
        let content_type = self.content_type().unwrap_or_default();

        if content_type == "application/octet-stream" {
            Ok(Payload::Binary(self.blob()))
        } else if content_type.contains("application/json") {
            Ok(Payload::Json(self.json()?))
        } else if content_type.contains("multipart/form-data") {
            Ok(Payload::Form(self.form_data()?))
        } else {
            Ok(Payload::Text(self.text()))
        }
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Binary(Bytes),
    Json(serde_json::Value),
    Form(Form),
    Text(String),
}

impl Payload {
    /// Deserialize a JSON payload into a specific type.
    ///
    /// Text payloads are parsed as JSON first, so servers that omit the
    /// content type still work.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        match self {
            Payload::Json(value) => Ok(serde_json::from_value(value.clone())?),
            Payload::Text(text) => Ok(serde_json::from_str(text)?),
            Payload::Binary(bytes) => Ok(serde_json::from_slice(bytes)?),
            Payload::Form(_) => Err(crate::Error::Config {
                message: "form payload cannot be read as JSON".to_string(),
            }),
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&Form> {
        match self {
            Payload::Form(form) => Some(form),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Payload::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}
