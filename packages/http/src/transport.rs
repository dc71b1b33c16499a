//! The seam between request building and the network.
//!
//! [`Client`](crate::Client) hands finalized [`HttpRequest`]s to a
//! [`Transport`]; tests swap in [`mock::MockTransport`] to avoid real
//! network calls.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::multipart;
use url::Url;

use crate::body::EncodedBody;
use crate::error::{Error, Result};
use crate::form::{Form, FormValue};
use crate::types::{HttpRequest, HttpResponse};

/// Sends a finalized request and collects the full response.
///
/// Non-2xx statuses are not errors at this level; only failures to
/// complete the exchange are.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create with default timeout of 30 seconds.
    pub fn with_default_timeout() -> Result<Self> {
        Self::new(Duration::from_secs(30))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        request.normalize_headers();
        let url = Url::parse(&request.url)?;
        let multipart = matches!(request.body, EncodedBody::Multipart(_));

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::try_from(name.as_str())?;
            // reqwest writes its own content type carrying the boundary
            if multipart && name == CONTENT_TYPE {
                continue;
            }
            headers.insert(name, HeaderValue::try_from(value.as_str())?);
        }

        let mut builder = self
            .client
            .request(request.method.into(), url)
            .headers(headers);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        builder = match request.body {
            EncodedBody::None => builder,
            EncodedBody::Bytes(bytes) => builder.body(bytes),
            EncodedBody::Multipart(form) => builder.multipart(to_multipart(form)?),
        };

        let response = builder.send().await?;

        let status = response.status();
        let mut response_headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                response_headers.insert(name.as_str().to_string(), v.to_string());
            }
        }
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
            headers: response_headers,
            body,
        })
    }
}

fn to_multipart(form: Form) -> Result<multipart::Form> {
    let mut out = multipart::Form::new();
    for field in form.into_fields() {
        let part = match field.value {
            FormValue::Text(text) => multipart::Part::text(text),
            FormValue::File {
                bytes,
                file_name,
                content_type,
            } => {
                let mut part = multipart::Part::bytes(bytes.to_vec());
                if let Some(file_name) = file_name {
                    part = part.file_name(file_name);
                }
                if let Some(content_type) = content_type {
                    part = part.mime_str(&content_type)?;
                }
                part
            }
        };
        out = out.part(field.name, part);
    }
    Ok(out)
}
