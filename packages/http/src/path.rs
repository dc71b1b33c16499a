//! Chained path building and the verb methods.
//!
//! ```ignore
//! let user: User = client.segment("users").segment(42).get(Query::new()).await?.json()?;
//! ```

use std::fmt;

use crate::body::Body;
use crate::client::Client;
use crate::config::RequestConfig;
use crate::error::Result;
use crate::normalize::fix_up_url;
use crate::query::{encode_component, Query};
use crate::types::{Method, Payload};

/// A request path under construction.
///
/// Each step returns a new builder; the receiver is left untouched, so a
/// shared prefix can be reused.
#[derive(Debug, Clone)]
pub struct PathBuilder {
    client: Client,
    segments: Vec<String>,
}

impl PathBuilder {
    pub(crate) fn new(client: Client) -> Self {
        Self {
            client,
            segments: Vec::new(),
        }
    }

    /// Append one segment, percent-encoded.
    pub fn segment(&self, segment: impl fmt::Display) -> PathBuilder {
        let mut next = self.clone();
        next.segments.push(encode_component(&segment.to_string()));
        next
    }

    pub fn segments<I>(&self, segments: I) -> PathBuilder
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        segments
            .into_iter()
            .fold(self.clone(), |builder, segment| builder.segment(segment))
    }

    /// The joined path, e.g. `users/42`.
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn with_options(&self, options: RequestConfig) -> PathBuilder {
        PathBuilder {
            client: self.client.with_options(options),
            segments: self.segments.clone(),
        }
    }

    pub fn with_query(&self, query: impl Into<Query>) -> PathBuilder {
        PathBuilder {
            client: self.client.with_query(query),
            segments: self.segments.clone(),
        }
    }

    /// The absolute URL of this path, resolving a deferred client
    /// configuration if needed.
    pub async fn url(&self) -> Result<String> {
        let base = self.client.config().await?;
        self.url_against(base)
    }

    /// Like [`url`](Self::url), but `Ok(None)` while a deferred client
    /// configuration is still unresolved.
    pub fn resolved_url(&self) -> Result<Option<String>> {
        self.client
            .resolved_config()
            .map(|base| self.url_against(base))
            .transpose()
    }

    fn url_against(&self, base: &RequestConfig) -> Result<String> {
        let base_url = self
            .client
            .scope()
            .base_url
            .as_deref()
            .or(base.base_url.as_deref());
        fix_up_url(&self.path(), base_url)
    }

    pub async fn get(&self, query: impl Into<Query>) -> Result<Payload> {
        self.get_with(query, RequestConfig::new()).await
    }

    pub async fn get_with(&self, query: impl Into<Query>, options: RequestConfig) -> Result<Payload> {
        self.query_verb(Method::GET, query.into(), options).await
    }

    pub async fn delete(&self, query: impl Into<Query>) -> Result<Payload> {
        self.delete_with(query, RequestConfig::new()).await
    }

    pub async fn delete_with(
        &self,
        query: impl Into<Query>,
        options: RequestConfig,
    ) -> Result<Payload> {
        self.query_verb(Method::DELETE, query.into(), options).await
    }

    pub async fn post(&self, body: impl Into<Body>) -> Result<Payload> {
        self.post_with(body, RequestConfig::new()).await
    }

    pub async fn post_with(&self, body: impl Into<Body>, options: RequestConfig) -> Result<Payload> {
        self.body_verb(Method::POST, body.into(), options).await
    }

    pub async fn put(&self, body: impl Into<Body>) -> Result<Payload> {
        self.put_with(body, RequestConfig::new()).await
    }

    pub async fn put_with(&self, body: impl Into<Body>, options: RequestConfig) -> Result<Payload> {
        self.body_verb(Method::PUT, body.into(), options).await
    }

    pub async fn patch(&self, body: impl Into<Body>) -> Result<Payload> {
        self.patch_with(body, RequestConfig::new()).await
    }

    pub async fn patch_with(
        &self,
        body: impl Into<Body>,
        options: RequestConfig,
    ) -> Result<Payload> {
        self.body_verb(Method::PATCH, body.into(), options).await
    }

    async fn query_verb(
        &self,
        method: Method,
        query: Query,
        options: RequestConfig,
    ) -> Result<Payload> {
        let options = options.with_query(query);
        self.client.execute(method, &self.path(), options).await
    }

    /// Body precedence: the argument, the call's `data`, the call's `body`,
    /// then `data` from the scope or base configuration.
    async fn body_verb(&self, method: Method, body: Body, mut options: RequestConfig) -> Result<Payload> {
        if body.is_empty() {
            if let Some(data) = options.data.take() {
                options.body = data;
            } else if options.body.is_empty() {
                options.body = self.client.data().await?.unwrap_or_default();
            }
        } else {
            options.body = body;
        }
        self.client.execute(method, &self.path(), options).await
    }
}

impl Client {
    /// The URL a request on the root path is sent to.
    pub async fn url(&self) -> Result<String> {
        self.path().url().await
    }
}
