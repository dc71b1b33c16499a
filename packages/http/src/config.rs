//! Request configuration and client configuration sources.
//!
//! A [`RequestConfig`] is layered: the verb's method, then the client's
//! resolved configuration, then any scope added with `with_options` /
//! `with_query`, then the per-call overrides. Later layers win.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::body::Body;
use crate::error::Result;
use crate::merge::{merge, MergeOptions};
use crate::query::Query;
use crate::types::{normalize_header_names, HttpRequest, Method, Payload};

/// Maps a decoded response before it is returned (or attached to a
/// [`FetchError`](crate::FetchError)).
pub type Transform = Arc<dyn Fn(Payload) -> BoxFuture<'static, Result<Payload>> + Send + Sync>;

/// Observes and may mutate the finalized request before dispatch.
pub type OnSend =
    Arc<dyn for<'a> Fn(&'a mut HttpRequest) -> BoxFuture<'a, Result<()>> + Send + Sync>;

/// Produces the client configuration on first use.
pub type ConfigProducer = Arc<dyn Fn() -> BoxFuture<'static, Result<ClientInit>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct RequestConfig {
    pub method: Option<Method>,
    pub headers: HashMap<String, String>,
    pub body: Body,
    /// Body used by `post`/`put`/`patch` when no body argument is given
    pub data: Option<Body>,
    pub query: Query,
    pub transform: Option<Transform>,
    /// Debounce window; only applies together with `throttle_key`
    pub throttle: Option<Duration>,
    pub throttle_key: Option<String>,
    pub base_url: Option<String>,
    pub on_send: Option<OnSend>,
    /// Caller cancellation for the whole request
    pub signal: Option<CancellationToken>,
    /// Passed through to the transport
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Flatten an `http::HeaderMap` into plain headers. Values that are not
    /// visible ASCII are skipped.
    pub fn with_header_map(mut self, headers: &http::HeaderMap) -> Self {
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                self.headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Body::json(body)?;
        Ok(self)
    }

    pub fn with_data(mut self, data: impl Into<Body>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<Query>) -> Self {
        self.query.merge(query.into());
        self
    }

    pub fn with_query_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<crate::query::QueryValue>,
    ) -> Self {
        self.query.insert(key, value);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Debounce requests sharing `key`: each new one cancels the previous
    /// and waits `window` before dispatching.
    pub fn with_throttle(mut self, window: Duration, key: impl Into<String>) -> Self {
        self.throttle = Some(window);
        self.throttle_key = Some(key.into());
        self
    }

    pub fn with_throttle_key(mut self, key: impl Into<String>) -> Self {
        self.throttle_key = Some(key.into());
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Payload) -> Payload + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(move |payload| {
            future::ready(Ok(transform(payload))).boxed()
        }));
        self
    }

    pub fn with_async_transform<F, Fut>(mut self, transform: F) -> Self
    where
        F: Fn(Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Payload>> + Send + 'static,
    {
        self.transform = Some(Arc::new(move |payload| transform(payload).boxed()));
        self
    }

    pub fn with_on_send<F>(mut self, on_send: F) -> Self
    where
        F: Fn(&mut HttpRequest) + Send + Sync + 'static,
    {
        self.on_send = Some(Arc::new(move |request| {
            on_send(request);
            future::ready(Ok(())).boxed()
        }));
        self
    }

    /// Install an asynchronous `on_send` hook; dispatch waits for it.
    pub fn with_async_on_send<F>(mut self, on_send: F) -> Self
    where
        F: for<'a> Fn(&'a mut HttpRequest) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.on_send = Some(Arc::new(on_send));
        self
    }

    pub fn with_signal(mut self, signal: CancellationToken) -> Self {
        self.signal = Some(signal);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Layer `over` on top of `self`.
    ///
    /// Fields set in `over` win. Headers and query parameters merge per key,
    /// JSON bodies merge deeply, any other body set in `over` replaces.
    pub fn merge(mut self, over: RequestConfig) -> Self {
        let mut over_headers = over.headers;
        normalize_header_names(&mut self.headers);
        normalize_header_names(&mut over_headers);
        self.headers.extend(over_headers);
        self.query.merge(over.query);
        self.body = match (self.body, over.body) {
            (body, Body::Empty) => body,
            (Body::Json(left), Body::Json(right)) => {
                Body::Json(merge(left, right, MergeOptions::default()))
            }
            (_, body) => body,
        };

        RequestConfig {
            method: over.method.or(self.method),
            headers: self.headers,
            body: self.body,
            data: over.data.or(self.data),
            query: self.query,
            transform: over.transform.or(self.transform),
            throttle: over.throttle.or(self.throttle),
            throttle_key: over.throttle_key.or(self.throttle_key),
            base_url: over.base_url.or(self.base_url),
            on_send: over.on_send.or(self.on_send),
            signal: over.signal.or(self.signal),
            timeout: over.timeout.or(self.timeout),
        }
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("data", &self.data)
            .field("query", &self.query)
            .field("transform", &self.transform.is_some())
            .field("throttle", &self.throttle)
            .field("throttle_key", &self.throttle_key)
            .field("base_url", &self.base_url)
            .field("on_send", &self.on_send.is_some())
            .field("signal", &self.signal)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Declarative client settings, e.g. loaded from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(skip_serializing_if = "Map::is_empty")]
    pub query: Map<String, Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl From<ClientSettings> for RequestConfig {
    fn from(settings: ClientSettings) -> Self {
        let mut config = RequestConfig::new().with_query(settings.query);
        for (name, value) in settings.headers {
            config = config.with_header(name, value);
        }
        config.method = settings.method;
        config.base_url = settings.base_url;
        config.throttle = settings.throttle_ms.map(Duration::from_millis);
        config.throttle_key = settings.throttle_key;
        config.timeout = settings.timeout_ms.map(Duration::from_millis);
        config
    }
}

/// What a configuration producer may yield: a bare base URL or a full
/// configuration.
#[derive(Debug, Clone)]
pub enum ClientInit {
    BaseUrl(String),
    Config(RequestConfig),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawInit {
    BaseUrl(String),
    Settings(ClientSettings),
}

impl ClientInit {
    /// Parse either a JSON string (the base URL) or a [`ClientSettings`]
    /// object.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(match serde_json::from_str(text)? {
            RawInit::BaseUrl(base_url) => ClientInit::BaseUrl(base_url),
            RawInit::Settings(settings) => ClientInit::Config(settings.into()),
        })
    }

    pub fn into_config(self) -> RequestConfig {
        match self {
            ClientInit::BaseUrl(base_url) => RequestConfig::new().with_base_url(base_url),
            ClientInit::Config(config) => config,
        }
    }
}

impl From<&str> for ClientInit {
    fn from(base_url: &str) -> Self {
        ClientInit::BaseUrl(base_url.to_string())
    }
}

impl From<String> for ClientInit {
    fn from(base_url: String) -> Self {
        ClientInit::BaseUrl(base_url)
    }
}

impl From<RequestConfig> for ClientInit {
    fn from(config: RequestConfig) -> Self {
        ClientInit::Config(config)
    }
}

impl From<ClientSettings> for ClientInit {
    fn from(settings: ClientSettings) -> Self {
        ClientInit::Config(settings.into())
    }
}

/// Where a client gets its base configuration from.
#[derive(Clone)]
pub enum ConfigSource {
    Static(RequestConfig),
    /// Invoked at most once, on first use; the result is cached.
    Deferred(ConfigProducer),
}

impl ConfigSource {
    pub fn deferred<F, Fut, I>(produce: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<I>> + Send + 'static,
        I: Into<ClientInit> + 'static,
    {
        ConfigSource::Deferred(Arc::new(move || {
            produce().map(|init| init.map(Into::into)).boxed()
        }))
    }
}

impl fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Static(config) => f.debug_tuple("Static").field(config).finish(),
            ConfigSource::Deferred(_) => f.write_str("Deferred"),
        }
    }
}

impl Default for ConfigSource {
    fn default() -> Self {
        ConfigSource::Static(RequestConfig::default())
    }
}

impl From<ClientInit> for ConfigSource {
    fn from(init: ClientInit) -> Self {
        ConfigSource::Static(init.into_config())
    }
}

impl From<&str> for ConfigSource {
    fn from(base_url: &str) -> Self {
        ClientInit::from(base_url).into()
    }
}

impl From<String> for ConfigSource {
    fn from(base_url: String) -> Self {
        ClientInit::from(base_url).into()
    }
}

impl From<RequestConfig> for ConfigSource {
    fn from(config: RequestConfig) -> Self {
        ConfigSource::Static(config)
    }
}

impl From<ClientSettings> for ConfigSource {
    fn from(settings: ClientSettings) -> Self {
        ClientInit::from(settings).into()
    }
}
