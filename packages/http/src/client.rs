//! The client handle: resolved configuration, transport, and throttle
//! registry, shared by every path derived from it.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::body::Body;
use crate::config::{ConfigProducer, ConfigSource, RequestConfig};
use crate::error::{Error, Result};
use crate::path::PathBuilder;
use crate::query::Query;
use crate::throttle::ThrottleRegistry;
use crate::transport::{ReqwestTransport, Transport};

pub(crate) struct Shared {
    producer: Option<ConfigProducer>,
    resolved: OnceCell<RequestConfig>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) throttles: ThrottleRegistry,
}

/// An HTTP client rooted at a base configuration.
///
/// Cloning is cheap; clones and every handle derived through
/// [`with_options`](Client::with_options) share one resolved configuration
/// and one throttle registry.
#[derive(Clone)]
pub struct Client {
    pub(crate) shared: Arc<Shared>,
    pub(crate) scope: RequestConfig,
}

impl Client {
    /// Create a client with the default `reqwest` transport.
    pub fn new(source: impl Into<ConfigSource>) -> Result<Self> {
        Ok(Self::with_transport(
            source,
            Arc::new(ReqwestTransport::with_default_timeout()?),
        ))
    }

    pub fn with_transport(source: impl Into<ConfigSource>, transport: Arc<dyn Transport>) -> Self {
        let (producer, resolved) = match source.into() {
            ConfigSource::Static(config) => (None, OnceCell::new_with(Some(config))),
            ConfigSource::Deferred(producer) => (Some(producer), OnceCell::new()),
        };

        Self {
            shared: Arc::new(Shared {
                producer,
                resolved,
                transport,
                throttles: ThrottleRegistry::new(),
            }),
            scope: RequestConfig::default(),
        }
    }

    /// The client's base configuration, resolving a deferred source on first
    /// call. Concurrent first calls share a single resolution.
    ///
    /// A failed resolution is not cached; the next call retries.
    pub async fn config(&self) -> Result<&RequestConfig> {
        self.shared
            .resolved
            .get_or_try_init(|| async {
                let config = match &self.shared.producer {
                    Some(produce) => produce().await?.into_config(),
                    None => RequestConfig::default(),
                };
                debug!(base_url = ?config.base_url, "client configuration resolved");
                Ok::<_, Error>(config)
            })
            .await
    }

    /// The base configuration if it has already been resolved.
    pub fn resolved_config(&self) -> Option<&RequestConfig> {
        self.shared.resolved.get()
    }

    /// Options layered over the base configuration for every request from
    /// this handle.
    pub fn scope(&self) -> &RequestConfig {
        &self.scope
    }

    /// A builder rooted at the base URL.
    pub fn path(&self) -> PathBuilder {
        PathBuilder::new(self.clone())
    }

    /// Shorthand for `client.path().segment(segment)`.
    pub fn segment(&self, segment: impl fmt::Display) -> PathBuilder {
        self.path().segment(segment)
    }

    /// A handle whose requests carry `options` on top of this handle's.
    pub fn with_options(&self, options: RequestConfig) -> Client {
        Client {
            shared: Arc::clone(&self.shared),
            scope: self.scope.clone().merge(options),
        }
    }

    pub fn with_query(&self, query: impl Into<Query>) -> Client {
        self.with_options(RequestConfig::new().with_query(query))
    }

    /// Fallback body for `post`/`put`/`patch`: the scope's `data`, else the
    /// base configuration's.
    pub(crate) async fn data(&self) -> Result<Option<Body>> {
        if let Some(data) = &self.scope.data {
            return Ok(Some(data.clone()));
        }
        Ok(self.config().await?.data.clone())
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("resolved", &self.shared.resolved.get())
            .field("deferred", &self.shared.producer.is_some())
            .field("scope", &self.scope)
            .finish()
    }
}
