//! # dot-http
//!
//! A path-building HTTP client.
//!
//! Requests are expressed by chaining path segments off a [`Client`] and
//! finishing with a verb:
//!
//! ```ignore
//! use dot_http::{Client, Query, RequestConfig};
//!
//! let client = Client::new("https://api.example.com")?;
//!
//! // GET https://api.example.com/users/42?expand=true
//! let user: User = client
//!     .segment("users")
//!     .segment(42)
//!     .get(Query::new().with("expand", true))
//!     .await?
//!     .json()?;
//!
//! // POST a JSON body
//! client.segment("users").post(serde_json::json!({"name": "Ada"})).await?;
//! ```
//!
//! ## Configuration
//!
//! A client is created from a [`ConfigSource`]: a base URL, a full
//! [`RequestConfig`], declarative [`ClientSettings`], or an async producer
//! resolved once on first use:
//!
//! ```ignore
//! let client = Client::new(ConfigSource::deferred(|| async {
//!     Ok(load_settings().await?.base_url)
//! }))?;
//! ```
//!
//! ## Throttling
//!
//! Requests carrying both a `throttle` window and a `throttle_key` are
//! debounced per key: each new request cancels the previous one still
//! pending or in flight, and waits out the window before dispatching.
//!
//! ```ignore
//! let search = client.with_options(
//!     RequestConfig::new().with_throttle(Duration::from_millis(300), "search"),
//! );
//! ```

pub mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod form;
pub mod merge;
pub mod normalize;
pub mod path;
pub mod query;
pub mod throttle;
pub mod transport;
pub mod types;

pub use body::{Body, EncodedBody};
pub use client::Client;
pub use config::{ClientInit, ClientSettings, ConfigSource, RequestConfig};
pub use error::{Error, FetchError, Result};
pub use form::{Form, FormField, FormValue};
pub use merge::{merge, MergeOptions};
pub use path::PathBuilder;
pub use query::{from_query, to_query, Query, QueryValue};
pub use throttle::ThrottleRegistry;
pub use transport::{ReqwestTransport, Transport};
pub use types::{HttpRequest, HttpResponse, Method, Payload};
