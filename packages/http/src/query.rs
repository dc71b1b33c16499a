//! Query string encoding and decoding.

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Characters left alone by URI component encoding.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Component encoding plus the sub-delimiters it normally lets through.
const QUERY_COMPONENT: &AsciiSet = &COMPONENT
    .add(b'!')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*');

/// Percent-encode a value for use as a query key or value.
///
/// ```rust
/// assert_eq!(dot_http::query::encode("it's (a) *test*!"), "it%27s%20%28a%29%20%2Atest%2A%21");
/// ```
pub fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY_COMPONENT).to_string()
}

/// Percent-encode a path segment using the standard URI component set.
pub fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

/// A single query value.
///
/// `Absent` entries are dropped when encoding, while `Null` entries are
/// emitted with an empty value (`key=`).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Absent,
    Null,
    Date(DateTime<Utc>),
    Value(Value),
}

impl QueryValue {
    fn repr(&self) -> Option<String> {
        match self {
            QueryValue::Absent => None,
            QueryValue::Null => Some(String::new()),
            QueryValue::Date(date) => Some(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
            QueryValue::Value(value) => Some(match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        }
    }
}

impl From<Value> for QueryValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => QueryValue::Null,
            other => QueryValue::Value(other),
        }
    }
}

impl From<DateTime<Utc>> for QueryValue {
    fn from(date: DateTime<Utc>) -> Self {
        QueryValue::Date(date)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Value(Value::String(value.to_string()))
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Value(Value::String(value))
    }
}

macro_rules! query_value_from_json {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for QueryValue {
                fn from(value: $ty) -> Self {
                    QueryValue::Value(Value::from(value))
                }
            }
        )*
    };
}

query_value_from_json!(bool, i32, i64, u32, u64, f64);

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(QueryValue::Null, Into::into)
    }
}

/// An ordered set of query parameters.
///
/// Re-inserting an existing key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    entries: Vec<(String, QueryValue)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<QueryValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&QueryValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Merge `other` into `self`; `other` wins on conflicting keys.
    pub fn merge(&mut self, other: Query) {
        for (key, value) in other.entries {
            self.insert(key, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a query from any record serializing to a JSON object.
    ///
    /// Skipped fields become absent, `None` fields become `key=`.
    pub fn from_serialize<T: Serialize>(record: &T) -> Result<Self> {
        match serde_json::to_value(record)? {
            Value::Object(map) => Ok(map.into()),
            Value::Null => Ok(Query::new()),
            other => Err(Error::Config {
                message: format!("query must serialize to an object, got {}", other),
            }),
        }
    }
}

impl From<Map<String, Value>> for Query {
    fn from(map: Map<String, Value>) -> Self {
        Self {
            entries: map.into_iter().map(|(k, v)| (k, v.into())).collect(),
        }
    }
}

impl<K: Into<String>, V: Into<QueryValue>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Query::new();
        for (key, value) in iter {
            query.insert(key, value);
        }
        query
    }
}

/// Render a query string. Always starts with `?`; an empty query yields `"?"`.
pub fn to_query(query: &Query) -> String {
    let pairs: Vec<String> = query
        .entries
        .iter()
        .filter_map(|(key, value)| value.repr().map(|repr| format!("{}={}", key, encode(&repr))))
        .collect();
    format!("?{}", pairs.join("&"))
}

/// Parse a query string (without the leading `?`) into a JSON object.
///
/// Values are percent-decoded and parsed as JSON where possible, falling
/// back to the decoded string. Keys are never parsed.
pub fn from_query(query: Option<&str>) -> Map<String, Value> {
    let Some(query) = query else {
        return Map::new();
    };

    query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once('=') {
            Some((key, raw)) => {
                let decoded = percent_decode_str(raw).decode_utf8_lossy();
                let value = serde_json::from_str(&decoded)
                    .unwrap_or_else(|_| Value::String(decoded.into_owned()));
                (key.to_string(), value)
            }
            None => (segment.to_string(), Value::Null),
        })
        .collect()
}
