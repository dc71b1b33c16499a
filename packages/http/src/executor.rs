//! Request execution: option layering, URL building, body encoding,
//! dispatch, and response decoding.

use tracing::{debug, trace};

use crate::body::encode_body;
use crate::client::Client;
use crate::config::RequestConfig;
use crate::error::{FetchError, Result};
use crate::normalize::fix_up_url;
use crate::query::to_query;
use crate::throttle::cancellable;
use crate::types::{normalize_header_names, HttpRequest, Method, Payload};

impl Client {
    /// Execute one request against `path`.
    ///
    /// Options are layered as `method`, base configuration, this handle's
    /// scope, then `call`; a method set in a lower layer is ignored in favor
    /// of `method`, while one set in the base configuration or scope wins.
    ///
    /// Resolves to the decoded (and transformed) body on a 2xx response, and
    /// fails with [`FetchError`] otherwise.
    pub async fn execute(&self, method: Method, path: &str, call: RequestConfig) -> Result<Payload> {
        let base = self.config().await?.clone();

        let call = RequestConfig {
            method: None,
            ..call
        };
        let config = RequestConfig::new()
            .with_method(method)
            .merge(base)
            .merge(self.scope.clone())
            .merge(call);

        let RequestConfig {
            method,
            mut headers,
            body,
            query,
            transform,
            throttle,
            throttle_key,
            base_url,
            on_send,
            signal,
            timeout,
            ..
        } = config;

        let query = to_query(&query);
        let path = if query == "?" {
            path.to_string()
        } else {
            format!("{}{}", path, query)
        };
        let url = fix_up_url(&path, base_url.as_deref())?;
        normalize_header_names(&mut headers);
        let body = encode_body(body, &mut headers)?;

        let mut request = HttpRequest {
            method: method.unwrap_or_default(),
            url,
            headers,
            body,
            timeout,
        };

        if let Some(on_send) = &on_send {
            on_send(&mut request).await?;
            request.normalize_headers();
        }

        debug!(method = %request.method, url = %request.url, "sending request");

        let transport = &self.shared.transport;
        let response = match (throttle, throttle_key.as_deref()) {
            (Some(delay), Some(key)) => {
                trace!(key, "dispatching through throttle");
                self.shared
                    .throttles
                    .run(key, delay, signal.as_ref(), transport.perform(request))
                    .await?
            }
            _ => match &signal {
                Some(signal) => cancellable(signal, transport.perform(request)).await?,
                None => transport.perform(request).await?,
            },
        };

        // error statuses always surface as FetchError, even with a body
        // that contradicts its declared content type
        let mut payload = match response.decode() {
            Ok(payload) => payload,
            Err(err) if response.is_success() => return Err(err),
            Err(err) => {
                debug!(status = response.status, error = %err, "undecodable error body");
                Payload::Text(response.text())
            }
        };
        if let Some(transform) = &transform {
            payload = transform(payload).await?;
        }

        if response.is_success() {
            Ok(payload)
        } else {
            debug!(status = response.status, "request failed");
            Err(FetchError {
                code: response.status,
                message: response.status_text,
                description: payload,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use crate::body::{Body, EncodedBody};
    use crate::client::Client;
    use crate::config::RequestConfig;
    use crate::error::Error;
    use crate::query::{Query, QueryValue};
    use crate::transport::mock::MockTransport;
    use crate::types::{HttpResponse, Method, Payload};

    fn client_with(transport: &MockTransport, base: RequestConfig) -> Client {
        Client::with_transport(base, Arc::new(transport.clone()))
    }

    fn base() -> RequestConfig {
        RequestConfig::new().with_base_url("https://host")
    }

    #[tokio::test]
    async fn builds_url_from_base_and_query() {
        let transport = MockTransport::new()
            .with_default_response(MockTransport::json_response(200, json!({"ok": true})));
        let client = client_with(&transport, base());

        let date = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let call = RequestConfig::new().with_query(
            Query::new()
                .with("q", "a b")
                .with("since", date)
                .with("skip", QueryValue::Absent)
                .with("empty", None::<i64>),
        );
        let payload = client.execute(Method::GET, "/items", call).await.unwrap();
        assert_eq!(payload, Payload::Json(json!({"ok": true})));

        let request = &transport.recorded_requests()[0];
        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.url,
            "https://host/items?q=a%20b&since=2024-01-02T03%3A04%3A05.000Z&empty="
        );
    }

    #[tokio::test]
    async fn empty_query_adds_no_question_mark() {
        let transport = MockTransport::new();
        let client = client_with(&transport, base());
        let _ = client.execute(Method::GET, "a", RequestConfig::new()).await;
        assert_eq!(transport.recorded_requests()[0].url, "https://host/a");
    }

    #[tokio::test]
    async fn json_bodies_set_content_type() {
        let transport = MockTransport::new()
            .with_default_response(MockTransport::json_response(201, json!({"id": 1})));
        let client = client_with(&transport, base());

        let call = RequestConfig::new().with_body(json!({"title": "t"}));
        client.execute(Method::POST, "/posts", call).await.unwrap();

        let request = &transport.recorded_requests()[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(
            request.body,
            EncodedBody::Bytes(Bytes::from_static(br#"{"title":"t"}"#))
        );
    }

    #[tokio::test]
    async fn non_success_becomes_fetch_error() {
        let transport = MockTransport::new().with_default_response(MockTransport::json_response(
            422,
            json!({"error": "invalid"}),
        ));
        let client = client_with(&transport, base());

        let err = client
            .execute(Method::PUT, "/x", RequestConfig::new().with_body(Body::from("v")))
            .await
            .unwrap_err();
        let fetch = err.as_fetch().unwrap();
        assert_eq!(fetch.code, 422);
        assert_eq!(fetch.message, "Unprocessable Entity");
        assert_eq!(fetch.description, Payload::Json(json!({"error": "invalid"})));
        assert_eq!(err.to_string(), "HTTP 422 Unprocessable Entity");
    }

    #[tokio::test]
    async fn text_error_body_is_kept() {
        let transport = MockTransport::new();
        let client = client_with(&transport, base());

        let err = client
            .execute(Method::GET, "/missing", RequestConfig::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(
            err.as_fetch().unwrap().description,
            Payload::Text("Not Found".to_string())
        );
    }

    #[tokio::test]
    async fn undecodable_error_body_still_carries_status() {
        let transport = MockTransport::new().with_default_response(
            HttpResponse::new(502, "Bad Gateway")
                .with_header("content-type", "application/json")
                .with_body("<html>bad gateway</html>"),
        );
        let client = client_with(&transport, base());

        let err = client
            .execute(Method::GET, "/x", RequestConfig::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
        let fetch = err.as_fetch().unwrap();
        assert_eq!(fetch.message, "Bad Gateway");
        assert_eq!(
            fetch.description,
            Payload::Text("<html>bad gateway</html>".to_string())
        );
    }

    #[tokio::test]
    async fn undecodable_success_body_is_an_error() {
        let transport = MockTransport::new().with_default_response(
            HttpResponse::new(200, "OK")
                .with_header("content-type", "application/json")
                .with_body("not json"),
        );
        let client = client_with(&transport, base());

        let err = client
            .execute(Method::GET, "/x", RequestConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[tokio::test]
    async fn raw_header_names_are_lowercased_before_encoding() {
        let transport = MockTransport::new();
        let client = client_with(&transport, base());

        let mut call = RequestConfig::new().with_body(json!({"a": 1}));
        call.headers
            .insert("Content-Type".to_string(), "text/plain".to_string());
        call.headers.insert("X-Raw".to_string(), "1".to_string());
        let _ = client.execute(Method::POST, "/x", call).await;

        let request = &transport.recorded_requests()[0];
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.headers.get("x-raw").map(String::as_str), Some("1"));
        assert!(request.headers.keys().all(|name| *name == name.to_ascii_lowercase()));
    }

    #[tokio::test]
    async fn on_send_raw_header_overrides_encoded_one() {
        let transport = MockTransport::new();
        let client = client_with(&transport, base());

        let call = RequestConfig::new()
            .with_body(json!({"a": 1}))
            .with_on_send(|request| {
                request
                    .headers
                    .insert("Content-Type".to_string(), "text/csv".to_string());
            });
        let _ = client.execute(Method::POST, "/x", call).await;

        let request = &transport.recorded_requests()[0];
        assert_eq!(request.headers.len(), 1);
        assert_eq!(
            request.headers.get("content-type").map(String::as_str),
            Some("text/csv")
        );
    }

    #[tokio::test]
    async fn base_method_overrides_verb() {
        let transport = MockTransport::new();
        let client = client_with(&transport, base().with_method(Method::POST));
        let _ = client
            .execute(
                Method::GET,
                "/x",
                RequestConfig::new().with_method(Method::DELETE),
            )
            .await;
        assert_eq!(transport.recorded_requests()[0].method, Method::POST);
    }

    #[tokio::test]
    async fn call_options_win_over_base() {
        let transport = MockTransport::new();
        let base = base()
            .with_header("authorization", "a")
            .with_header("accept", "json");
        let client = client_with(&transport, base);

        let call = RequestConfig::new()
            .with_header("Authorization", "b")
            .with_base_url("https://other");
        let _ = client.execute(Method::GET, "/x", call).await;

        let request = &transport.recorded_requests()[0];
        assert_eq!(request.url, "https://other/x");
        assert_eq!(request.header("authorization"), Some("b"));
        assert_eq!(request.header("accept"), Some("json"));
    }

    #[tokio::test]
    async fn transform_applies_to_success_and_error() {
        let transport = MockTransport::new()
            .with_response("https://host/ok", MockTransport::text_response(200, "ok"))
            .with_response("https://host/bad", MockTransport::text_response(500, "bad"));
        let client = client_with(
            &transport,
            base().with_transform(|payload| match payload {
                Payload::Text(text) => Payload::Text(format!("<{}>", text)),
                other => other,
            }),
        );

        let ok = client
            .execute(Method::GET, "ok", RequestConfig::new())
            .await
            .unwrap();
        assert_eq!(ok, Payload::Text("<ok>".to_string()));

        let err = client
            .execute(Method::GET, "bad", RequestConfig::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.as_fetch().unwrap().description,
            Payload::Text("<bad>".to_string())
        );
    }

    #[tokio::test]
    async fn on_send_sees_final_request() {
        let transport = MockTransport::new();
        let client = client_with(&transport, base());

        let call = RequestConfig::new()
            .with_query_param("a", 1)
            .with_on_send(|request| {
                assert_eq!(request.url, "https://host/x?a=1");
                request.set_header("x-signed", "1");
            });
        let _ = client.execute(Method::GET, "/x", call).await;

        assert_eq!(
            transport.recorded_requests()[0].header("x-signed"),
            Some("1")
        );
    }

    #[tokio::test]
    async fn failing_on_send_aborts_dispatch() {
        let transport = MockTransport::new();
        let client = client_with(&transport, base());

        let call = RequestConfig::new().with_async_on_send(|_request| {
            Box::pin(async {
                Err::<(), _>(Error::Config {
                    message: "no token".to_string(),
                })
            })
        });
        let err = client.execute(Method::GET, "/x", call).await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(transport.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn relative_path_without_base_fails() {
        let transport = MockTransport::new();
        let client = client_with(&transport, RequestConfig::new());
        let err = client
            .execute(Method::GET, "x", RequestConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingBaseUrl { .. }));
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let transport = MockTransport::new().fail_with("connection refused");
        let client = client_with(&transport, base());
        let err = client
            .execute(Method::GET, "/x", RequestConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_burst_sends_once() {
        let transport = MockTransport::new()
            .with_default_response(MockTransport::json_response(200, json!([])));
        let client = client_with(
            &transport,
            base().with_throttle(Duration::from_millis(300), "search"),
        );

        let (first, second, third) = tokio::join!(
            client.execute(Method::GET, "/s", RequestConfig::new().with_query_param("q", "a")),
            client.execute(Method::GET, "/s", RequestConfig::new().with_query_param("q", "ab")),
            client.execute(Method::GET, "/s", RequestConfig::new().with_query_param("q", "abc")),
        );

        assert!(first.unwrap_err().is_cancelled());
        assert!(second.unwrap_err().is_cancelled());
        assert_eq!(third.unwrap(), Payload::Json(json!([])));

        let recorded = transport.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].url, "https://host/s?q=abc");
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_without_key_is_direct() {
        let transport = MockTransport::new();
        let mut config = base();
        config.throttle = Some(Duration::from_secs(1));
        let client = client_with(&transport, config);

        let start = tokio::time::Instant::now();
        let _ = client.execute(Method::GET, "/x", RequestConfig::new()).await;
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.recorded_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn signal_cancels_in_flight_request() {
        let transport = MockTransport::new().with_latency(Duration::from_secs(10));
        let client = client_with(&transport, base());
        let signal = CancellationToken::new();

        let call = RequestConfig::new().with_signal(signal.clone());
        let cancel = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            signal.cancel();
        };
        let (result, _) = tokio::join!(client.execute(Method::GET, "/slow", call), cancel);

        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn signal_cancels_throttled_wait() {
        let transport = MockTransport::new();
        let client = client_with(
            &transport,
            base().with_throttle(Duration::from_secs(1), "k"),
        );
        let signal = CancellationToken::new();
        signal.cancel();

        let err = client
            .execute(Method::GET, "/x", RequestConfig::new().with_signal(signal))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(transport.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn timeout_reaches_transport() {
        let transport = MockTransport::new()
            .with_default_response(HttpResponse::new(204, "No Content"));
        let client = client_with(&transport, base().with_timeout(Duration::from_secs(3)));
        client
            .execute(Method::DELETE, "/x", RequestConfig::new())
            .await
            .unwrap();
        assert_eq!(
            transport.recorded_requests()[0].timeout,
            Some(Duration::from_secs(3))
        );
    }
}
