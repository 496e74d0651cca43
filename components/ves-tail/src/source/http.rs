//! HTTP/JSON client for the VES search service.
//!
//! Every call is a plain `GET` returning one JSON page and an optional
//! continuation token. The client holds no state between calls beyond the
//! pooled connections inside the hyper client.

// Local crates
use crate::{
    helpers::load_config::BackendConfig,
    source::{
        models::{EventPage, GroupPage, LogGroup, LogStream, SearchQuery, StreamOrder, StreamPage},
        source::{BackendError, EventSource},
    },
};

// External crates
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, LengthLimitError, Limited};
use hyper::{
    Method, Request, StatusCode, Uri,
    header::{ACCEPT, AUTHORIZATION},
};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::instrument;

/// Unreserved characters (RFC 3986) are left alone, everything else is escaped.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Longest error body kept in a [`BackendError::Status`].
const MAX_ERROR_BODY: usize = 512;
/// Largest response body read from the backend.
const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct HttpEventSource {
    client: Client<HttpConnector, Empty<Bytes>>,
    endpoint: String,
    auth_token: Option<String>,
    request_timeout: Duration,
    max_response_bytes: usize,
}

impl fmt::Debug for HttpEventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEventSource")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl HttpEventSource {
    /// Build a client for the configured endpoint. Only `http://` endpoints
    /// are accepted.
    #[instrument(
        name = "ves_tail_source::http::create",
        target = "source::http",
        skip_all,
        level = "debug"
    )]
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let endpoint = config.endpoint.trim_end_matches('/').to_string();
        validate_endpoint(&endpoint)?;

        tracing::debug!(
            endpoint = %endpoint,
            request_timeout_ms = config.request_timeout_ms,
            authenticated = config.auth_token.is_some(),
            "Creating HTTP event source"
        );

        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            client,
            endpoint,
            auth_token: config.auth_token.clone(),
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            max_response_bytes: MAX_RESPONSE_BYTES,
        })
    }

    /// List every log group whose name starts with `prefix`.
    #[instrument(
        name = "ves_tail_source::http::list_groups",
        target = "source::http",
        skip_all,
        level = "debug"
    )]
    pub async fn list_groups(&self, prefix: Option<&str>) -> Result<Vec<LogGroup>, BackendError> {
        let mut groups = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut query = QueryString::default();
            query.push_opt("prefix", prefix);
            query.push_opt("next_token", next_token.as_deref());

            let page: GroupPage = self.get_json("/v1/groups", query).await?;
            groups.extend(page.groups);

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(group_count = groups.len(), "Listed log groups");
        Ok(groups)
    }

    /// List every stream of `group`, ordered by the backend.
    #[instrument(
        name = "ves_tail_source::http::list_streams",
        target = "source::http",
        skip_all,
        fields(group = %group),
        level = "debug"
    )]
    pub async fn list_streams(
        &self,
        group: &str,
        prefix: Option<&str>,
        order: StreamOrder,
        descending: bool,
    ) -> Result<Vec<LogStream>, BackendError> {
        let path = format!("/v1/groups/{}/streams", encode(group));
        let mut streams = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let mut query = QueryString::default();
            query.push_opt("prefix", prefix);
            query.push("order_by", order.as_query_value());
            query.push("descending", if descending { "true" } else { "false" });
            query.push_opt("next_token", next_token.as_deref());

            let page: StreamPage = self.get_json(&path, query).await?;
            streams.extend(page.streams);

            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!(stream_count = streams.len(), "Listed log streams");
        Ok(streams)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: QueryString,
    ) -> Result<T, BackendError> {
        let uri = format!("{}{}{}", self.endpoint, path, query.render());
        let uri: Uri = uri.parse().map_err(|e: hyper::http::uri::InvalidUri| {
            BackendError::InvalidEndpoint {
                endpoint: uri.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(uri.clone())
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.auth_token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder
            .body(Empty::<Bytes>::new())
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        tracing::trace!(uri = %uri, "Sending backend request");

        // One deadline covers the response head and the whole body.
        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| BackendError::Transport(e.to_string()))?;
            let status = response.status();
            let body = Limited::new(response.into_body(), self.max_response_bytes)
                .collect()
                .await
                .map_err(|e| {
                    if e.is::<LengthLimitError>() {
                        BackendError::ResponseTooLarge {
                            limit: self.max_response_bytes,
                        }
                    } else {
                        BackendError::Transport(e.to_string())
                    }
                })?
                .to_bytes();
            Ok::<_, BackendError>((status, body))
        };

        let timeout_ms = u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX);
        let (status, body) = tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| BackendError::Timeout(timeout_ms))??;

        tracing::trace!(status = %status, body_len = body.len(), "Received backend response");

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body: String = String::from_utf8_lossy(&body)
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

impl EventSource for HttpEventSource {
    async fn search(
        &self,
        query: &SearchQuery,
        next_token: Option<String>,
    ) -> Result<EventPage, BackendError> {
        let path = format!("/v1/groups/{}/events", encode(&query.group));

        let mut params = QueryString::default();
        params.push("start", &query.start_time_millis.to_string());
        if let Some(end) = query.end_time_millis {
            params.push("end", &end.to_string());
        }
        params.push_opt("filter", query.filter_pattern.as_deref());
        if !query.stream_names.is_empty() {
            params.push("streams", &query.stream_names.join(","));
        }
        params.push_opt("stream_prefix", query.stream_prefix.as_deref());
        if let Some(limit) = query.limit {
            params.push("limit", &limit.to_string());
        }
        params.push_opt("next_token", next_token.as_deref());

        self.get_json(&path, params).await
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), BackendError> {
    let invalid = |reason: &str| BackendError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = endpoint.parse().map_err(|_| invalid("not a valid URI"))?;
    if uri.scheme_str() != Some("http") {
        return Err(invalid("only http:// endpoints are supported"));
    }
    if uri.authority().is_none() {
        return Err(invalid("missing host"));
    }
    Ok(())
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT).to_string()
}

#[derive(Debug, Default)]
struct QueryString {
    pairs: Vec<(&'static str, String)>,
}

impl QueryString {
    fn push(&mut self, key: &'static str, value: &str) {
        self.pairs.push((key, encode(value)));
    }

    fn push_opt(&mut self, key: &'static str, value: Option<&str>) {
        if let Some(value) = value {
            self.push(key, value);
        }
    }

    fn render(&self) -> String {
        if self.pairs.is_empty() {
            return String::new();
        }
        let joined: Vec<String> = self
            .pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("?{}", joined.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::source::pages;
    use futures::TryStreamExt;
    use http_body_util::Full;
    use hyper::{Response, body::Incoming, service::service_fn};
    use hyper_util::{rt::TokioIo, server::conn::auto::Builder as HyperServerBuilder};
    use pretty_assertions::assert_eq;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    /// (path and query, authorization header)
    type Seen = Arc<Mutex<Vec<(String, Option<String>)>>>;

    async fn spawn_backend<F>(respond: F) -> (String, Seen)
    where
        F: Fn(&str) -> (StatusCode, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let respond = Arc::new(respond);

        let seen_by_server = Arc::clone(&seen);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let io = TokioIo::new(stream);
                let respond = Arc::clone(&respond);
                let seen = Arc::clone(&seen_by_server);

                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let respond = Arc::clone(&respond);
                        let seen = Arc::clone(&seen);
                        async move {
                            let target = req
                                .uri()
                                .path_and_query()
                                .map(|pq| pq.as_str().to_string())
                                .unwrap_or_default();
                            let auth = req
                                .headers()
                                .get(AUTHORIZATION)
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string);
                            seen.lock().unwrap().push((target.clone(), auth));

                            let (status, body) = (*respond)(&target);
                            Ok::<_, Infallible>(
                                Response::builder()
                                    .status(status)
                                    .body(Full::new(Bytes::from(body)))
                                    .unwrap(),
                            )
                        }
                    });
                    let _ = HyperServerBuilder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        (format!("http://{addr}"), seen)
    }

    fn backend_config(endpoint: &str, auth_token: Option<&str>) -> BackendConfig {
        BackendConfig {
            endpoint: endpoint.to_string(),
            auth_token: auth_token.map(str::to_string),
            request_timeout_ms: 2_000,
            page_size: None,
        }
    }

    #[tokio::test]
    async fn search_pages_through_continuation_tokens() {
        let (endpoint, seen) = spawn_backend(|target| {
            let body = if target.contains("next_token=t1") {
                r#"{"events":[{"id":"c","timestamp_millis":120,"stream_name":"web","message":"third"}]}"#
            } else {
                r#"{"events":[
                    {"id":"a","timestamp_millis":100,"stream_name":"web","message":"first"},
                    {"id":"b","timestamp_millis":110,"stream_name":"web","message":"second"}
                ],"next_token":"t1"}"#
            };
            (StatusCode::OK, body.to_string())
        })
        .await;

        let source = HttpEventSource::new(&backend_config(&endpoint, None)).unwrap();
        let mut query = SearchQuery::new("/app/web", 100);
        query.filter_pattern = Some("level=ERROR".into());
        query.stream_names = vec!["web-1".into(), "web-2".into()];

        let collected: Vec<_> = pages(&source, &query).try_collect().await.unwrap();

        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].len(), 2);
        assert_eq!(collected[1][0].id, "c");

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[0].0,
            "/v1/groups/%2Fapp%2Fweb/events?start=100&filter=level%3DERROR&streams=web-1%2Cweb-2"
        );
        assert!(!seen[0].0.contains("end="));
        assert!(seen[1].0.ends_with("&next_token=t1"));
        assert_eq!(seen[0].1, None);
    }

    #[tokio::test]
    async fn bounded_search_sends_end_time_and_bearer_token() {
        let (endpoint, seen) =
            spawn_backend(|_| (StatusCode::OK, r#"{"events":[]}"#.to_string())).await;

        let source = HttpEventSource::new(&backend_config(&endpoint, Some("s3cret"))).unwrap();
        let mut query = SearchQuery::new("app", 5);
        query.end_time_millis = Some(50);
        query.limit = Some(25);

        let page = source.search(&query, None).await.unwrap();

        assert!(page.events.is_empty());
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[0].0, "/v1/groups/app/events?start=5&end=50&limit=25");
        assert_eq!(seen[0].1.as_deref(), Some("Bearer s3cret"));
    }

    #[tokio::test]
    async fn rejected_credentials_map_to_unauthorized() {
        let (endpoint, _) =
            spawn_backend(|_| (StatusCode::FORBIDDEN, "denied".to_string())).await;
        let source = HttpEventSource::new(&backend_config(&endpoint, Some("bad"))).unwrap();

        let err = source.search(&SearchQuery::new("app", 0), None).await.unwrap_err();

        assert!(matches!(err, BackendError::Unauthorized { status: 403 }));
    }

    #[tokio::test]
    async fn server_errors_keep_the_response_body() {
        let (endpoint, _) = spawn_backend(|_| {
            (StatusCode::INTERNAL_SERVER_ERROR, "index unavailable".to_string())
        })
        .await;
        let source = HttpEventSource::new(&backend_config(&endpoint, None)).unwrap();

        let err = source.search(&SearchQuery::new("app", 0), None).await.unwrap_err();

        match err {
            BackendError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "index unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_response_is_rejected() {
        let (endpoint, _) = spawn_backend(|_| {
            (StatusCode::OK, format!(r#"{{"events":[],"pad":"{}"}}"#, "x".repeat(256)))
        })
        .await;
        let mut source = HttpEventSource::new(&backend_config(&endpoint, None)).unwrap();
        source.max_response_bytes = 64;

        let err = source.search(&SearchQuery::new("app", 0), None).await.unwrap_err();

        assert!(matches!(err, BackendError::ResponseTooLarge { limit: 64 }));
    }

    #[tokio::test]
    async fn slow_head_and_stalled_body_share_one_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n{")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut config = backend_config(&endpoint, None);
        config.request_timeout_ms = 500;
        let source = HttpEventSource::new(&config).unwrap();

        let started = Instant::now();
        let err = source.search(&SearchQuery::new("app", 0), None).await.unwrap_err();

        assert!(matches!(err, BackendError::Timeout(500)));
        assert!(started.elapsed() < Duration::from_millis(750));
    }

    #[tokio::test]
    async fn garbage_body_is_a_decode_error() {
        let (endpoint, _) = spawn_backend(|_| (StatusCode::OK, "<html>".to_string())).await;
        let source = HttpEventSource::new(&backend_config(&endpoint, None)).unwrap();

        let err = source.search(&SearchQuery::new("app", 0), None).await.unwrap_err();

        assert!(matches!(err, BackendError::Decode(_)));
    }

    #[tokio::test]
    async fn list_groups_collects_every_page() {
        let (endpoint, seen) = spawn_backend(|target| {
            let body = if target.contains("next_token=g2") {
                r#"{"groups":[{"name":"/app/worker"}]}"#
            } else {
                r#"{"groups":[{"name":"/app/web","stored_bytes":42}],"next_token":"g2"}"#
            };
            (StatusCode::OK, body.to_string())
        })
        .await;
        let source = HttpEventSource::new(&backend_config(&endpoint, None)).unwrap();

        let groups = source.list_groups(Some("/app")).await.unwrap();

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["/app/web", "/app/worker"]);
        assert_eq!(seen.lock().unwrap()[0].0, "/v1/groups?prefix=%2Fapp");
    }

    #[tokio::test]
    async fn list_streams_sends_ordering() {
        let (endpoint, seen) = spawn_backend(|_| {
            (
                StatusCode::OK,
                r#"{"streams":[{"name":"web-2","last_event_millis":9},{"name":"web-1"}]}"#.to_string(),
            )
        })
        .await;
        let source = HttpEventSource::new(&backend_config(&endpoint, None)).unwrap();

        let streams = source
            .list_streams("app", None, StreamOrder::LastEventTime, true)
            .await
            .unwrap();

        assert_eq!(streams.len(), 2);
        assert_eq!(
            seen.lock().unwrap()[0].0,
            "/v1/groups/app/streams?order_by=last_event_time&descending=true"
        );
    }

    #[test]
    fn non_http_endpoints_are_rejected() {
        for endpoint in ["https://logs.example.com", "ftp://logs", "not a uri", "/relative"] {
            let err = HttpEventSource::new(&backend_config(endpoint, None)).unwrap_err();
            assert!(
                matches!(err, BackendError::InvalidEndpoint { .. }),
                "{endpoint} should be rejected"
            );
        }
    }
}
