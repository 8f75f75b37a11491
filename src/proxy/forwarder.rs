//! Registry backend client
//!
//! Unmatched requests are streamed through. Manifest pulls are fetched into a
//! [`BufferedResponse`] owned by the request that asked for it.

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use std::time::{Duration, Instant};
use sync_wrapper::SyncStream;
use tracing::debug;

use crate::config::UpstreamConfig;
use crate::error::ProxyError;

/// Header carrying the manifest digest
pub const DOCKER_CONTENT_DIGEST: &str = "docker-content-digest";

const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Whether the client announced a request body
fn has_body(headers: &HeaderMap) -> bool {
    headers.contains_key(header::TRANSFER_ENCODING)
        || headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v != "0")
}

/// A backend response captured in full
///
/// Created fresh for every intercepted pull and either replayed as-is or
/// dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BufferedResponse {
    /// Digest reported by the backend, if any
    pub fn digest(&self) -> Option<&str> {
        self.headers
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }
}

impl IntoResponse for BufferedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.headers_mut() = self.headers;
        *response.status_mut() = self.status;
        response
    }
}

/// A backend result and the time it took
#[derive(Debug)]
pub struct Fetched<T> {
    pub value: T,
    pub elapsed: Duration,
}

/// HTTP client for the registry backend
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_manifest_bytes: usize,
}

impl UpstreamClient {
    /// Create a client for the configured backend
    pub fn new(config: &UpstreamConfig) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create a client with a custom reqwest Client
    pub fn with_client(client: Client, config: &UpstreamConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_manifest_bytes: config.max_manifest_bytes,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, parts: &Parts, path_and_query: &str) -> reqwest::RequestBuilder {
        // Host is set by reqwest from the backend URL
        let mut headers = parts.headers.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        self.client
            .request(parts.method.clone(), format!("{}{}", self.base_url, path_and_query))
            .headers(headers)
    }

    /// Send `req` to the backend and stream the answer back
    ///
    /// Neither the request body nor the response body is buffered.
    pub async fn forward(
        &self,
        req: Request<Body>,
        path_and_query: &str,
    ) -> Result<Fetched<Response>, ProxyError> {
        let (parts, body) = req.into_parts();
        let started = Instant::now();

        let mut request = self.request(&parts, path_and_query);
        if has_body(&parts.headers) {
            // reqwest needs a Sync stream, axum's body is only Send
            let stream = SyncStream::new(body.into_data_stream());
            request = request.body(reqwest::Body::wrap_stream(stream));
        }

        let upstream = request.send().await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        // Stream the backend body straight to the client
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        Ok(Fetched {
            value: response,
            elapsed: started.elapsed(),
        })
    }

    /// Fetch a manifest into memory
    ///
    /// Bounded by the configured timeout and manifest size cap. Dropping the
    /// returned future aborts the backend request.
    pub async fn fetch_buffered(
        &self,
        parts: &Parts,
        path_and_query: &str,
    ) -> Result<Fetched<BufferedResponse>, ProxyError> {
        let started = Instant::now();

        let buffered = tokio::time::timeout(self.timeout, self.read_all(parts, path_and_query))
            .await
            .map_err(|_| ProxyError::Timeout(self.timeout.as_secs()))??;

        debug!(
            path = %path_and_query,
            status = buffered.status.as_u16(),
            bytes = buffered.body.len(),
            "Buffered backend response"
        );

        Ok(Fetched {
            value: buffered,
            elapsed: started.elapsed(),
        })
    }

    async fn read_all(
        &self,
        parts: &Parts,
        path_and_query: &str,
    ) -> Result<BufferedResponse, ProxyError> {
        let limit = self.max_manifest_bytes;
        let mut upstream = self.request(parts, path_and_query).send().await?;

        // Reject early when the backend announces an oversized manifest
        if upstream.content_length().is_some_and(|len| len > limit as u64) {
            return Err(ProxyError::TooLarge { limit });
        }

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        // Chunked responses are checked as they arrive
        let mut body = BytesMut::new();
        while let Some(chunk) = upstream.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(ProxyError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(BufferedResponse {
            status,
            headers,
            body: body.freeze(),
        })
    }
}
