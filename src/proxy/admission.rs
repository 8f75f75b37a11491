//! Per-request admission flow
//!
//! ```text
//! unmatched ─────────────────────────────────────────────▶ pass through
//! manifest pull ─▶ buffer ─┬─ non-200 ───────────────────▶ replay
//!                          └─ 200 ─▶ content trust ─▶ vulnerability ─▶ replay
//!                                        │                  │
//!                                        └──── deny/fail ───┴──────▶ JSON error
//! ```

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

use super::forwarder::UpstreamClient;
use super::matcher::match_pull_manifest;
use super::response::JsonError;
use crate::database::Database;
use crate::otel::Metrics;
use crate::policy::{PolicyChain, PolicyDecision};

const UPSTREAM_FAILURE: &str = "Failed in communication with the registry backend please check the log";

/// Terminal state of a handled request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Not a manifest pull, streamed to and from the backend
    PassThrough,
    /// Backend answered a pull with something other than 200
    NonSuccessReplay,
    /// Every stage passed and the buffered manifest was replayed
    Released,
    /// A stage denied the pull
    Denied,
    /// The backend or a stage collaborator failed
    Failed,
    /// Repository has no project component
    Malformed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::PassThrough => "pass_through",
            Outcome::NonSuccessReplay => "non_success_replay",
            Outcome::Released => "released",
            Outcome::Denied => "denied",
            Outcome::Failed => "failed",
            Outcome::Malformed => "malformed",
        }
    }
}

/// Admission control in front of the registry backend
pub struct AdmissionService<D: Database> {
    upstream: UpstreamClient,
    chain: PolicyChain<D>,
    path_prefix: String,
    metrics: Option<Arc<Metrics>>,
}

impl<D: Database> AdmissionService<D> {
    /// Create a new service
    ///
    /// `path_prefix` is removed from request paths before matching and
    /// forwarding.
    pub fn new(upstream: UpstreamClient, chain: PolicyChain<D>, path_prefix: &str) -> Self {
        Self {
            upstream,
            chain,
            path_prefix: path_prefix.trim_end_matches('/').to_string(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn chain(&self) -> &PolicyChain<D> {
        &self.chain
    }

    /// Handle one inbound request
    pub async fn handle(&self, req: Request<Body>) -> Response {
        let started = Instant::now();
        let (outcome, response) = self.dispatch(req).await;

        debug!(
            outcome = outcome.as_str(),
            status = response.status().as_u16(),
            "Request handled"
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_request(outcome.as_str(), started.elapsed().as_secs_f64());
        }

        response
    }

    fn strip_prefix<'a>(&self, path: &'a str) -> &'a str {
        match path.strip_prefix(self.path_prefix.as_str()) {
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }

    async fn dispatch(&self, req: Request<Body>) -> (Outcome, Response) {
        let path = self.strip_prefix(req.uri().path()).to_string();
        let path_and_query = match req.uri().query() {
            Some(query) => format!("{}?{}", path, query),
            None => path.clone(),
        };

        // Anything but a manifest pull goes straight to the backend
        let Some(pull) = match_pull_manifest(req.method(), &path) else {
            return self.pass_through(req, &path_and_query).await;
        };

        if let Err(e) = pull.split_project() {
            warn!(repository = %pull.repository, "Rejecting manifest pull without project");
            return (
                Outcome::Malformed,
                JsonError::new(StatusCode::BAD_REQUEST, e.to_string()).into_response(),
            );
        }

        // Manifest pulls carry no body
        let (parts, _body) = req.into_parts();
        let buffered = match self.upstream.fetch_buffered(&parts, &path_and_query).await {
            Ok(fetched) => {
                self.record_upstream("buffered", fetched.elapsed.as_secs_f64());
                fetched.value
            }
            Err(e) => {
                error!(path = %path_and_query, error = %e, "Failed to fetch manifest from backend");
                return (
                    Outcome::Failed,
                    JsonError::new(StatusCode::INTERNAL_SERVER_ERROR, UPSTREAM_FAILURE)
                        .into_response(),
                );
            }
        };

        // Errors and redirects from the backend are the client's answer
        if !buffered.is_ok() {
            debug!(
                repository = %pull.repository,
                status = buffered.status.as_u16(),
                "Backend did not return the manifest, skipping policy"
            );
            return (Outcome::NonSuccessReplay, buffered.into_response());
        }

        let digest = match buffered.digest() {
            Some(digest) => digest.to_string(),
            None => {
                warn!(repository = %pull.repository, "Backend returned no manifest digest");
                String::new()
            }
        };

        let image = match pull.describe(digest) {
            Ok(image) => image,
            Err(e) => {
                return (
                    Outcome::Malformed,
                    JsonError::new(StatusCode::BAD_REQUEST, e.to_string()).into_response(),
                )
            }
        };
        debug!(
            project = %image.project,
            repository = %image.repository,
            reference = %image.reference,
            digest = %image.digest,
            "Evaluating manifest pull"
        );

        // Release only when every stage continues
        let verdict = self.chain.evaluate(Some(&image)).await;
        let Some(err) = JsonError::from_decision(&verdict.decision) else {
            return (Outcome::Released, buffered.into_response());
        };

        let stage = verdict.stage.map_or("unknown", |s| s.as_str());
        let outcome = match verdict.decision {
            PolicyDecision::Fail { .. } => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_failed(stage);
                }
                Outcome::Failed
            }
            _ => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_denied(stage);
                }
                Outcome::Denied
            }
        };

        (outcome, err.into_response())
    }

    async fn pass_through(&self, req: Request<Body>, path_and_query: &str) -> (Outcome, Response) {
        match self.upstream.forward(req, path_and_query).await {
            Ok(fetched) => {
                self.record_upstream("streamed", fetched.elapsed.as_secs_f64());
                (Outcome::PassThrough, fetched.value)
            }
            Err(e) => {
                error!(path = %path_and_query, error = %e, "Failed to forward request to backend");
                (
                    Outcome::Failed,
                    JsonError::new(StatusCode::INTERNAL_SERVER_ERROR, UPSTREAM_FAILURE)
                        .into_response(),
                )
            }
        }
    }

    fn record_upstream(&self, mode: &str, secs: f64) {
        if let Some(metrics) = &self.metrics {
            metrics.record_upstream_duration(mode, secs);
        }
    }
}
