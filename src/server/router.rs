//! HTTP router for registry-admission
//!
//! `/health` is answered locally; every other request goes through the
//! admission service.

use axum::{
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::database::Database;
use crate::proxy::AdmissionService;

/// Shared application state
pub struct AppState<D: Database> {
    /// Admission pipeline, built once at startup
    pub admission: Arc<AdmissionService<D>>,
}

impl<D: Database> AppState<D> {
    pub fn new(admission: AdmissionService<D>) -> Self {
        Self {
            admission: Arc::new(admission),
        }
    }
}

impl<D: Database> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            admission: Arc::clone(&self.admission),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub policy_provider: String,
    pub stages: Vec<String>,
}

/// Build the main application router
pub fn build_router<D: Database + 'static>(state: AppState<D>) -> Router {
    Router::new()
        .route("/health", get(health_handler::<D>))
        .fallback(admission_handler::<D>)
        .with_state(state)
}

async fn health_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
) -> impl IntoResponse {
    let chain = state.admission.chain();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        policy_provider: chain.provider_name().to_string(),
        stages: chain.stages().iter().map(|s| s.as_str().to_string()).collect(),
    })
}

async fn admission_handler<D: Database + 'static>(
    State(state): State<AppState<D>>,
    req: Request<Body>,
) -> Response {
    state.admission.handle(req).await
}
