//! Common test utilities and helpers for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine;
use serde_json::json;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use registry_admission::config::{ServerConfig, TrustConfig, UpstreamConfig};
use registry_admission::database::SqliteDatabase;
use registry_admission::policy::{ChainSettings, PolicyChain, PolicyProvider};
use registry_admission::proxy::{AdmissionService, UpstreamClient};
use registry_admission::server::{AppState, Server};
use registry_admission::trust::NotaryClient;

pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Create an in-memory database for testing
pub async fn create_test_database() -> Arc<SqliteDatabase> {
    Arc::new(
        SqliteDatabase::in_memory()
            .await
            .expect("Failed to create test database"),
    )
}

/// sha256 digest in `sha256:<hex>` form for 32 repeated `byte`s
pub fn digest_of(byte: u8) -> String {
    format!("sha256:{}", hex::encode([byte; 32]))
}

/// Mount a manifest on the fake registry backend
pub async fn mount_manifest(backend: &MockServer, repository: &str, tag: &str, digest: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/{}/manifests/{}", repository, tag)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Docker-Content-Digest", digest)
                .insert_header("Content-Type", MANIFEST_MEDIA_TYPE)
                .insert_header("Etag", format!("\"{}\"", digest))
                .set_body_string(body),
        )
        .mount(backend)
        .await;
}

/// Mount the `targets` role of `gun` on the fake Notary server
///
/// `targets` maps tags to the byte their 32-byte sha256 is made of.
pub async fn mount_signed_targets(notary: &MockServer, gun: &str, targets: &[(&str, u8)]) {
    let entries: serde_json::Map<String, serde_json::Value> = targets
        .iter()
        .map(|(tag, byte)| {
            let hash = base64::engine::general_purpose::STANDARD.encode([*byte; 32]);
            (
                tag.to_string(),
                json!({ "length": 529, "hashes": { "sha256": hash } }),
            )
        })
        .collect();

    Mock::given(method("GET"))
        .and(path(format!("/v2/{}/_trust/tuf/targets.json", gun)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signed": {
                "_type": "Targets",
                "version": 2,
                "targets": entries
            },
            "signatures": []
        })))
        .mount(notary)
        .await;
}

/// Notary client pointed at a fake Notary server
pub fn notary_client(notary: &MockServer) -> NotaryClient {
    NotaryClient::new(TrustConfig {
        enabled: true,
        endpoint: notary.uri(),
        gun_prefix: "registry.example.com".to_string(),
        ..TrustConfig::default()
    })
    .expect("Failed to create Notary client")
}

/// Assemble application state around a fake backend
pub fn create_test_state(
    backend: &MockServer,
    provider: Arc<dyn PolicyProvider>,
    database: Arc<SqliteDatabase>,
    notary: Option<NotaryClient>,
    scan_enabled: bool,
) -> AppState<SqliteDatabase> {
    let upstream = UpstreamClient::new(&UpstreamConfig {
        url: backend.uri(),
        ..UpstreamConfig::default()
    })
    .expect("Failed to create upstream client");

    let settings = ChainSettings {
        scan_enabled,
        ..ChainSettings::default()
    };
    let mut chain = PolicyChain::new(provider, database, settings);
    if let Some(notary) = notary {
        chain = chain.with_trust_client(Arc::new(notary));
    }

    AppState::new(AdmissionService::new(upstream, chain, ""))
}

/// Run a test server in the background and return the address
///
/// The server shuts down when the returned sender is used or dropped.
pub async fn run_test_server(
    state: AppState<SqliteDatabase>,
) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to get local address");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let server = Server::new(
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: addr.port(),
            ..Default::default()
        },
        state,
    );

    tokio::spawn(async move {
        server
            .serve(listener, async move {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    (addr, shutdown_tx)
}

/// Fetch a URL directly, bypassing the admission layer
pub async fn fetch_direct(url: &str) -> (u16, Vec<(String, String)>, bytes::Bytes) {
    let response = reqwest::get(url).await.expect("Direct request failed");
    let status = response.status().as_u16();
    let headers = comparable_headers(response.headers());
    let body = response.bytes().await.expect("Direct body failed");
    (status, headers, body)
}

/// Headers minus those that legitimately differ between two connections
pub fn comparable_headers(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str() != "date")
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
}
