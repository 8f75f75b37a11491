//! Notary trust client
//!
//! Reads the TUF `targets` metadata that Docker Content Trust publishes to a
//! Notary server. Signed tags may live in the top-level `targets` role or in
//! the `targets/releases` delegation; both are consulted.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::TrustClient;
use crate::config::TrustConfig;
use crate::error::TrustError;
use crate::models::SignedTarget;

/// Roles holding signed tags, in lookup order
const TARGET_ROLES: &[&str] = &["targets", "targets/releases"];

/// Signed TUF metadata envelope
#[derive(Debug, Deserialize)]
struct SignedMetadata {
    signed: TargetsRole,
}

#[derive(Debug, Deserialize)]
struct TargetsRole {
    #[serde(default)]
    targets: HashMap<String, TargetMeta>,
}

#[derive(Debug, Deserialize)]
struct TargetMeta {
    #[serde(default)]
    hashes: HashMap<String, String>,
}

/// Token service response; registries use either field name
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// Trust client backed by a Notary server
pub struct NotaryClient {
    config: TrustConfig,
    client: Client,
}

impl NotaryClient {
    /// Create a new Notary client
    pub fn new(config: TrustConfig) -> Result<Self, TrustError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TrustError::Connection(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    /// Create a Notary client with a custom reqwest Client
    pub fn with_client(client: Client, config: TrustConfig) -> Self {
        Self { config, client }
    }

    /// Globally unique name of a repository
    pub fn gun(&self, repository: &str) -> String {
        let prefix = self.config.gun_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            repository.to_string()
        } else {
            format!("{}/{}", prefix, repository)
        }
    }

    /// Fetch a pull token for `gun` as the configured principal
    async fn fetch_token(&self, realm: &str, gun: &str) -> Result<String, TrustError> {
        let scope = format!("repository:{}:pull", gun);
        let request = self
            .client
            .get(realm)
            .query(&[
                ("service", self.config.token_service_name.as_str()),
                ("scope", scope.as_str()),
            ])
            .basic_auth(&self.config.principal, self.config.secret.as_deref());

        let response = request.send().await.map_err(map_reqwest_error)?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(TrustError::Unauthorized)
            }
            status => return Err(TrustError::Status(status.as_u16())),
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| TrustError::InvalidData(format!("token response: {}", e)))?;
        body.token
            .or(body.access_token)
            .ok_or_else(|| TrustError::InvalidData("token response without token".to_string()))
    }

    /// Fetch one role's metadata; `None` when the role does not exist
    async fn fetch_role(
        &self,
        gun: &str,
        role: &str,
        token: Option<&str>,
    ) -> Result<Option<TargetsRole>, TrustError> {
        let url = format!(
            "{}/v2/{}/_trust/tuf/{}.json",
            self.config.endpoint.trim_end_matches('/'),
            gun,
            role
        );

        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        debug!(url = %url, "Fetching trust metadata");
        let response = request.send().await.map_err(map_reqwest_error)?;

        match response.status() {
            StatusCode::OK => {
                let metadata: SignedMetadata = response
                    .json()
                    .await
                    .map_err(|e| TrustError::InvalidData(format!("{}: {}", role, e)))?;
                Ok(Some(metadata.signed))
            }
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TrustError::Unauthorized),
            status => {
                warn!(url = %url, status = status.as_u16(), "Unexpected trust service status");
                Err(TrustError::Status(status.as_u16()))
            }
        }
    }
}

#[async_trait]
impl TrustClient for NotaryClient {
    fn name(&self) -> &str {
        "notary"
    }

    async fn list_signed_targets(&self, repository: &str) -> Result<Vec<SignedTarget>, TrustError> {
        let gun = self.gun(repository);

        let token = match &self.config.token_service {
            Some(realm) => Some(self.fetch_token(realm, &gun).await?),
            None => None,
        };

        let mut targets = Vec::new();
        for role in TARGET_ROLES {
            let Some(metadata) = self.fetch_role(&gun, role, token.as_deref()).await? else {
                continue;
            };
            for (tag, meta) in metadata.targets {
                // A tag signed in an earlier role wins
                if targets.iter().any(|t: &SignedTarget| t.tag == tag) {
                    continue;
                }
                // An undecodable target only leaves its own tag unsigned
                match digest_from_hashes(&meta.hashes) {
                    Ok(digest) => targets.push(SignedTarget::new(tag, digest)),
                    Err(e) => {
                        warn!(gun = %gun, role = %role, tag = %tag, error = %e, "Skipping unusable signed target");
                    }
                }
            }
        }

        debug!(gun = %gun, count = targets.len(), "Signed targets loaded");
        Ok(targets)
    }
}

/// Convert a TUF `hashes` map to a `sha256:<hex>` digest
pub fn digest_from_hashes(hashes: &HashMap<String, String>) -> Result<String, TrustError> {
    let encoded = hashes
        .get("sha256")
        .ok_or_else(|| TrustError::InvalidData("target has no sha256 hash".to_string()))?;
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| TrustError::InvalidData(format!("invalid sha256 hash: {}", e)))?;
    Ok(format!("sha256:{}", hex::encode(raw)))
}

fn map_reqwest_error(e: reqwest::Error) -> TrustError {
    if e.is_timeout() {
        TrustError::Timeout
    } else {
        TrustError::Connection(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hash_b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn targets_json(entries: &[(&str, &[u8])]) -> serde_json::Value {
        let targets: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(tag, hash)| {
                (
                    tag.to_string(),
                    serde_json::json!({ "hashes": { "sha256": hash_b64(hash) }, "length": 1 }),
                )
            })
            .collect();
        serde_json::json!({ "signed": { "_type": "Targets", "targets": targets }, "signatures": [] })
    }

    fn test_config(endpoint: &str) -> TrustConfig {
        TrustConfig {
            enabled: true,
            endpoint: endpoint.to_string(),
            gun_prefix: "registry.example.com".to_string(),
            ..Default::default()
        }
    }

    // Test 1: Digest conversion from base64 to hex
    #[test]
    fn test_digest_from_hashes() {
        let mut hashes = HashMap::new();
        hashes.insert("sha256".to_string(), hash_b64(&[0xab, 0xcd, 0x01]));
        assert_eq!(digest_from_hashes(&hashes).unwrap(), "sha256:abcd01");
    }

    // Test 2: Missing or malformed hash is invalid data
    #[test]
    fn test_digest_from_hashes_invalid() {
        let hashes = HashMap::new();
        assert!(matches!(
            digest_from_hashes(&hashes),
            Err(TrustError::InvalidData(_))
        ));

        let mut bad = HashMap::new();
        bad.insert("sha256".to_string(), "***".to_string());
        assert!(matches!(
            digest_from_hashes(&bad),
            Err(TrustError::InvalidData(_))
        ));
    }

    // Test 3: GUN uses the configured prefix
    #[test]
    fn test_gun() {
        let client = NotaryClient::new(test_config("http://notary")).unwrap();
        assert_eq!(client.gun("proj/repo"), "registry.example.com/proj/repo");

        let bare = NotaryClient::new(TrustConfig::default()).unwrap();
        assert_eq!(bare.gun("proj/repo"), "proj/repo");
    }

    // Test 4: Lists targets from both roles
    #[tokio::test]
    async fn test_list_signed_targets() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/v2/registry.example.com/proj/repo/_trust/tuf/targets.json",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(targets_json(&[("v1", &[1, 2])])))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(
                "/v2/registry.example.com/proj/repo/_trust/tuf/targets/releases.json",
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(targets_json(&[("v1", &[9, 9]), ("v2", &[3, 4])])),
            )
            .mount(&mock_server)
            .await;

        let client = NotaryClient::new(test_config(&mock_server.uri())).unwrap();
        let mut targets = client.list_signed_targets("proj/repo").await.unwrap();
        targets.sort_by(|a, b| a.tag.cmp(&b.tag));

        assert_eq!(
            targets,
            vec![
                SignedTarget::new("v1", "sha256:0102"),
                SignedTarget::new("v2", "sha256:0304"),
            ]
        );
    }

    // Test 5: Unsigned repository yields an empty list
    #[tokio::test]
    async fn test_list_signed_targets_unsigned_repo() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = NotaryClient::new(test_config(&mock_server.uri())).unwrap();
        let targets = client.list_signed_targets("proj/repo").await.unwrap();
        assert!(targets.is_empty());
    }

    // Test 6: Server errors surface as Status
    #[tokio::test]
    async fn test_list_signed_targets_server_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = NotaryClient::new(test_config(&mock_server.uri())).unwrap();
        let result = client.list_signed_targets("proj/repo").await;
        assert_eq!(result.unwrap_err(), TrustError::Status(503));
    }

    // Test 7: Unreachable service is a connection error
    #[tokio::test]
    async fn test_list_signed_targets_unreachable() {
        let client = NotaryClient::new(test_config("http://127.0.0.1:1")).unwrap();
        let result = client.list_signed_targets("proj/repo").await;
        assert!(matches!(result, Err(TrustError::Connection(_))));
    }

    // Test 8: Token is fetched as the principal and sent as bearer
    #[tokio::test]
    async fn test_list_signed_targets_with_token() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/service/token"))
            .and(query_param("service", "notary"))
            .and(query_param(
                "scope",
                "repository:registry.example.com/proj/repo:pull",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": "t0ken"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(
                "/v2/registry.example.com/proj/repo/_trust/tuf/targets.json",
            ))
            .and(header("Authorization", "Bearer t0ken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(targets_json(&[("v1", &[7])])))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(
                "/v2/registry.example.com/proj/repo/_trust/tuf/targets/releases.json",
            ))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let config = TrustConfig {
            token_service: Some(format!("{}/service/token", mock_server.uri())),
            ..test_config(&mock_server.uri())
        };
        let client = NotaryClient::new(config).unwrap();

        let targets = client.list_signed_targets("proj/repo").await.unwrap();
        assert_eq!(targets, vec![SignedTarget::new("v1", "sha256:07")]);
    }

    // Test 9: Rejected principal is Unauthorized
    #[tokio::test]
    async fn test_token_service_unauthorized() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/service/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let config = TrustConfig {
            token_service: Some(format!("{}/service/token", mock_server.uri())),
            ..test_config(&mock_server.uri())
        };
        let client = NotaryClient::new(config).unwrap();

        let result = client.list_signed_targets("proj/repo").await;
        assert_eq!(result.unwrap_err(), TrustError::Unauthorized);
    }

    // Test 10: A target without a usable sha256 does not hide the others
    #[tokio::test]
    async fn test_list_signed_targets_skips_undecodable_target() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(
                "/v2/registry.example.com/proj/repo/_trust/tuf/targets.json",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "signed": {
                    "_type": "Targets",
                    "targets": {
                        "v1": { "hashes": { "sha256": hash_b64(&[1, 2]) }, "length": 1 },
                        "legacy": { "hashes": { "sha512": hash_b64(&[5; 64]) }, "length": 1 }
                    }
                },
                "signatures": []
            })))
            .mount(&mock_server)
            .await;

        let client = NotaryClient::new(test_config(&mock_server.uri())).unwrap();
        let targets = client.list_signed_targets("proj/repo").await.unwrap();
        assert_eq!(targets, vec![SignedTarget::new("v1", "sha256:0102")]);
    }
}
