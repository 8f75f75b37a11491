//! Project policy providers
//!
//! A provider answers two questions about a project: must pulled images be
//! signed, and which scan severity blocks a pull. The provider is picked once
//! at startup and injected into the policy chain.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::StaticPolicyConfig;
use crate::database::Database;
use crate::models::Severity;

/// Environment variable enabling content trust for every project
pub const ENV_CONTENT_TRUST: &str = "PROJECT_CONTENT_TRUST";

/// Environment variable enabling vulnerability prevention for every project
pub const ENV_VULNERABLE: &str = "PROJECT_VULNERABLE";

/// Environment variable holding the severity threshold
pub const ENV_SEVERITY: &str = "PROJECT_SEVERITY";

/// Vulnerability settings of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulnerabilityPolicy {
    /// Whether the threshold is enforced
    pub enabled: bool,

    /// Images at or above this severity are blocked
    pub threshold: Severity,
}

impl VulnerabilityPolicy {
    /// Policy that does not enforce anything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: Severity::Unknown,
        }
    }

    /// Policy enforcing `threshold`
    pub fn enforce(threshold: Severity) -> Self {
        Self {
            enabled: true,
            threshold,
        }
    }

    /// Strictest policy: every scanned image is at or above `Unknown`
    pub fn strictest() -> Self {
        Self::enforce(Severity::Unknown)
    }
}

/// Source of per-project admission settings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Whether pulls from `project` require a signed image
    async fn content_trust_enabled(&self, project: &str) -> bool;

    /// Vulnerability settings of `project`
    async fn vulnerability_policy(&self, project: &str) -> VulnerabilityPolicy;
}

/// Provider applying the same fixed settings to every project
///
/// Used for standalone deployments and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPolicyProvider {
    content_trust: bool,
    vulnerability: VulnerabilityPolicy,
}

impl StaticPolicyProvider {
    /// Create a provider with explicit settings
    pub fn new(content_trust: bool, vulnerability: VulnerabilityPolicy) -> Self {
        Self {
            content_trust,
            vulnerability,
        }
    }

    /// Create a provider from the `policy.static` config section
    pub fn from_config(config: &StaticPolicyConfig) -> Self {
        let vulnerability = VulnerabilityPolicy {
            enabled: config.prevent_vulnerable,
            threshold: config.severity,
        };
        Self::new(config.content_trust, vulnerability)
    }

    /// Create a provider from `PROJECT_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a provider from an arbitrary variable lookup
    ///
    /// Toggles are on only when the variable is exactly `1`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_set = |key: &str| lookup(key).as_deref() == Some("1");
        let threshold = lookup(ENV_SEVERITY)
            .map(|s| Severity::parse_lenient(&s))
            .unwrap_or_default();

        Self::new(
            is_set(ENV_CONTENT_TRUST),
            VulnerabilityPolicy {
                enabled: is_set(ENV_VULNERABLE),
                threshold,
            },
        )
    }
}

#[async_trait]
impl PolicyProvider for StaticPolicyProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn content_trust_enabled(&self, _project: &str) -> bool {
        self.content_trust
    }

    async fn vulnerability_policy(&self, _project: &str) -> VulnerabilityPolicy {
        self.vulnerability
    }
}

/// Provider reading per-project settings from the tenant store
///
/// Lookup failures fail closed: content trust is reported as enabled and the
/// vulnerability policy as the strictest one. A project that is not in the
/// store is treated the same way.
pub struct StorePolicyProvider<D: Database> {
    database: Arc<D>,
}

impl<D: Database> StorePolicyProvider<D> {
    /// Create a new store-backed provider
    pub fn new(database: Arc<D>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl<D: Database + 'static> PolicyProvider for StorePolicyProvider<D> {
    fn name(&self) -> &str {
        "store"
    }

    async fn content_trust_enabled(&self, project: &str) -> bool {
        match self.database.get_project_policy(project).await {
            Ok(Some(policy)) => policy.enable_content_trust,
            Ok(None) => {
                error!(project = %project, "Project not found in tenant store, enforcing content trust");
                true
            }
            Err(e) => {
                error!(project = %project, error = %e, "Unexpected error when getting the project, enforcing content trust");
                true
            }
        }
    }

    async fn vulnerability_policy(&self, project: &str) -> VulnerabilityPolicy {
        match self.database.get_project_policy(project).await {
            Ok(Some(policy)) => {
                debug!(
                    project = %project,
                    enabled = policy.prevent_vulnerable_images,
                    threshold = %policy.severity,
                    "Loaded project vulnerability policy"
                );
                VulnerabilityPolicy {
                    enabled: policy.prevent_vulnerable_images,
                    threshold: policy.severity,
                }
            }
            Ok(None) => {
                error!(project = %project, "Project not found in tenant store, enforcing strictest severity");
                VulnerabilityPolicy::strictest()
            }
            Err(e) => {
                error!(project = %project, error = %e, "Unexpected error when getting the project, enforcing strictest severity");
                VulnerabilityPolicy::strictest()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MockDatabase;
    use crate::error::DbError;
    use crate::models::ProjectPolicy;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    // Test 1: Static provider from config
    #[tokio::test]
    async fn test_static_provider_from_config() {
        let provider = StaticPolicyProvider::from_config(&StaticPolicyConfig {
            content_trust: true,
            prevent_vulnerable: true,
            severity: Severity::Medium,
        });

        assert!(provider.content_trust_enabled("any").await);
        assert_eq!(
            provider.vulnerability_policy("any").await,
            VulnerabilityPolicy::enforce(Severity::Medium)
        );
    }

    // Test 2: Environment toggles require exactly "1"
    #[tokio::test]
    async fn test_static_provider_from_lookup() {
        let provider = StaticPolicyProvider::from_lookup(lookup_from(&[
            (ENV_CONTENT_TRUST, "1"),
            (ENV_VULNERABLE, "true"),
            (ENV_SEVERITY, "high"),
        ]));

        assert!(provider.content_trust_enabled("proj").await);
        let policy = provider.vulnerability_policy("proj").await;
        assert!(!policy.enabled);
        assert_eq!(policy.threshold, Severity::High);
    }

    // Test 3: No variables means everything disabled
    #[tokio::test]
    async fn test_static_provider_empty_lookup() {
        let provider = StaticPolicyProvider::from_lookup(lookup_from(&[]));

        assert!(!provider.content_trust_enabled("proj").await);
        assert_eq!(
            provider.vulnerability_policy("proj").await,
            VulnerabilityPolicy::disabled()
        );
    }

    // Test 4: Store provider returns the project's settings
    #[tokio::test]
    async fn test_store_provider_reads_project() {
        let mut mock_db = MockDatabase::new();
        mock_db
            .expect_get_project_policy()
            .withf(|name| name == "proj")
            .returning(|name| {
                Ok(Some(
                    ProjectPolicy::new(name).with_vulnerability_threshold(Severity::High),
                ))
            });

        let provider = StorePolicyProvider::new(Arc::new(mock_db));

        assert!(!provider.content_trust_enabled("proj").await);
        assert_eq!(
            provider.vulnerability_policy("proj").await,
            VulnerabilityPolicy::enforce(Severity::High)
        );
    }

    // Test 5: Store errors fail closed
    #[tokio::test]
    async fn test_store_provider_fails_closed_on_error() {
        let mut mock_db = MockDatabase::new();
        mock_db
            .expect_get_project_policy()
            .returning(|_| Err(DbError::Sqlite(rusqlite::Error::InvalidQuery)));

        let provider = StorePolicyProvider::new(Arc::new(mock_db));

        assert!(provider.content_trust_enabled("proj").await);
        assert_eq!(
            provider.vulnerability_policy("proj").await,
            VulnerabilityPolicy::strictest()
        );
    }

    // Test 6: Unknown project fails closed
    #[tokio::test]
    async fn test_store_provider_fails_closed_on_missing_project() {
        let mut mock_db = MockDatabase::new();
        mock_db.expect_get_project_policy().returning(|_| Ok(None));

        let provider = StorePolicyProvider::new(Arc::new(mock_db));

        assert!(provider.content_trust_enabled("ghost").await);
        assert!(provider.vulnerability_policy("ghost").await.enabled);
    }

    // Test 7: Provider names
    #[test]
    fn test_provider_names() {
        let provider = StaticPolicyProvider::new(false, VulnerabilityPolicy::disabled());
        assert_eq!(provider.name(), "static");

        let store = StorePolicyProvider::new(Arc::new(MockDatabase::new()));
        assert_eq!(store.name(), "store");
    }
}
