//! Content trust stage
//!
//! Passes an image only when the trust service lists the requested tag as
//! signed for exactly the digest the backend returned.

use tracing::{debug, error};

use super::chain::{bounded, ChainSettings, PolicyDecision};
use super::PolicyProvider;
use crate::error::PolicyError;
use crate::models::{ImageDescriptor, SignedTarget};
use crate::trust::TrustClient;

pub(crate) const NOT_SIGNED: &str = "The image is not signed in Notary.";

pub(crate) const TRUST_FAILURE: &str = "Failed in communication with Notary please check the log";

pub(crate) const PROVIDER_TIMEOUT: &str = "Timed out reading the project policy, please check the log";

pub(super) async fn check(
    image: &ImageDescriptor,
    provider: &dyn PolicyProvider,
    trust: &dyn TrustClient,
    settings: &ChainSettings,
) -> PolicyDecision {
    let enabled = match bounded(
        settings.store_timeout,
        "policy provider",
        provider.content_trust_enabled(&image.project),
    )
    .await
    {
        Ok(enabled) => enabled,
        Err(e) => {
            error!(project = %image.project, error = %e, "Failed to read content trust setting");
            return PolicyDecision::fail(PROVIDER_TIMEOUT);
        }
    };

    if !enabled {
        debug!(project = %image.project, "Content trust disabled for project");
        return PolicyDecision::Continue;
    }

    let targets = match bounded(
        settings.trust_timeout,
        "trust service",
        trust.list_signed_targets(&image.repository),
    )
    .await
    .and_then(|listed| listed.map_err(PolicyError::from))
    {
        Ok(targets) => targets,
        Err(e) => {
            error!(repository = %image.repository, error = %e, "Failed to list signed targets");
            return PolicyDecision::fail(TRUST_FAILURE);
        }
    };

    if is_signed(&targets, image) {
        debug!(repository = %image.repository, reference = %image.reference, "Image is signed");
        PolicyDecision::Continue
    } else {
        PolicyDecision::deny(NOT_SIGNED)
    }
}

/// The target for the requested tag exists and carries the pulled digest
fn is_signed(targets: &[SignedTarget], image: &ImageDescriptor) -> bool {
    targets
        .iter()
        .find(|t| t.tag == image.reference)
        .is_some_and(|t| t.digest == image.digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrustError;
    use crate::policy::MockPolicyProvider;
    use crate::trust::MockTrustClient;
    use axum::http::StatusCode;
    use std::time::Duration;

    fn image() -> ImageDescriptor {
        ImageDescriptor {
            repository: "proj/repo".to_string(),
            reference: "v1".to_string(),
            project: "proj".to_string(),
            digest: "sha256:aaaa".to_string(),
        }
    }

    fn enforcing() -> MockPolicyProvider {
        let mut provider = MockPolicyProvider::new();
        provider
            .expect_content_trust_enabled()
            .withf(|project| project == "proj")
            .returning(|_| true);
        provider
    }

    fn trust_returning(targets: Vec<SignedTarget>) -> MockTrustClient {
        let mut trust = MockTrustClient::new();
        trust
            .expect_list_signed_targets()
            .withf(|repo| repo == "proj/repo")
            .returning(move |_| Ok(targets.clone()));
        trust
    }

    // Test 1: Project setting disables the check
    #[tokio::test]
    async fn test_disabled_for_project() {
        let mut provider = MockPolicyProvider::new();
        provider.expect_content_trust_enabled().returning(|_| false);

        let decision = check(
            &image(),
            &provider,
            &MockTrustClient::new(),
            &ChainSettings::default(),
        )
        .await;
        assert_eq!(decision, PolicyDecision::Continue);
    }

    // Test 2: Matching tag and digest passes
    #[tokio::test]
    async fn test_signed_image_passes() {
        let trust = trust_returning(vec![
            SignedTarget::new("latest", "sha256:bbbb"),
            SignedTarget::new("v1", "sha256:aaaa"),
        ]);

        let decision = check(&image(), &enforcing(), &trust, &ChainSettings::default()).await;
        assert_eq!(decision, PolicyDecision::Continue);
    }

    // Test 3: Missing tag is denied
    #[tokio::test]
    async fn test_unsigned_tag_denied() {
        let trust = trust_returning(vec![SignedTarget::new("latest", "sha256:aaaa")]);

        let decision = check(&image(), &enforcing(), &trust, &ChainSettings::default()).await;
        assert_eq!(decision, PolicyDecision::deny(NOT_SIGNED));
    }

    // Test 4: Signed tag with a different digest is denied
    #[tokio::test]
    async fn test_digest_mismatch_denied() {
        let trust = trust_returning(vec![SignedTarget::new("v1", "sha256:ffff")]);

        let decision = check(&image(), &enforcing(), &trust, &ChainSettings::default()).await;
        match decision {
            PolicyDecision::Deny { status, message } => {
                assert_eq!(status, StatusCode::PRECONDITION_FAILED);
                assert!(message.contains("not signed"));
            }
            other => panic!("Expected Deny, got {:?}", other),
        }
    }

    // Test 5: Communication error fails with a generic message
    #[tokio::test]
    async fn test_trust_error_fails() {
        let mut trust = MockTrustClient::new();
        trust
            .expect_list_signed_targets()
            .returning(|_| Err(TrustError::Status(503)));

        let decision = check(&image(), &enforcing(), &trust, &ChainSettings::default()).await;
        assert_eq!(decision, PolicyDecision::fail(TRUST_FAILURE));
    }

    struct SlowTrust;

    #[async_trait::async_trait]
    impl TrustClient for SlowTrust {
        fn name(&self) -> &str {
            "slow"
        }

        async fn list_signed_targets(&self, _repository: &str) -> Result<Vec<SignedTarget>, TrustError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
    }

    // Test 6: Slow trust service fails instead of blocking
    #[tokio::test]
    async fn test_trust_timeout_fails() {
        let settings = ChainSettings {
            trust_timeout: Duration::from_millis(20),
            ..ChainSettings::default()
        };

        let decision = check(&image(), &enforcing(), &SlowTrust, &settings).await;
        assert_eq!(decision, PolicyDecision::fail(TRUST_FAILURE));
    }

    // Test 7: Empty target list is denied
    #[test]
    fn test_is_signed_empty() {
        assert!(!is_signed(&[], &image()));
    }

    struct SlowProvider;

    #[async_trait::async_trait]
    impl PolicyProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn content_trust_enabled(&self, _project: &str) -> bool {
            tokio::time::sleep(Duration::from_secs(5)).await;
            true
        }

        async fn vulnerability_policy(&self, _project: &str) -> crate::policy::VulnerabilityPolicy {
            crate::policy::VulnerabilityPolicy::strictest()
        }
    }

    // Test 8: Slow policy provider fails before the trust service is asked
    #[tokio::test]
    async fn test_provider_timeout_fails() {
        let settings = ChainSettings {
            store_timeout: Duration::from_millis(20),
            ..ChainSettings::default()
        };

        let decision = check(&image(), &SlowProvider, &MockTrustClient::new(), &settings).await;
        assert_eq!(decision, PolicyDecision::fail(PROVIDER_TIMEOUT));
        assert_eq!(
            decision.status_and_message().map(|(status, _)| status),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        );
    }
}
