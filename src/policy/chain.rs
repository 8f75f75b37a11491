//! Ordered admission stages
//!
//! A [`PolicyChain`] walks a fixed list of [`Stage`]s for one pulled image.
//! Each stage returns a [`PolicyDecision`]; the first decision that is not
//! `Continue` ends the walk.

use axum::http::StatusCode;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{content_trust, vulnerability, PolicyProvider};
use crate::config::Config;
use crate::database::Database;
use crate::error::PolicyError;
use crate::models::ImageDescriptor;
use crate::trust::TrustClient;

/// Admission checks, in the order the chain runs them by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Pulled tag must be signed for the returned digest
    ContentTrust,
    /// Scan severity must stay below the project threshold
    Vulnerability,
}

impl Stage {
    /// Default stage order
    pub const DEFAULT_ORDER: [Stage; 2] = [Stage::ContentTrust, Stage::Vulnerability];

    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::ContentTrust => "content_trust",
            Stage::Vulnerability => "vulnerability",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Hand the image to the next stage
    Continue,
    /// The image violates a policy, or the policy cannot be verified
    Deny { status: StatusCode, message: String },
    /// A collaborator failed
    Fail { status: StatusCode, message: String },
}

impl PolicyDecision {
    /// Policy denial (412)
    pub fn deny(message: impl Into<String>) -> Self {
        Self::Deny {
            status: StatusCode::PRECONDITION_FAILED,
            message: message.into(),
        }
    }

    /// Infrastructure failure (500)
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Client-visible status and message of a terminal decision
    pub fn status_and_message(&self) -> Option<(StatusCode, &str)> {
        match self {
            Self::Continue => None,
            Self::Deny { status, message } | Self::Fail { status, message } => {
                Some((*status, message.as_str()))
            }
        }
    }
}

/// Result of walking the chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Final decision, `Continue` if every stage passed
    pub decision: PolicyDecision,

    /// Stage that ended the walk
    pub stage: Option<Stage>,
}

impl Verdict {
    fn admitted() -> Self {
        Self {
            decision: PolicyDecision::Continue,
            stage: None,
        }
    }
}

/// Read-only switches and bounds shared by every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSettings {
    /// Global vulnerability enforcement switch
    pub scan_enabled: bool,

    /// Bound on each trust service call
    pub trust_timeout: Duration,

    /// Bound on each policy provider and overview store call
    pub store_timeout: Duration,
}

impl ChainSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan_enabled: config.scan.enabled,
            trust_timeout: Duration::from_secs(config.trust.timeout_secs),
            store_timeout: Duration::from_secs(config.policy.timeout_secs),
        }
    }
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            scan_enabled: false,
            trust_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
        }
    }
}

/// Runs the admission stages for a pulled image
///
/// Content trust is globally enabled exactly when a trust client is set.
pub struct PolicyChain<D: Database> {
    stages: Vec<Stage>,
    provider: Arc<dyn PolicyProvider>,
    trust: Option<Arc<dyn TrustClient>>,
    store: Arc<D>,
    settings: ChainSettings,
}

impl<D: Database> PolicyChain<D> {
    /// Create a chain running the default stages with content trust disabled
    pub fn new(provider: Arc<dyn PolicyProvider>, store: Arc<D>, settings: ChainSettings) -> Self {
        Self {
            stages: Stage::DEFAULT_ORDER.to_vec(),
            provider,
            trust: None,
            store,
            settings,
        }
    }

    /// Enable content trust, verified against `client`
    pub fn with_trust_client(mut self, client: Arc<dyn TrustClient>) -> Self {
        self.trust = Some(client);
        self
    }

    /// Replace the stage list
    pub fn with_stages(mut self, stages: Vec<Stage>) -> Self {
        self.stages = stages;
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Evaluate every stage against `image`
    ///
    /// Without a descriptor every stage continues and no collaborator is
    /// consulted.
    pub async fn evaluate(&self, image: Option<&ImageDescriptor>) -> Verdict {
        let Some(image) = image else {
            return Verdict::admitted();
        };

        for stage in &self.stages {
            let decision = self.run_stage(*stage, image).await;
            match &decision {
                PolicyDecision::Continue => {
                    debug!(stage = %stage, repository = %image.repository, "Stage passed");
                    continue;
                }
                PolicyDecision::Deny { status, message } => {
                    warn!(
                        stage = %stage,
                        repository = %image.repository,
                        reference = %image.reference,
                        digest = %image.digest,
                        status = status.as_u16(),
                        message = %message,
                        "Image denied"
                    );
                }
                PolicyDecision::Fail { status, .. } => {
                    error!(
                        stage = %stage,
                        repository = %image.repository,
                        reference = %image.reference,
                        status = status.as_u16(),
                        "Stage failed"
                    );
                }
            }
            return Verdict {
                decision,
                stage: Some(*stage),
            };
        }

        Verdict::admitted()
    }

    async fn run_stage(&self, stage: Stage, image: &ImageDescriptor) -> PolicyDecision {
        match stage {
            Stage::ContentTrust => match &self.trust {
                Some(trust) => {
                    content_trust::check(
                        image,
                        self.provider.as_ref(),
                        trust.as_ref(),
                        &self.settings,
                    )
                    .await
                }
                None => PolicyDecision::Continue,
            },
            Stage::Vulnerability => {
                if !self.settings.scan_enabled {
                    return PolicyDecision::Continue;
                }
                vulnerability::check(
                    image,
                    self.provider.as_ref(),
                    self.store.as_ref(),
                    &self.settings,
                )
                .await
            }
        }
    }
}

/// Await `fut`, giving up after `limit`
pub(crate) async fn bounded<F, T>(
    limit: Duration,
    collaborator: &'static str,
    fut: F,
) -> Result<T, PolicyError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| PolicyError::Timeout {
            collaborator,
            secs: limit.as_secs(),
        })
}
