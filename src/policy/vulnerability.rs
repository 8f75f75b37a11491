//! Vulnerability stage
//!
//! Blocks images whose stored scan severity reaches the project threshold.
//! Missing or unreadable overviews block the pull as well.

use tracing::{debug, error, warn};

use super::chain::{bounded, ChainSettings, PolicyDecision};
use super::PolicyProvider;
use crate::database::Database;
use crate::models::{ImageDescriptor, Severity};

pub(crate) const OVERVIEW_LOOKUP_FAILED: &str = "Failed to get ImgScanOverview.";

pub(crate) const OVERVIEW_MISSING: &str = "Cannot get the image scan overview info.";

pub(crate) const STORE_TIMEOUT: &str = "Timed out reading the image scan overview, please check the log";

pub(super) async fn check<D: Database>(
    image: &ImageDescriptor,
    provider: &dyn PolicyProvider,
    store: &D,
    settings: &ChainSettings,
) -> PolicyDecision {
    let policy = match bounded(
        settings.store_timeout,
        "policy provider",
        provider.vulnerability_policy(&image.project),
    )
    .await
    {
        Ok(policy) => policy,
        Err(e) => {
            error!(project = %image.project, error = %e, "Failed to read vulnerability policy");
            return PolicyDecision::fail(super::content_trust::PROVIDER_TIMEOUT);
        }
    };

    if !policy.enabled {
        debug!(project = %image.project, "Vulnerability prevention disabled for project");
        return PolicyDecision::Continue;
    }

    let overview = match bounded(
        settings.store_timeout,
        "overview store",
        store.get_scan_overview(&image.digest),
    )
    .await
    {
        Ok(Ok(Some(overview))) => overview,
        Ok(Ok(None)) => {
            warn!(digest = %image.digest, "No scan overview on record");
            return PolicyDecision::deny(OVERVIEW_MISSING);
        }
        Ok(Err(e)) => {
            error!(digest = %image.digest, error = %e, "Failed to get scan overview");
            return PolicyDecision::deny(OVERVIEW_LOOKUP_FAILED);
        }
        Err(e) => {
            error!(digest = %image.digest, error = %e, "Failed to get scan overview");
            return PolicyDecision::fail(STORE_TIMEOUT);
        }
    };

    if overview.severity >= policy.threshold {
        PolicyDecision::deny(severity_message(overview.severity, policy.threshold))
    } else {
        debug!(
            digest = %image.digest,
            severity = %overview.severity,
            threshold = %policy.threshold,
            "Image severity below threshold"
        );
        PolicyDecision::Continue
    }
}

fn severity_message(image: Severity, threshold: Severity) -> String {
    format!(
        "The severity of vulnerability of the image: {:?} is equal or higher than the threshold in project setting: {:?}.",
        image.as_str(),
        threshold.as_str()
    )
}
