//! Project policy and scan overview records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Severity;

/// Per-project admission settings, as persisted in the tenant store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectPolicy {
    /// Project name
    pub name: String,

    /// Only signed images may be pulled
    pub enable_content_trust: bool,

    /// Block images whose scan severity reaches `severity`
    pub prevent_vulnerable_images: bool,

    /// Threshold for `prevent_vulnerable_images`
    pub severity: Severity,
}

impl ProjectPolicy {
    /// Create a policy with both checks disabled
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enable_content_trust: false,
            prevent_vulnerable_images: false,
            severity: Severity::Unknown,
        }
    }

    /// Enable or disable content trust
    pub fn with_content_trust(mut self, enabled: bool) -> Self {
        self.enable_content_trust = enabled;
        self
    }

    /// Enable vulnerability prevention at the given threshold
    pub fn with_vulnerability_threshold(mut self, severity: Severity) -> Self {
        self.prevent_vulnerable_images = true;
        self.severity = severity;
        self
    }
}

/// Stored result of the most recent scan of an image digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOverview {
    /// Image digest the scan belongs to
    pub digest: String,

    /// Highest severity found
    pub severity: Severity,

    /// Number of vulnerable components, if reported
    pub components_total: Option<u64>,

    /// When the overview was last written
    pub updated_at: Option<DateTime<Utc>>,
}

impl ScanOverview {
    /// Create a new overview
    pub fn new(digest: impl Into<String>, severity: Severity) -> Self {
        Self {
            digest: digest.into(),
            severity,
            components_total: None,
            updated_at: None,
        }
    }

    /// Set the vulnerable component count
    pub fn with_components_total(mut self, total: u64) -> Self {
        self.components_total = Some(total);
        self
    }
}

/// A tag signed in the trust service and the digest it was signed for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTarget {
    /// Signed tag
    pub tag: String,

    /// Digest in `sha256:<hex>` form
    pub digest: String,
}

impl SignedTarget {
    /// Create a new signed target
    pub fn new(tag: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            digest: digest.into(),
        }
    }
}
