//! Vulnerability severity levels

use serde::{Deserialize, Serialize};

/// Severity level reported by the vulnerability scanner
///
/// Variants are declared lowest first; the derived `Ord` is the threshold
/// comparison used by the vulnerability policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Severity could not be determined
    #[default]
    Unknown,
    /// Negligible
    Negligible,
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
    /// Critical
    Critical,
}

impl Severity {
    /// All levels in ascending order
    pub const ALL: [Severity; 6] = [
        Severity::Unknown,
        Severity::Negligible,
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    /// Parse a scanner severity name, falling back to `Unknown`
    ///
    /// Matching is case-insensitive. `Defcon1` is the scanner's name for
    /// the level above critical and maps to `Critical`.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Severity::Unknown)
    }

    /// Canonical name, as stored and displayed
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "Unknown",
            Severity::Negligible => "Negligible",
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unknown" => Ok(Severity::Unknown),
            "negligible" => Ok(Severity::Negligible),
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" | "defcon1" => Ok(Severity::Critical),
            _ => Err(format!("Invalid severity: {}", s)),
        }
    }
}
