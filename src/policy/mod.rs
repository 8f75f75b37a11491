//! Admission policy
//!
//! - [`provider`]: Per-project settings (`PolicyProvider` and its static and
//!   store-backed implementations)
//! - [`chain`]: Ordered stage evaluation and decisions
//! - `content_trust` / `vulnerability`: The two stages

pub mod chain;
mod content_trust;
pub mod provider;
mod vulnerability;

pub use chain::{ChainSettings, PolicyChain, PolicyDecision, Stage, Verdict};
pub use provider::{PolicyProvider, StaticPolicyProvider, StorePolicyProvider, VulnerabilityPolicy};

#[cfg(test)]
pub use provider::MockPolicyProvider;
