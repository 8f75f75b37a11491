//! Content trust service clients
//!
//! - [`traits`]: The `TrustClient` trait consumed by the content trust stage
//! - [`notary`]: Notary (TUF) implementation

pub mod notary;
pub mod traits;

pub use notary::NotaryClient;
pub use traits::TrustClient;

#[cfg(test)]
pub use traits::MockTrustClient;
