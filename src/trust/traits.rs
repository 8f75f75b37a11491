//! Trust service trait definition

use async_trait::async_trait;

use crate::error::TrustError;
use crate::models::SignedTarget;

/// Read access to the signed targets of a repository
///
/// Implementations talk to the signing service; the admission chain only
/// needs the list of `(tag, digest)` pairs that have been signed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrustClient: Send + Sync {
    /// Get the client name
    fn name(&self) -> &str;

    /// List every signed target registered under `repository`
    ///
    /// # Returns
    ///
    /// - `Ok(vec![])` when the repository has never been signed
    /// - `Err(TrustError)` when the service could not be queried
    async fn list_signed_targets(&self, repository: &str) -> Result<Vec<SignedTarget>, TrustError>;
}
