//! Database layer for registry-admission
//!
//! Project policies (the tenant store) and scan overviews (the vulnerability
//! store) live behind one trait with a SQLite implementation.

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteDatabase;

use async_trait::async_trait;

use crate::error::DbError;
use crate::models::{ProjectPolicy, ScanOverview};

/// Database trait for data persistence
///
/// It uses `async_trait` for async methods and `mockall::automock` for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Database: Send + Sync {
    // =========================================================================
    // Project operations
    // =========================================================================

    /// Get the admission settings of a project
    async fn get_project_policy(&self, name: &str) -> Result<Option<ProjectPolicy>, DbError>;

    /// Insert or replace a project's admission settings
    async fn upsert_project_policy(&self, policy: &ProjectPolicy) -> Result<(), DbError>;

    /// List all projects
    async fn list_project_policies(&self) -> Result<Vec<ProjectPolicy>, DbError>;

    // =========================================================================
    // Scan overview operations
    // =========================================================================

    /// Get the scan overview recorded for an image digest
    async fn get_scan_overview(&self, digest: &str) -> Result<Option<ScanOverview>, DbError>;

    /// Insert or replace the scan overview for a digest
    async fn upsert_scan_overview(&self, overview: &ScanOverview) -> Result<(), DbError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    // Test 1: MockDatabase returns a project policy
    #[tokio::test]
    async fn test_mock_database_get_project_policy() {
        let mut mock = MockDatabase::new();

        mock.expect_get_project_policy()
            .withf(|name| name == "proj")
            .returning(|name| Ok(Some(ProjectPolicy::new(name).with_content_trust(true))));

        let policy = mock.get_project_policy("proj").await.unwrap().unwrap();
        assert_eq!(policy.name, "proj");
        assert!(policy.enable_content_trust);
    }

    // Test 2: MockDatabase reports a missing overview
    #[tokio::test]
    async fn test_mock_database_missing_overview() {
        let mut mock = MockDatabase::new();

        mock.expect_get_scan_overview().returning(|_| Ok(None));

        let result = mock.get_scan_overview("sha256:none").await;
        assert!(result.unwrap().is_none());
    }

    // Test 3: MockDatabase propagates errors
    #[tokio::test]
    async fn test_mock_database_error() {
        let mut mock = MockDatabase::new();

        mock.expect_get_scan_overview()
            .returning(|_| Err(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows)));

        let result = mock.get_scan_overview("sha256:abc").await;
        assert!(matches!(result, Err(DbError::Sqlite(_))));
    }

    // Test 4: MockDatabase upsert
    #[tokio::test]
    async fn test_mock_database_upsert_overview() {
        let mut mock = MockDatabase::new();

        mock.expect_upsert_scan_overview()
            .withf(|o| o.severity == Severity::High)
            .returning(|_| Ok(()));

        let overview = ScanOverview::new("sha256:abc", Severity::High);
        assert!(mock.upsert_scan_overview(&overview).await.is_ok());
    }
}
