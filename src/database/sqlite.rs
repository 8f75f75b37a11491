//! SQLite implementation of the Database trait
//!
//! This module provides a SQLite-based implementation of the Database trait
//! using rusqlite and tokio-rusqlite for async operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use super::migrations::CREATE_SCHEMA;
use super::Database;
use crate::error::DbError;
use crate::models::{ProjectPolicy, ScanOverview, Severity};

/// SQLite database implementation
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Create a new SQLite database connection
    ///
    /// Use `:memory:` for in-memory database or a file path for persistent storage.
    pub async fn new(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path).await?;

        // Run migrations
        conn.call(|conn| {
            conn.execute_batch(CREATE_SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Create a new in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self, DbError> {
        Self::new(":memory:").await
    }
}

#[async_trait]
impl Database for SqliteDatabase {
    // =========================================================================
    // Project operations
    // =========================================================================

    async fn get_project_policy(&self, name: &str) -> Result<Option<ProjectPolicy>, DbError> {
        let name = name.to_string();

        let policy = self
            .conn
            .call(move |conn| {
                let policy = conn
                    .query_row(
                        r#"
                        SELECT name, enable_content_trust, prevent_vulnerable_images, severity
                        FROM projects
                        WHERE name = ?1
                        "#,
                        [&name],
                        |row| {
                            Ok(ProjectPolicy {
                                name: row.get(0)?,
                                enable_content_trust: row.get(1)?,
                                prevent_vulnerable_images: row.get(2)?,
                                severity: severity_column(row, 3)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(policy)
            })
            .await?;

        Ok(policy)
    }

    async fn upsert_project_policy(&self, policy: &ProjectPolicy) -> Result<(), DbError> {
        let name = policy.name.clone();
        let content_trust = policy.enable_content_trust;
        let prevent = policy.prevent_vulnerable_images;
        let severity = policy.severity.to_string();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO projects
                    (name, enable_content_trust, prevent_vulnerable_images, severity, updated_at)
                    VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
                    ON CONFLICT(name) DO UPDATE SET
                        enable_content_trust = excluded.enable_content_trust,
                        prevent_vulnerable_images = excluded.prevent_vulnerable_images,
                        severity = excluded.severity,
                        updated_at = CURRENT_TIMESTAMP
                    "#,
                    rusqlite::params![name, content_trust, prevent, severity],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn list_project_policies(&self) -> Result<Vec<ProjectPolicy>, DbError> {
        let policies = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT name, enable_content_trust, prevent_vulnerable_images, severity
                    FROM projects
                    ORDER BY name
                    "#,
                )?;

                let policies = stmt
                    .query_map([], |row| {
                        Ok(ProjectPolicy {
                            name: row.get(0)?,
                            enable_content_trust: row.get(1)?,
                            prevent_vulnerable_images: row.get(2)?,
                            severity: severity_column(row, 3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(policies)
            })
            .await?;

        Ok(policies)
    }

    // =========================================================================
    // Scan overview operations
    // =========================================================================

    async fn get_scan_overview(&self, digest: &str) -> Result<Option<ScanOverview>, DbError> {
        let digest = digest.to_string();

        let overview = self
            .conn
            .call(move |conn| {
                let overview = conn
                    .query_row(
                        r#"
                        SELECT digest, severity, components_total, updated_at
                        FROM scan_overviews
                        WHERE digest = ?1
                        "#,
                        [&digest],
                        |row| {
                            Ok(ScanOverview {
                                digest: row.get(0)?,
                                severity: severity_column(row, 1)?,
                                components_total: row
                                    .get::<_, Option<i64>>(2)?
                                    .map(|n| n.max(0) as u64),
                                updated_at: parse_datetime(row.get::<_, Option<String>>(3)?),
                            })
                        },
                    )
                    .optional()?;
                Ok(overview)
            })
            .await?;

        Ok(overview)
    }

    async fn upsert_scan_overview(&self, overview: &ScanOverview) -> Result<(), DbError> {
        let digest = overview.digest.clone();
        let severity = overview.severity.to_string();
        let components_total = overview.components_total.map(|n| n as i64);

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO scan_overviews
                    (digest, severity, components_total, updated_at)
                    VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
                    "#,
                    rusqlite::params![digest, severity, components_total],
                )?;
                Ok(())
            })
            .await?;

        Ok(())
    }
}

/// Read a stored severity; an unrecognised name is a conversion error
fn severity_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Severity> {
    let name: String = row.get(idx)?;
    name.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

/// Parse a stored timestamp (RFC 3339 or SQLite's default format)
fn parse_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                    .ok()
                    .map(|dt| dt.and_utc())
            })
    })
}
