//! Database migrations for registry-admission
//!
//! This module contains SQL migrations for the SQLite database schema.

/// SQL statement to create the initial database schema
pub const CREATE_SCHEMA: &str = r#"
-- Project admission settings
CREATE TABLE IF NOT EXISTS projects (
    name TEXT PRIMARY KEY,
    enable_content_trust INTEGER NOT NULL DEFAULT 0,
    prevent_vulnerable_images INTEGER NOT NULL DEFAULT 0,
    severity TEXT NOT NULL DEFAULT 'Unknown',
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- Image scan overviews keyed by manifest digest
CREATE TABLE IF NOT EXISTS scan_overviews (
    digest TEXT PRIMARY KEY,
    severity TEXT NOT NULL,
    components_total INTEGER,
    updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;
