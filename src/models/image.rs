//! Image identity models
//!
//! `ManifestPull` is what the request matcher extracts from a URL;
//! `ImageDescriptor` is the record built once the backend confirmed the
//! manifest exists and returned its digest.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A GET request for `/v2/<repository>/manifests/<reference>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPull {
    /// Full repository path, e.g. `library/nginx` or `team/app/api`
    pub repository: String,

    /// Tag or digest
    pub reference: String,
}

impl ManifestPull {
    /// Create a new manifest pull
    pub fn new(repository: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            reference: reference.into(),
        }
    }

    /// Split the repository into `(project, remaining repository path)`
    ///
    /// The project is everything before the first `/`. A repository without
    /// a `/` cannot be attributed to a project.
    pub fn split_project(&self) -> Result<(&str, &str), ParseError> {
        match self.repository.split_once('/') {
            Some((project, rest)) if !project.is_empty() && !rest.is_empty() => {
                Ok((project, rest))
            }
            _ => Err(ParseError::BadRepositoryName(self.repository.clone())),
        }
    }

    /// Build the descriptor for this pull once the backend returned a digest
    pub fn describe(&self, digest: impl Into<String>) -> Result<ImageDescriptor, ParseError> {
        let (project, _) = self.split_project()?;
        Ok(ImageDescriptor {
            repository: self.repository.clone(),
            reference: self.reference.clone(),
            project: project.to_string(),
            digest: digest.into(),
        })
    }
}

/// The artifact under evaluation for a single intercepted request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Full repository path
    pub repository: String,

    /// Tag or digest the client asked for
    pub reference: String,

    /// Owning project (tenant)
    pub project: String,

    /// Content digest reported by the backend (`Docker-Content-Digest`)
    pub digest: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Project is the first path component
    #[test]
    fn test_split_project() {
        let pull = ManifestPull::new("proj/repo", "v1");
        assert_eq!(pull.split_project().unwrap(), ("proj", "repo"));

        let nested = ManifestPull::new("team/app/api", "latest");
        assert_eq!(nested.split_project().unwrap(), ("team", "app/api"));
    }

    // Test 2: Single-segment repositories are rejected
    #[test]
    fn test_split_project_requires_separator() {
        let pull = ManifestPull::new("singletoken", "latest");
        assert_eq!(
            pull.split_project().unwrap_err(),
            ParseError::BadRepositoryName("singletoken".to_string())
        );
    }

    // Test 3: describe carries all four fields
    #[test]
    fn test_describe() {
        let pull = ManifestPull::new("proj/repo", "v1");
        let img = pull.describe("sha256:abc").unwrap();

        assert_eq!(img.repository, "proj/repo");
        assert_eq!(img.reference, "v1");
        assert_eq!(img.project, "proj");
        assert_eq!(img.digest, "sha256:abc");
    }
}
