//! Domain models for registry-admission

pub mod image;
pub mod project;
pub mod severity;

pub use image::{ImageDescriptor, ManifestPull};
pub use project::{ProjectPolicy, ScanOverview, SignedTarget};
pub use severity::Severity;
