//! Registry-facing request handling
//!
//! - [`matcher`]: Recognizes manifest pulls
//! - [`forwarder`]: Backend client, streaming and buffered
//! - [`response`]: JSON error envelope
//! - [`admission`]: The per-request flow tying them to the policy chain

pub mod admission;
pub mod forwarder;
pub mod matcher;
pub mod response;

pub use admission::{AdmissionService, Outcome};
pub use forwarder::{BufferedResponse, UpstreamClient};
pub use matcher::match_pull_manifest;
pub use response::JsonError;
