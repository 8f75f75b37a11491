//! registry-admission - Admission control for container registry manifest pulls
//!
//! Sits in front of a registry backend, buffers manifest pulls and releases
//! them only when the content trust and vulnerability policies of the owning
//! project allow it. Everything else is passed through unchanged.

pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod otel;
pub mod policy;
pub mod proxy;
pub mod server;
pub mod trust;
