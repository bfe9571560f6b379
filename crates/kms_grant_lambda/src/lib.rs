//! AWS-oriented adapters and handlers for the KMS grant custom resource.
//!
//! This crate owns runtime integration details (the grant lifecycle handler,
//! the CloudFormation envelope, KMS and response adapters, config and logging)
//! on top of the pure decisions in `kms_grant_core`.

pub mod adapters;
pub mod config;
pub mod handlers;
pub mod logging;
