//! Shared KMS grant custom resource domain primitives.
//!
//! This crate owns the lifecycle decisions for a grant-backed custom resource:
//! property contracts, validation, replacement and release planning, and the
//! revoke/retire fallback combinator. It intentionally excludes AWS SDK and
//! Lambda runtime concerns, which live in `kms_grant_lambda`.

pub mod contract;
pub mod fallback;
pub mod lifecycle;
pub mod validation;
