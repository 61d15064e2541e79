//! Provider interfaces and the two production pipelines.

/// Provider traits, payload types, and provider-level errors.
pub mod traits;
/// Declarative render pipeline (Version 1) and its credit policy.
pub mod version1;
/// Chained AI-service pipeline (Version 2).
pub mod version2;
