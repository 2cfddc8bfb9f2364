//! Core data models for the storage gateway.
//!
//! `Bucket` is the only locally persisted entity and maps to a database row
//! via `sqlx::FromRow`. The object types are transient projections of
//! remote responses and serialize naturally as JSON via `serde`.

pub mod bucket;
pub mod object;
