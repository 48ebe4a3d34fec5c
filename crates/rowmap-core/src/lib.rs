//! Core types for rowmap.
//!
//! This crate provides the value-level foundations of the update pipeline:
//!
//! - `Value` for dynamically-typed column values
//! - `SqlType` for column store types and key compatibility
//! - `KeyComparer` / `ValueComparer` for key equality semantics
//! - `Error` for identity conflicts and metadata misconfiguration

pub mod comparer;
pub mod error;
pub mod types;
pub mod value;

pub use comparer::{CaseInsensitiveComparer, IntegerWidthComparer, KeyComparer, ValueComparer};
pub use error::{
    ConfigError, Error, IdentityConflictError, MetadataError, MetadataErrorKind, NullKeyValueError,
    Result,
};
pub use types::SqlType;
pub use value::Value;
