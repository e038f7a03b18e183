//! # termbase-core
//!
//! Core types, traits, and validation rules for the termbase terminology
//! backend.
//!
//! This crate holds the data model (organizations, user profiles, sources,
//! concepts and their version records), the localized-text model, the
//! mnemonic and field validation rules, and the storage traits that the
//! persistence layer in `termbase-db` is written against. It performs no I/O.

pub mod config;
pub mod defaults;
pub mod error;
pub mod localized;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;
pub mod validation;

// Re-export commonly used types at crate root
pub use config::{ConfigError, TermbaseConfig};
pub use error::{Error, Result};
pub use localized::{display_text, HasNames, LocalizedText};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
pub use validation::{
    is_valid_mnemonic, Validate, ValidationErrors, ALL_FIELDS, NAMESPACE_PATTERN,
    NON_FIELD_ERRORS,
};
