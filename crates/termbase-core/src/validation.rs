//! Identity and field validation rules.
//!
//! Validation never raises: every check appends to a [`ValidationErrors`]
//! map keyed by field name so a caller sees all violations at once. An empty
//! map means success.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pattern every mnemonic must match.
pub const NAMESPACE_PATTERN: &str = r"^[a-zA-Z0-9\-.]+$";

static NAMESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(NAMESPACE_PATTERN).expect("namespace pattern is a valid regex"));

/// Key for errors that concern the record as a whole (uniqueness, self links).
pub const ALL_FIELDS: &str = "__all__";

/// Key for storage failures and other errors not tied to a field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Check a mnemonic against [`NAMESPACE_PATTERN`].
pub fn is_valid_mnemonic(value: &str) -> bool {
    NAMESPACE_REGEX.is_match(value)
}

/// Field name → human-readable messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map holding a single message.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Append a message under `field`.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Fold another map into this one, keeping message order.
    pub fn merge(&mut self, other: ValidationErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with at least one message.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(", "))?;
        }
        Ok(())
    }
}

/// Self-contained field validation, the part of a record's checks that
/// needs no storage access.
pub trait Validate {
    fn validate(&self) -> ValidationErrors;
}

/// Validate a required mnemonic field.
pub fn check_mnemonic(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.is_empty() {
        errors.add(field, "This field cannot be blank.");
    } else if !is_valid_mnemonic(value) {
        errors.add(field, "Enter a valid value.");
    }
}

/// Validate a required free-text field.
pub fn check_required(errors: &mut ValidationErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field cannot be blank.");
    }
}
