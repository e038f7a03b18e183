//! Localized text attached to concepts.

use serde::{Deserialize, Serialize};

use crate::validation::{check_required, ValidationErrors};

/// One name or description in a given locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub name: String,
    pub locale: String,
    /// Whether this is the preferred text for its locale.
    #[serde(default)]
    pub locale_preferred: bool,
}

impl LocalizedText {
    pub fn new(name: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locale: locale.into(),
            locale_preferred: false,
        }
    }

    /// Mark this entry as preferred in its locale.
    pub fn preferred(mut self) -> Self {
        self.locale_preferred = true;
        self
    }

    /// Validate an entry, reporting problems under `field`.
    pub fn validate_into(&self, errors: &mut ValidationErrors, field: &str) {
        check_required(errors, field, &self.name);
        check_required(errors, field, &self.locale);
    }
}

/// Pick the entry to display: the first one preferred in its locale, else
/// the first in list order.
pub fn display_text(texts: &[LocalizedText]) -> Option<&LocalizedText> {
    texts
        .iter()
        .find(|t| t.locale_preferred)
        .or_else(|| texts.first())
}

/// Accessors shared by everything that carries a list of names.
pub trait HasNames {
    fn names(&self) -> &[LocalizedText];

    fn display_name(&self) -> Option<&str> {
        display_text(self.names()).map(|t| t.name.as_str())
    }

    fn display_locale(&self) -> Option<&str> {
        display_text(self.names()).map(|t| t.locale.as_str())
    }
}
