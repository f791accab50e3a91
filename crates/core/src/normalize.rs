//! Sort-form normalization for string fields
//!
//! A normalized alias sorts a string field by a derived representation
//! (lowercased and/or diacritic-folded) without touching the stored or
//! searchable form of the field.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// How a string value is turned into its sort form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StringHandling {
    /// Raw indexed term, case sensitive
    #[default]
    Standard,
    /// Lowercased
    Lowercase,
    /// Diacritics removed and compatibility forms expanded (`Blāh` sorts
    /// as `Blah`, `ﬁle` as `file`)
    Folding,
    /// Lowercased and diacritics removed
    LowercaseFolding,
}

impl StringHandling {
    /// Produce the sort form of `value`
    pub fn apply(self, value: &str) -> String {
        match self {
            StringHandling::Standard => value.to_string(),
            StringHandling::Lowercase => value.to_lowercase(),
            StringHandling::Folding => fold(value),
            StringHandling::LowercaseFolding => fold(value).to_lowercase(),
        }
    }
}

fn fold(value: &str) -> String {
    value.nfkd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}
