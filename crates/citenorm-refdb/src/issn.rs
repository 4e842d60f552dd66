//! ISSN identifiers as stored in the snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An ISSN in its compact (unhyphenated) form, e.g. `"00319406"`.
///
/// The same type is used for ISSN-Ls, which are ISSNs chosen to represent a
/// whole serial. Registry exports carry both `DDDD-DDDD` and `DDDDDDDD`
/// spellings; both are accepted and stored compact so that composite
/// `ISSN-YEAR-VOLUME` keys can be split on `-`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Issn(String);

/// Alias used where a value is known to be a linking ISSN.
pub type IssnL = Issn;

impl Issn {
    pub fn new(value: impl Into<String>) -> Self {
        Self::from(value.into())
    }

    /// The compact form used in snapshot tables and validation keys.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hyphenated display form: `"00319406"` → `"0031-9406"`.
    pub fn hyphenated(&self) -> String {
        match (self.0.get(..4), self.0.get(4..)) {
            (Some(head), Some(tail)) if !tail.is_empty() => format!("{head}-{tail}"),
            _ => self.0.clone(),
        }
    }
}

impl From<String> for Issn {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.len() == 9 && trimmed.as_bytes()[4] == b'-' {
            Issn(format!("{}{}", &trimmed[..4], &trimmed[5..]).to_uppercase())
        } else {
            Issn(trimmed.to_uppercase())
        }
    }
}

impl From<&str> for Issn {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Issn> for String {
    fn from(value: Issn) -> Self {
        value.0
    }
}

impl fmt::Display for Issn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hyphenated_input_is_stored_compact() {
        let issn = Issn::new("0031-9406");
        assert_eq!(issn.as_str(), "00319406");
        assert_eq!(issn.hyphenated(), "0031-9406");
    }

    #[test]
    fn check_digit_x_is_uppercased() {
        assert_eq!(Issn::new("1234-567x").as_str(), "1234567X");
    }

    #[test]
    fn short_values_are_left_alone() {
        assert_eq!(Issn::new("0001").hyphenated(), "0001");
        assert_eq!(Issn::new("00010").hyphenated(), "0001-0");
    }

    #[test]
    fn serde_uses_plain_strings() {
        let issn: Issn = serde_json::from_str("\"1414-431X\"").unwrap();
        assert_eq!(issn, Issn::new("1414431X"));
        assert_eq!(serde_json::to_string(&issn).unwrap(), "\"1414431X\"");
    }
}
