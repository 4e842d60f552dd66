//! Provenance status codes.
//!
//! The integer values are a persisted contract: downstream consumers branch
//! on stored codes, so they must never be renumbered.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ValidationTier;
use crate::matching::MatchMode;
use crate::validation::VolumeMode;

/// How a citation's canonical journal was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum StatusCode {
    NotNormalized = 0,
    /// Single-candidate exact title match; no validation needed.
    Exact = 1,
    ExactValidated = 2,
    ExactValidatedLr = 3,
    ExactValidatedLrMl1 = 4,
    ExactVolumeInferredValidated = 5,
    ExactVolumeInferredValidatedLr = 6,
    ExactVolumeInferredValidatedLrMl1 = 7,
    FuzzyValidated = 8,
    FuzzyValidatedLr = 9,
    FuzzyValidatedLrMl1 = 10,
    FuzzyVolumeInferredValidated = 11,
    FuzzyVolumeInferredValidatedLr = 12,
    FuzzyVolumeInferredValidatedLrMl1 = 13,
}

impl StatusCode {
    pub const ALL: [StatusCode; 14] = [
        StatusCode::NotNormalized,
        StatusCode::Exact,
        StatusCode::ExactValidated,
        StatusCode::ExactValidatedLr,
        StatusCode::ExactValidatedLrMl1,
        StatusCode::ExactVolumeInferredValidated,
        StatusCode::ExactVolumeInferredValidatedLr,
        StatusCode::ExactVolumeInferredValidatedLrMl1,
        StatusCode::FuzzyValidated,
        StatusCode::FuzzyValidatedLr,
        StatusCode::FuzzyValidatedLrMl1,
        StatusCode::FuzzyVolumeInferredValidated,
        StatusCode::FuzzyVolumeInferredValidatedLr,
        StatusCode::FuzzyVolumeInferredValidatedLrMl1,
    ];

    /// Status for a result obtained through year/volume validation.
    pub fn validated(match_mode: MatchMode, volume: VolumeMode, tier: ValidationTier) -> Self {
        use MatchMode::{Exact, Fuzzy};
        use ValidationTier::{Default, Lr, LrMl1};
        use VolumeMode::{Inferred, Original};

        match (match_mode, volume, tier) {
            (Exact, Original, Default) => StatusCode::ExactValidated,
            (Exact, Original, Lr) => StatusCode::ExactValidatedLr,
            (Exact, Original, LrMl1) => StatusCode::ExactValidatedLrMl1,
            (Exact, Inferred, Default) => StatusCode::ExactVolumeInferredValidated,
            (Exact, Inferred, Lr) => StatusCode::ExactVolumeInferredValidatedLr,
            (Exact, Inferred, LrMl1) => StatusCode::ExactVolumeInferredValidatedLrMl1,
            (Fuzzy, Original, Default) => StatusCode::FuzzyValidated,
            (Fuzzy, Original, Lr) => StatusCode::FuzzyValidatedLr,
            (Fuzzy, Original, LrMl1) => StatusCode::FuzzyValidatedLrMl1,
            (Fuzzy, Inferred, Default) => StatusCode::FuzzyVolumeInferredValidated,
            (Fuzzy, Inferred, Lr) => StatusCode::FuzzyVolumeInferredValidatedLr,
            (Fuzzy, Inferred, LrMl1) => StatusCode::FuzzyVolumeInferredValidatedLrMl1,
        }
    }

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Whether the citation was resolved to a journal.
    pub fn is_matched(self) -> bool {
        self != StatusCode::NotNormalized
    }

    /// Short label, e.g. `"fuzzy-inferred-lr"`.
    pub fn label(self) -> &'static str {
        match self {
            StatusCode::NotNormalized => "not-normalized",
            StatusCode::Exact => "exact",
            StatusCode::ExactValidated => "exact-original-default",
            StatusCode::ExactValidatedLr => "exact-original-lr",
            StatusCode::ExactValidatedLrMl1 => "exact-original-lr-ml1",
            StatusCode::ExactVolumeInferredValidated => "exact-inferred-default",
            StatusCode::ExactVolumeInferredValidatedLr => "exact-inferred-lr",
            StatusCode::ExactVolumeInferredValidatedLrMl1 => "exact-inferred-lr-ml1",
            StatusCode::FuzzyValidated => "fuzzy-original-default",
            StatusCode::FuzzyValidatedLr => "fuzzy-original-lr",
            StatusCode::FuzzyValidatedLrMl1 => "fuzzy-original-lr-ml1",
            StatusCode::FuzzyVolumeInferredValidated => "fuzzy-inferred-default",
            StatusCode::FuzzyVolumeInferredValidatedLr => "fuzzy-inferred-lr",
            StatusCode::FuzzyVolumeInferredValidatedLrMl1 => "fuzzy-inferred-lr-ml1",
        }
    }
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        StatusCode::from_code(code).ok_or_else(|| format!("unknown status code {code}"))
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.label())
    }
}
