//! Title → candidate ISSN-L matching.

use std::collections::BTreeSet;

use regex::Regex;

use crate::{IssnL, ReferenceDatabase};

/// Fuzzy matching needs a title longer than this many characters...
pub const MIN_CHARS_LENGTH: usize = 6;
/// ...and at least this many words.
pub const MIN_WORDS_COUNT: usize = 2;

/// Filler allowed between (and after) the query words. The `|` is a literal
/// member of the class, kept for parity with stored results.
const WORD_FILLER: &str = r"[\w|\s]*";

/// How candidate journals were found for a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// The cleaned title is a key of the title table.
    Exact,
    /// The cleaned title matches a key through the ordered-words pattern.
    Fuzzy,
}

impl MatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchMode::Exact => "exact",
            MatchMode::Fuzzy => "fuzzy",
        }
    }
}

/// Resolves cleaned titles to sets of candidate ISSN-Ls.
#[derive(Debug, Clone, Copy)]
pub struct TitleMatcher<'a> {
    db: &'a ReferenceDatabase,
}

impl<'a> TitleMatcher<'a> {
    pub fn new(db: &'a ReferenceDatabase) -> Self {
        Self { db }
    }

    /// Candidates for `title` under `mode`.
    pub fn candidates(&self, title: &str, mode: MatchMode) -> BTreeSet<IssnL> {
        match mode {
            MatchMode::Exact => self.match_exact(title),
            MatchMode::Fuzzy => self.match_fuzzy(title),
        }
    }

    /// ISSN-Ls whose title table entry equals `title`.
    pub fn match_exact(&self, title: &str) -> BTreeSet<IssnL> {
        self.db.issnls_for_title(title).cloned().unwrap_or_default()
    }

    /// Union of ISSN-Ls of every title that fully matches the ordered-words
    /// pattern built from `title` (see [`fuzzy_pattern`]).
    ///
    /// Only titles starting with the query's first word are tested.
    pub fn match_fuzzy(&self, title: &str) -> BTreeSet<IssnL> {
        let mut matches = BTreeSet::new();

        let Some(pattern) = fuzzy_pattern(title) else {
            return matches;
        };
        let first_word = title.split(' ').next().unwrap_or_default();

        for (candidate, issnls) in self.db.titles_with_prefix(first_word) {
            if pattern.is_match(candidate) {
                matches.extend(issnls.iter().cloned());
            }
        }

        tracing::trace!(title, candidates = matches.len(), "fuzzy match");
        matches
    }
}

/// Build the full-match pattern for fuzzy title matching, or `None` when the
/// title is too short or has a single word.
///
/// The query words are joined by `[\w|\s]*` and followed by one more, with no
/// leading wildcard: `"J BIOL CHEM"` becomes
/// `^(?:J[\w|\s]*BIOL[\w|\s]*CHEM[\w|\s]*)$`, so a candidate must start with
/// the first word and contain the rest in order.
pub fn fuzzy_pattern(title: &str) -> Option<Regex> {
    let words: Vec<&str> = title.split(' ').collect();
    if title.chars().count() <= MIN_CHARS_LENGTH || words.len() < MIN_WORDS_COUNT {
        return None;
    }

    let body = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join(WORD_FILLER);
    let pattern = format!("^(?:{body}{WORD_FILLER})$");

    match Regex::new(&pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(title, error = %e, "could not build fuzzy pattern");
            None
        }
    }
}
