//! Journal title cleaning.
//!
//! Cited titles and registry titles must go through the same cleaning for
//! exact and fuzzy matching to line up; the matcher itself never normalizes.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Medium markers dropped from the end of a title ("... ONLINE", "... IMPRESSO").
const MEDIUM_MARKERS: [&str; 5] = ["IMPRESSO", "ONLINE", "CDROM", "PRINT", "ELECTRONIC"];

/// A parenthesised segment together with any word characters glued to it,
/// e.g. `"(Sao Paulo)"` or `"Rev(Online)"`.
static PARENTHESIS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w-]*\([^)]*\)[\w-]*").unwrap());

static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").unwrap());

/// Turns a raw cited journal title into the form used as a lookup key.
pub trait TitleCleaner: Send + Sync {
    /// Clean `raw`; an empty result means the title is unusable.
    fn clean(&self, raw: &str) -> String;
}

/// Default cleaner: see [`clean_journal_title`].
#[derive(Debug, Clone, Copy)]
pub struct JournalTitleCleaner {
    pub remove_parenthesis: bool,
}

impl Default for JournalTitleCleaner {
    fn default() -> Self {
        Self {
            remove_parenthesis: true,
        }
    }
}

impl TitleCleaner for JournalTitleCleaner {
    fn clean(&self, raw: &str) -> String {
        preprocess(raw, self.remove_parenthesis)
    }
}

/// Clean a cited journal title with the default settings.
///
/// Steps (order matters):
/// 1. Unescape common HTML entities
/// 2. Drop parenthesised segments
/// 3. NFKD-decompose and keep ASCII only (strips accents)
/// 4. Replace every run of non-alphanumerics with one space
/// 5. Uppercase and trim
/// 6. Drop trailing medium markers (`ONLINE`, `PRINT`, ...)
pub fn clean_journal_title(raw: &str) -> String {
    preprocess(raw, true)
}

fn preprocess(raw: &str, remove_parenthesis: bool) -> String {
    let text = unescape_html(raw);

    let text = if remove_parenthesis {
        PARENTHESIS_RE.replace_all(&text, " ").into_owned()
    } else {
        text
    };

    let ascii: String = text.nfkd().filter(char::is_ascii).collect();
    let spaced = NON_ALNUM_RE.replace_all(&ascii, " ");
    let upper = spaced.trim().to_uppercase();

    strip_medium_markers(&upper).to_string()
}

fn unescape_html(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
}

fn strip_medium_markers(title: &str) -> &str {
    let mut title = title;
    while let Some((head, last)) = title.rsplit_once(' ') {
        if MEDIUM_MARKERS.contains(&last) {
            title = head.trim_end();
        } else {
            break;
        }
    }
    title
}
