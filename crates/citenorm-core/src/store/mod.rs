//! Persistence of standardized citations.
//!
//! A [`StatusStore`] answers the idempotency query (has this citation already
//! been resolved?) and receives each document's records as one batch. Writes
//! are unconditional upserts keyed by citation id.

mod jsonl;
mod memory;
mod sqlite;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::StatusCode;
use crate::IssnL;
use citenorm_refdb::JournalData;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("citation {citation_id} has unknown stored status {code}")]
    InvalidStatus { citation_id: String, code: i64 },
}

/// The persisted result for one citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedCitation {
    #[serde(rename = "_id")]
    pub citation_id: String,
    /// The cleaned title the citation was matched with.
    #[serde(rename = "cited-journal-title")]
    pub cleaned_title: String,
    /// Hyphenated ISSN-L; absent for `NOT_NORMALIZED`.
    #[serde(rename = "issn-l", default, skip_serializing_if = "Option::is_none")]
    pub issn_l: Option<String>,
    /// Hyphenated ISSNs of the journal.
    #[serde(rename = "issn", default, skip_serializing_if = "Vec::is_empty")]
    pub issns: Vec<String>,
    #[serde(
        rename = "official-journal-title",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub official_title: Vec<String>,
    #[serde(
        rename = "official-abbreviated-journal-title",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub official_abbreviated_title: Vec<String>,
    #[serde(
        rename = "alternative-journal-titles",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub alternative_titles: Vec<String>,
    pub status: StatusCode,
    /// `YYYY-MM-DD`
    #[serde(rename = "update-date")]
    pub update_date: String,
}

impl StandardizedCitation {
    /// A matched record carrying the journal's canonical data.
    pub fn matched(
        citation_id: impl Into<String>,
        cleaned_title: impl Into<String>,
        issn_l: &IssnL,
        journal: &JournalData,
        status: StatusCode,
        update_date: impl Into<String>,
    ) -> Self {
        Self {
            citation_id: citation_id.into(),
            cleaned_title: cleaned_title.into(),
            issn_l: Some(issn_l.hyphenated()),
            issns: journal.issns.iter().map(|i| i.hyphenated()).collect(),
            official_title: journal.main_title.clone(),
            official_abbreviated_title: journal.main_abbrev_title.clone(),
            alternative_titles: journal.alternative_titles.clone(),
            status,
            update_date: update_date.into(),
        }
    }

    /// A `NOT_NORMALIZED` record: the engine tried and found nothing.
    pub fn not_normalized(
        citation_id: impl Into<String>,
        cleaned_title: impl Into<String>,
        update_date: impl Into<String>,
    ) -> Self {
        Self {
            citation_id: citation_id.into(),
            cleaned_title: cleaned_title.into(),
            issn_l: None,
            issns: Vec::new(),
            official_title: Vec::new(),
            official_abbreviated_title: Vec::new(),
            alternative_titles: Vec::new(),
            status: StatusCode::NotNormalized,
            update_date: update_date.into(),
        }
    }
}

/// Where standardized citations are kept between runs.
pub trait StatusStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Last known status for a citation id.
    fn get_status(&self, citation_id: &str) -> Result<Option<StatusCode>, StoreError>;

    /// Insert or replace every record; returns how many were written.
    fn upsert_batch(&self, records: &[StandardizedCitation]) -> Result<usize, StoreError>;

    /// Number of distinct citation ids stored.
    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

/// Available [`StatusStore`] backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Newline-delimited JSON file.
    Jsonl,
    /// SQLite table keyed by citation id.
    Sqlite,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" | "json" | "ndjson" => Ok(StoreKind::Jsonl),
            "sqlite" | "db" => Ok(StoreKind::Sqlite),
            other => Err(format!(
                "unknown store kind '{other}' (expected 'jsonl' or 'sqlite')"
            )),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Jsonl => f.write_str("jsonl"),
            StoreKind::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Open (creating if needed) a store of `kind` at `path`.
pub fn open_store(kind: StoreKind, path: &Path) -> Result<Arc<dyn StatusStore>, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(match kind {
        StoreKind::Jsonl => Arc::new(JsonlStore::open(path)?),
        StoreKind::Sqlite => Arc::new(SqliteStore::open(path)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::Issn;

    fn journal() -> JournalData {
        JournalData {
            issns: BTreeSet::from([Issn::new("0034-8910"), Issn::new("15188787")]),
            main_title: vec!["Revista de Saúde Pública".into()],
            main_abbrev_title: vec!["Rev. Saúde Pública".into()],
            alternative_titles: vec![],
        }
    }

    #[test]
    fn matched_record_uses_hyphenated_issns_and_wire_names() {
        let rec = StandardizedCitation::matched(
            "S0034-89102019000100301-7-scl",
            "REV SAUDE PUBLICA",
            &Issn::new("00348910"),
            &journal(),
            StatusCode::Exact,
            "2024-05-01",
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["_id"], "S0034-89102019000100301-7-scl");
        assert_eq!(json["cited-journal-title"], "REV SAUDE PUBLICA");
        assert_eq!(json["issn-l"], "0034-8910");
        assert_eq!(json["issn"], serde_json::json!(["0034-8910", "1518-8787"]));
        assert_eq!(json["official-abbreviated-journal-title"][0], "Rev. Saúde Pública");
        assert_eq!(json["status"], 1);
        assert_eq!(json["update-date"], "2024-05-01");
        assert!(json.get("alternative-journal-titles").is_none());
    }

    #[test]
    fn not_normalized_record_is_minimal() {
        let rec = StandardizedCitation::not_normalized("x-scl", "SOME TITLE", "2024-05-01");
        let json = serde_json::to_value(&rec).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["_id", "cited-journal-title", "status", "update-date"]);
        assert_eq!(json["status"], 0);

        let back: StandardizedCitation = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn store_kind_parses_aliases() {
        assert_eq!("jsonl".parse::<StoreKind>().unwrap(), StoreKind::Jsonl);
        assert_eq!("SQLite".parse::<StoreKind>().unwrap(), StoreKind::Sqlite);
        assert!("mongo".parse::<StoreKind>().is_err());
        assert_eq!(StoreKind::Sqlite.to_string(), "sqlite");
    }

    #[test]
    fn open_store_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/std.jsonl");
        let store = open_store(StoreKind::Jsonl, &path).unwrap();
        assert_eq!(store.name(), "jsonl");
        assert!(path.parent().unwrap().is_dir());
    }
}
