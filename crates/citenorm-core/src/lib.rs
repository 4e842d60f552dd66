use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod config_file;
pub mod engine;
pub mod inference;
pub mod matching;
pub mod pool;
pub mod status;
pub mod store;
pub mod text;
pub mod validation;

// Re-export for convenience
pub use citenorm_refdb::{Issn, IssnL, ReferenceDatabase, ValidationTier};
pub use engine::{CitationOutcome, DocumentReport, Outcome, StandardizationEngine, UnresolvedReason};
pub use matching::{MatchMode, TitleMatcher};
pub use status::StatusCode;
pub use store::{StandardizedCitation, StatusStore, StoreError, StoreKind};
pub use text::{JournalTitleCleaner, TitleCleaner, clean_journal_title};
pub use validation::{KeySet, KeyValidator, ValidationKey, VolumeMode};

/// A reference to a journal article as cited in a document's bibliography.
///
/// Only `source`, `publication_date` and `volume` drive standardization; the
/// remaining fields are carried through from the citation source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Identifier of the citation inside its document (e.g. `"S0034-89102019000100301-7"`).
    pub local_id: String,
    /// Raw cited journal title.
    #[serde(default)]
    pub source: Option<String>,
    /// Raw publication date, any length or format (`"2019"`, `"20190315"`, `"s.d."`).
    #[serde(default)]
    pub publication_date: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub first_page: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub first_author: Option<String>,
    /// `"article"`, `"book"`, `"thesis"`, ...
    #[serde(default)]
    pub publication_type: Option<String>,
}

impl Citation {
    /// Global identifier: `"{local_id}-{collection_acronym}"`.
    pub fn citation_id(&self, collection_acronym: &str) -> String {
        format!("{}-{}", self.local_id, collection_acronym)
    }

    /// Whether this citation refers to a journal article.
    pub fn is_article(&self) -> bool {
        self.publication_type.as_deref() == Some("article")
    }
}

/// A citing document and its bibliography.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pid: String,
    pub collection_acronym: String,
    /// ISO date (`YYYY-MM-DD`) the document was last processed by the source.
    #[serde(default)]
    pub processing_date: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("reference database error: {0}")]
    RefDb(#[from] citenorm_refdb::RefDbError),
    #[error("status store error: {0}")]
    Store(#[from] StoreError),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Progress events emitted while standardizing a batch of documents.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    DocumentStarted {
        index: usize,
        total: usize,
        pid: String,
    },
    DocumentFinished {
        index: usize,
        total: usize,
        pid: String,
        standardized: usize,
        not_normalized: usize,
        skipped: usize,
    },
    Warning {
        pid: String,
        message: String,
    },
}

/// Summary statistics for a complete standardization run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub documents: usize,
    pub citations: usize,
    pub already_standardized: usize,
    pub empty_title: usize,
    pub not_attempted: usize,
    pub standardized: usize,
    pub not_normalized: usize,
    pub ambiguous: usize,
    pub records_written: usize,
    pub write_failures: usize,
    pub by_status: BTreeMap<StatusCode, usize>,
    pub cancelled: bool,
}

impl RunStats {
    /// Fold one document's report into the totals.
    pub fn record(&mut self, report: &DocumentReport) {
        self.documents += 1;
        self.records_written += report.written;
        if report.write_error.is_some() {
            self.write_failures += 1;
        }
        for co in &report.outcomes {
            self.citations += 1;
            match &co.outcome {
                Outcome::AlreadyStandardized(_) => self.already_standardized += 1,
                Outcome::EmptyTitle => self.empty_title += 1,
                Outcome::NotAttempted => self.not_attempted += 1,
                Outcome::Standardized(record) => {
                    self.standardized += 1;
                    *self.by_status.entry(record.status).or_default() += 1;
                }
                Outcome::NotNormalized { reason, .. } => {
                    self.not_normalized += 1;
                    *self.by_status.entry(StatusCode::NotNormalized).or_default() += 1;
                    if matches!(reason, UnresolvedReason::Ambiguous { .. }) {
                        self.ambiguous += 1;
                    }
                }
            }
        }
    }
}

/// Runtime configuration for a standardization run.
#[derive(Debug, Clone)]
pub struct Config {
    pub snapshot_path: Option<PathBuf>,
    pub store_kind: StoreKind,
    /// Where the status store lives. When unset, a timestamped
    /// `std-results-<secs>.jsonl` under the data directory is used.
    pub store_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub use_exact: bool,
    pub use_fuzzy: bool,
    pub num_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_path: None,
            store_kind: StoreKind::Jsonl,
            store_path: None,
            data_dir: PathBuf::from("."),
            use_exact: true,
            use_fuzzy: false,
            num_workers: 4,
        }
    }
}

impl Config {
    /// The store path to use, falling back to a fresh timestamped file name.
    pub fn resolved_store_path(&self) -> PathBuf {
        if let Some(path) = &self.store_path {
            return path.clone();
        }
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let ext = match self.store_kind {
            StoreKind::Jsonl => "jsonl",
            StoreKind::Sqlite => "db",
        };
        self.data_dir.join(format!("std-results-{secs}.{ext}"))
    }
}

/// Load the reference snapshot named by `config` and build an engine over it.
pub fn build_engine(config: &Config) -> Result<StandardizationEngine, CoreError> {
    let path = config
        .snapshot_path
        .as_deref()
        .ok_or_else(|| CoreError::Config("no reference snapshot path configured".into()))?;
    let db = ReferenceDatabase::open(path)?;
    Ok(StandardizationEngine::new(
        Arc::new(db),
        config.use_exact,
        config.use_fuzzy,
    ))
}

/// Open the status store named by `config`.
pub fn build_store(config: &Config) -> Result<Arc<dyn StatusStore>, CoreError> {
    let path = config.resolved_store_path();
    let store = store::open_store(config.store_kind, &path)?;
    tracing::info!(
        backend = store.name(),
        path = %path.display(),
        records = store.len().unwrap_or_default(),
        "opened status store"
    );
    Ok(store)
}

/// Standardize a batch of documents with a worker pool, persisting each
/// document's records as one batch.
///
/// Per-citation and per-document failures are absorbed into the returned
/// [`RunStats`]; the run stops submitting new documents once `cancel` fires.
pub async fn standardize_documents(
    documents: Vec<Document>,
    engine: Arc<StandardizationEngine>,
    store: Arc<dyn StatusStore>,
    num_workers: usize,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> RunStats {
    pool::standardize_documents(documents, engine, store, num_workers, progress, cancel).await
}
