//! The per-citation standardization cascade.
//!
//! For each citation: skip it when the store already holds a matched status,
//! clean its title, try an exact match (a single candidate is accepted
//! outright), then a fuzzy match, disambiguating multiple (or fuzzy)
//! candidates with year/volume keys. Citations that were attempted but not
//! resolved get an explicit `NOT_NORMALIZED` record.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::inference::{VolumeEstimator, VolumeInferencer};
use crate::matching::{MatchMode, TitleMatcher};
use crate::status::StatusCode;
use crate::store::{StandardizedCitation, StatusStore};
use crate::text::{JournalTitleCleaner, TitleCleaner};
use crate::validation::{Disambiguation, KeyValidator};
use crate::{Citation, Document, Issn, IssnL, ReferenceDatabase, ValidationTier};

/// Why an attempted citation ended up `NOT_NORMALIZED`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedReason {
    /// No title matched under any enabled mode.
    NoCandidates,
    /// Candidates had no ISSNs to build keys from.
    NoIssns,
    /// Publication year missing or not a 4-digit number.
    NoUsableYear,
    /// No volume given and none could be inferred.
    NoKeys,
    /// More than one key validated at `tier`.
    Ambiguous {
        tier: ValidationTier,
        matches: usize,
    },
    /// No key validated at any tier.
    NoValidKey,
    /// The resolved ISSN-L has no canonical data.
    MissingJournalData(IssnL),
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NoCandidates => f.write_str("no candidate journals"),
            UnresolvedReason::NoIssns => f.write_str("candidates have no ISSNs"),
            UnresolvedReason::NoUsableYear => f.write_str("no usable publication year"),
            UnresolvedReason::NoKeys => f.write_str("no volume and none inferred"),
            UnresolvedReason::Ambiguous { tier, matches } => {
                write!(f, "{matches} keys validated at tier {}", tier.as_str())
            }
            UnresolvedReason::NoValidKey => f.write_str("no key validated at any tier"),
            UnresolvedReason::MissingJournalData(issnl) => {
                write!(f, "no data for ISSN-L {}", issnl.hyphenated())
            }
        }
    }
}

/// What happened to one citation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The store already holds this matched status; nothing done.
    AlreadyStandardized(StatusCode),
    /// The title cleaned to nothing; no record.
    EmptyTitle,
    /// Neither exact nor fuzzy matching is enabled; no record.
    NotAttempted,
    /// Resolved to a journal.
    Standardized(StandardizedCitation),
    /// Attempted without success; the record has status `NOT_NORMALIZED`.
    NotNormalized {
        record: StandardizedCitation,
        reason: UnresolvedReason,
    },
}

impl Outcome {
    /// The record to persist, if any.
    pub fn record(&self) -> Option<&StandardizedCitation> {
        match self {
            Outcome::Standardized(record) | Outcome::NotNormalized { record, .. } => Some(record),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Outcome::AlreadyStandardized(status) => Some(*status),
            _ => self.record().map(|r| r.status),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CitationOutcome {
    pub citation_id: String,
    pub outcome: Outcome,
}

/// Outcomes for one document plus the result of persisting them.
#[derive(Debug, Clone, Default)]
pub struct DocumentReport {
    pub pid: String,
    pub outcomes: Vec<CitationOutcome>,
    /// Records written by the store.
    pub written: usize,
    pub write_error: Option<String>,
}

impl DocumentReport {
    pub fn standardized(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Standardized(_)))
    }

    pub fn not_normalized(&self) -> usize {
        self.count(|o| matches!(o, Outcome::NotNormalized { .. }))
    }

    /// Citations that produced no record.
    pub fn skipped(&self) -> usize {
        self.count(|o| o.record().is_none())
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|co| pred(&co.outcome)).count()
    }
}

/// Resolves cited journal titles against a shared reference database.
///
/// Holds no mutable state; one engine serves every worker.
pub struct StandardizationEngine {
    db: Arc<ReferenceDatabase>,
    cleaner: Arc<dyn TitleCleaner>,
    estimator: Option<Arc<dyn VolumeEstimator>>,
    use_exact: bool,
    use_fuzzy: bool,
}

impl fmt::Debug for StandardizationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardizationEngine")
            .field("db", &self.db)
            .field("use_exact", &self.use_exact)
            .field("use_fuzzy", &self.use_fuzzy)
            .field("custom_estimator", &self.estimator.is_some())
            .finish()
    }
}

impl StandardizationEngine {
    pub fn new(db: Arc<ReferenceDatabase>, use_exact: bool, use_fuzzy: bool) -> Self {
        Self {
            db,
            cleaner: Arc::new(JournalTitleCleaner::default()),
            estimator: None,
            use_exact,
            use_fuzzy,
        }
    }

    /// Replace the default title cleaner.
    pub fn with_cleaner(mut self, cleaner: Arc<dyn TitleCleaner>) -> Self {
        self.cleaner = cleaner;
        self
    }

    /// Replace the snapshot-equation volume inferencer.
    pub fn with_estimator(mut self, estimator: Arc<dyn VolumeEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn database(&self) -> &ReferenceDatabase {
        &self.db
    }

    pub fn cleaner(&self) -> &dyn TitleCleaner {
        self.cleaner.as_ref()
    }

    /// Run the cascade for one citation. Never fails: store read errors are
    /// logged and the citation is processed as if unseen.
    pub fn standardize(
        &self,
        citation_id: &str,
        citation: &Citation,
        store: &dyn StatusStore,
        today: &str,
    ) -> Outcome {
        match store.get_status(citation_id) {
            Ok(Some(status)) if status.is_matched() => {
                tracing::trace!(citation_id, %status, "already standardized");
                return Outcome::AlreadyStandardized(status);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(citation_id, error = %e, "status lookup failed; processing anyway");
            }
        }

        let cleaned = self.cleaner.clean(citation.source.as_deref().unwrap_or_default());
        if cleaned.is_empty() {
            tracing::debug!(citation_id, "empty cleaned title");
            return Outcome::EmptyTitle;
        }

        if !self.use_exact && !self.use_fuzzy {
            return Outcome::NotAttempted;
        }

        let matcher = TitleMatcher::new(&self.db);
        let mut reason = UnresolvedReason::NoCandidates;

        if self.use_exact {
            let candidates = matcher.match_exact(&cleaned);
            let resolved = if candidates.len() == 1 {
                candidates
                    .first()
                    .cloned()
                    .map(|issnl| (issnl, StatusCode::Exact))
                    .ok_or(UnresolvedReason::NoCandidates)
            } else if candidates.len() > 1 {
                self.disambiguate(MatchMode::Exact, &candidates, citation)
            } else {
                Err(UnresolvedReason::NoCandidates)
            };

            match self.finish(citation_id, &cleaned, resolved, today) {
                Ok(record) => return Outcome::Standardized(record),
                Err(r) => reason = r,
            }
        }

        if self.use_fuzzy {
            let candidates = matcher.match_fuzzy(&cleaned);
            let resolved = if candidates.is_empty() {
                Err(UnresolvedReason::NoCandidates)
            } else {
                self.disambiguate(MatchMode::Fuzzy, &candidates, citation)
            };

            match self.finish(citation_id, &cleaned, resolved, today) {
                Ok(record) => return Outcome::Standardized(record),
                // Keep the more informative exact-mode reason when fuzzy found nothing.
                Err(UnresolvedReason::NoCandidates) => {}
                Err(r) => reason = r,
            }
        }

        tracing::debug!(citation_id, title = %cleaned, %reason, "not normalized");
        Outcome::NotNormalized {
            record: StandardizedCitation::not_normalized(citation_id, cleaned, today),
            reason,
        }
    }

    /// Outcomes for every article citation of `document`, without persisting.
    pub fn standardize_document(
        &self,
        document: &Document,
        store: &dyn StatusStore,
        today: &str,
    ) -> Vec<CitationOutcome> {
        document
            .citations
            .iter()
            .filter(|c| c.is_article())
            .map(|citation| {
                let citation_id = citation.citation_id(&document.collection_acronym);
                let outcome = self.standardize(&citation_id, citation, store, today);
                CitationOutcome {
                    citation_id,
                    outcome,
                }
            })
            .collect()
    }

    /// Standardize a document and write its records to `store` as one batch.
    ///
    /// A failed write is reported in the returned [`DocumentReport`], never
    /// propagated.
    pub fn process_document(&self, document: &Document, store: &dyn StatusStore) -> DocumentReport {
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        let outcomes = self.standardize_document(document, store, &today);

        let records: Vec<StandardizedCitation> =
            outcomes.iter().filter_map(|co| co.outcome.record().cloned()).collect();

        let mut report = DocumentReport {
            pid: document.pid.clone(),
            outcomes,
            ..DocumentReport::default()
        };

        match store.upsert_batch(&records) {
            Ok(n) => report.written = n,
            Err(e) => {
                tracing::warn!(pid = %document.pid, error = %e, "failed to persist document batch");
                report.write_error = Some(e.to_string());
            }
        }

        tracing::debug!(
            pid = %document.pid,
            citations = report.outcomes.len(),
            written = report.written,
            "document processed"
        );
        report
    }

    /// Year/volume disambiguation over every ISSN of the candidates.
    fn disambiguate(
        &self,
        mode: MatchMode,
        candidates: &BTreeSet<IssnL>,
        citation: &Citation,
    ) -> Result<(IssnL, StatusCode), UnresolvedReason> {
        let issns: BTreeSet<Issn> = candidates
            .iter()
            .filter_map(|issnl| self.db.journal(issnl))
            .flat_map(|data| data.issns.iter().cloned())
            .collect();
        if issns.is_empty() {
            return Err(UnresolvedReason::NoIssns);
        }

        let inferencer = VolumeInferencer::new(&self.db);
        let estimator: &dyn VolumeEstimator = match &self.estimator {
            Some(custom) => custom.as_ref(),
            None => &inferencer,
        };
        let validator = KeyValidator::new(&self.db, estimator);

        let keys = validator.build_keys(citation, &issns);
        let Some(volume_mode) = keys.volume_mode else {
            return Err(UnresolvedReason::NoUsableYear);
        };
        if keys.is_empty() {
            return Err(UnresolvedReason::NoKeys);
        }

        match validator.disambiguate(&keys) {
            Disambiguation::Unique { key, tier } => {
                let issnl = self
                    .db
                    .issnl_for_issn(&key.issn)
                    .cloned()
                    .unwrap_or_else(|| key.issn.clone());
                let status = StatusCode::validated(mode, volume_mode, tier);
                tracing::debug!(mode = mode.as_str(), %key, %status, "key validated");
                Ok((issnl, status))
            }
            Disambiguation::Ambiguous { tier, count } => Err(UnresolvedReason::Ambiguous {
                tier,
                matches: count,
            }),
            Disambiguation::Exhausted => Err(UnresolvedReason::NoValidKey),
        }
    }

    fn finish(
        &self,
        citation_id: &str,
        cleaned: &str,
        resolved: Result<(IssnL, StatusCode), UnresolvedReason>,
        today: &str,
    ) -> Result<StandardizedCitation, UnresolvedReason> {
        let (issnl, status) = resolved?;
        let Some(journal) = self.db.journal(&issnl) else {
            tracing::warn!(citation_id, issnl = %issnl, "resolved ISSN-L has no journal data");
            return Err(UnresolvedReason::MissingJournalData(issnl));
        };
        tracing::debug!(citation_id, issnl = %issnl, %status, "standardized");
        Ok(StandardizedCitation::matched(
            citation_id,
            cleaned,
            &issnl,
            journal,
            status,
            today,
        ))
    }
}
