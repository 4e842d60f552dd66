//! Reference snapshot loader and journal lookup tables.
//!
//! Loads a versioned snapshot built offline from serial registries (ISSN
//! portal, SciELO, NLM, ...) into immutable in-memory tables. The resulting
//! [`ReferenceDatabase`] does no matching of its own; it only answers lookups
//! and is safe to share across threads behind an `Arc`.

mod issn;
mod snapshot;

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use issn::{Issn, IssnL};
pub use snapshot::{Equation, FORMAT_VERSION, JournalData, RefDbSnapshot};

#[derive(Error, Debug)]
pub enum RefDbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// The three year/volume bases used to validate `ISSN-YEAR-VOLUME` keys, from
/// strictest to loosest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValidationTier {
    /// Year/volume pairs observed directly in the registries.
    Default,
    /// Pairs predicted by the per-ISSN linear regression.
    Lr,
    /// Regression predictions widened by one volume either way.
    LrMl1,
}

impl ValidationTier {
    /// All tiers in escalation order.
    pub const ALL: [ValidationTier; 3] = [
        ValidationTier::Default,
        ValidationTier::Lr,
        ValidationTier::LrMl1,
    ];

    /// The next looser tier, if any.
    pub fn next(self) -> Option<ValidationTier> {
        match self {
            ValidationTier::Default => Some(ValidationTier::Lr),
            ValidationTier::Lr => Some(ValidationTier::LrMl1),
            ValidationTier::LrMl1 => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationTier::Default => "default",
            ValidationTier::Lr => "lr",
            ValidationTier::LrMl1 => "lr-ml1",
        }
    }
}

/// Table sizes and header fields of a loaded snapshot.
#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    pub format_version: u32,
    pub created: Option<String>,
    pub titles: usize,
    pub issnls: usize,
    pub issns: usize,
    pub keys_default: usize,
    pub keys_lr: usize,
    pub keys_lr_ml1: usize,
    pub equations: usize,
}

/// Handle to a loaded, immutable reference database.
pub struct ReferenceDatabase {
    tables: RefDbSnapshot,
    path: Option<PathBuf>,
}

impl ReferenceDatabase {
    /// Load a snapshot file. Any failure here is fatal for a run: there is no
    /// partial-load fallback.
    pub fn open(path: &Path) -> Result<Self, RefDbError> {
        let snapshot = RefDbSnapshot::read_from(path)?;
        let mut db = Self::from_snapshot(snapshot)?;
        db.path = Some(path.to_path_buf());

        let info = db.info();
        tracing::info!(
            path = %path.display(),
            titles = info.titles,
            issnls = info.issnls,
            keys = info.keys_default,
            equations = info.equations,
            "loaded reference snapshot"
        );
        Ok(db)
    }

    /// Wrap an in-memory snapshot, checking that every `issn-to-issnl` value
    /// has an `issnl-to-data` entry.
    pub fn from_snapshot(snapshot: RefDbSnapshot) -> Result<Self, RefDbError> {
        if snapshot.format_version != FORMAT_VERSION {
            return Err(RefDbError::UnsupportedVersion {
                found: snapshot.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let mut dangling: Vec<&str> = snapshot
            .issn_to_issnl
            .values()
            .filter(|issnl| !snapshot.issnl_to_data.contains_key(*issnl))
            .map(Issn::as_str)
            .collect();
        if !dangling.is_empty() {
            dangling.sort_unstable();
            dangling.dedup();
            let shown: Vec<&str> = dangling.iter().take(5).copied().collect();
            return Err(RefDbError::Inconsistent(format!(
                "{} ISSN-L(s) referenced by issn-to-issnl have no issnl-to-data entry (e.g. {})",
                dangling.len(),
                shown.join(", ")
            )));
        }

        Ok(Self {
            tables: snapshot,
            path: None,
        })
    }

    /// Candidate ISSN-Ls for an exact (already cleaned) title.
    pub fn issnls_for_title(&self, title: &str) -> Option<&BTreeSet<IssnL>> {
        self.tables.title_to_issnl.get(title)
    }

    /// All titles starting with `prefix`, in lexicographic order.
    pub fn titles_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a BTreeSet<IssnL>)> + 'a {
        self.tables
            .title_to_issnl
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(move |(title, _)| title.starts_with(prefix))
            .map(|(title, issnls)| (title.as_str(), issnls))
    }

    /// The ISSN-L an ISSN belongs to.
    pub fn issnl_for_issn(&self, issn: &Issn) -> Option<&IssnL> {
        self.tables.issn_to_issnl.get(issn)
    }

    /// Canonical data for an ISSN-L.
    pub fn journal(&self, issnl: &IssnL) -> Option<&JournalData> {
        self.tables.issnl_to_data.get(issnl)
    }

    /// Regression model for an ISSN.
    pub fn equation(&self, issn: &Issn) -> Option<Equation> {
        self.tables.issn_to_equation.get(issn).copied()
    }

    /// The composite-key set backing a validation tier.
    pub fn validation_base(&self, tier: ValidationTier) -> &HashSet<String> {
        match tier {
            ValidationTier::Default => &self.tables.issn_year_volume,
            ValidationTier::Lr => &self.tables.issn_year_volume_lr,
            ValidationTier::LrMl1 => &self.tables.issn_year_volume_lr_ml1,
        }
    }

    pub fn info(&self) -> DatabaseInfo {
        DatabaseInfo {
            format_version: self.tables.format_version,
            created: self.tables.created.clone(),
            titles: self.tables.title_to_issnl.len(),
            issnls: self.tables.issnl_to_data.len(),
            issns: self.tables.issn_to_issnl.len(),
            keys_default: self.tables.issn_year_volume.len(),
            keys_lr: self.tables.issn_year_volume_lr.len(),
            keys_lr_ml1: self.tables.issn_year_volume_lr_ml1.len(),
            equations: self.tables.issn_to_equation.len(),
        }
    }

    /// Path the database was loaded from, if it came from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::fmt::Debug for ReferenceDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceDatabase")
            .field("path", &self.path)
            .field("info", &self.info())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issnls(values: &[&str]) -> BTreeSet<IssnL> {
        values.iter().map(|v| Issn::new(*v)).collect()
    }

    fn sample() -> RefDbSnapshot {
        let mut snap = RefDbSnapshot::new();
        snap.title_to_issnl
            .insert("ARQ BRAS CARDIOL".into(), issnls(&["0066782X"]));
        snap.title_to_issnl
            .insert("ARQUIVOS BRASILEIROS DE CARDIOLOGIA".into(), issnls(&["0066782X"]));
        snap.title_to_issnl
            .insert("ARQUIVOS DE GASTROENTEROLOGIA".into(), issnls(&["00042803"]));
        snap.title_to_issnl
            .insert("BRAZILIAN JOURNAL".into(), issnls(&["01004042"]));
        snap.issn_to_issnl
            .insert(Issn::new("0066782X"), Issn::new("0066782X"));
        snap.issn_to_issnl
            .insert(Issn::new("16784170"), Issn::new("0066782X"));
        snap.issnl_to_data.insert(
            Issn::new("0066782X"),
            JournalData {
                issns: issnls(&["0066782X", "16784170"]),
                main_title: vec!["ARQUIVOS BRASILEIROS DE CARDIOLOGIA".into()],
                ..JournalData::default()
            },
        );
        snap.issn_year_volume.insert("0066782X-2010-94".into());
        snap.issn_year_volume_lr.insert("0066782X-2011-96".into());
        snap.issn_to_equation
            .insert(Issn::new("0066782X"), Equation::new(-3924.0, 2.0, 0.99));
        snap
    }

    #[test]
    fn prefix_scan_is_ordered_and_bounded() {
        let db = ReferenceDatabase::from_snapshot(sample()).unwrap();
        let titles: Vec<&str> = db.titles_with_prefix("ARQ").map(|(t, _)| t).collect();
        assert_eq!(
            titles,
            vec![
                "ARQ BRAS CARDIOL",
                "ARQUIVOS BRASILEIROS DE CARDIOLOGIA",
                "ARQUIVOS DE GASTROENTEROLOGIA",
            ]
        );
        assert_eq!(db.titles_with_prefix("ZZZ").count(), 0);
    }

    #[test]
    fn lookups() {
        let db = ReferenceDatabase::from_snapshot(sample()).unwrap();
        assert_eq!(
            db.issnl_for_issn(&Issn::new("1678-4170")),
            Some(&Issn::new("0066782X"))
        );
        assert!(db.journal(&Issn::new("0066782X")).is_some());
        assert!(db.issnls_for_title("ARQ BRAS CARDIOL").is_some());
        assert!(db.issnls_for_title("arq bras cardiol").is_none());
        assert!(
            db.validation_base(ValidationTier::Lr)
                .contains("0066782X-2011-96")
        );
        assert!(db.equation(&Issn::new("00042803")).is_none());
    }

    #[test]
    fn dangling_issnl_is_rejected() {
        let mut snap = sample();
        snap.issn_to_issnl
            .insert(Issn::new("12345678"), Issn::new("87654321"));
        let err = ReferenceDatabase::from_snapshot(snap).unwrap_err();
        assert!(matches!(err, RefDbError::Inconsistent(_)));
        assert!(err.to_string().contains("87654321"));
    }

    #[test]
    fn tiers_escalate_in_order() {
        assert_eq!(ValidationTier::Default.next(), Some(ValidationTier::Lr));
        assert_eq!(ValidationTier::Lr.next(), Some(ValidationTier::LrMl1));
        assert_eq!(ValidationTier::LrMl1.next(), None);
    }

    #[test]
    fn open_reports_missing_file_as_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReferenceDatabase::open(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, RefDbError::Io(_)));
    }

    #[test]
    fn open_reads_written_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("refdb.json.gz");
        sample().write_to(&path).unwrap();

        let db = ReferenceDatabase::open(&path).unwrap();
        let info = db.info();
        assert_eq!(info.titles, 4);
        assert_eq!(info.issnls, 1);
        assert_eq!(info.keys_default, 1);
        assert_eq!(db.path(), Some(path.as_path()));
    }
}
