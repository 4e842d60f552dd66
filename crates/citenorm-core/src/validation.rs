//! `ISSN-YEAR-VOLUME` key construction and tiered validation.
//!
//! Keys disambiguate between candidate journals: a citation's year and
//! volume are combined with every candidate ISSN, and the keys are looked up
//! in the three validation bases from strictest to loosest. A tier settles
//! the citation only when exactly one key matches it.

use std::collections::BTreeSet;
use std::fmt;

use crate::inference::VolumeEstimator;
use crate::{Citation, Issn, ReferenceDatabase, ValidationTier};

/// Where the volume in a key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeMode {
    /// Taken verbatim from the citation.
    Original,
    /// Predicted by the volume inferencer.
    Inferred,
}

/// One `ISSN-YEAR-VOLUME` composite key, with the ISSN in compact form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValidationKey {
    pub issn: Issn,
    pub year: String,
    pub volume: String,
}

impl ValidationKey {
    pub fn new(issn: Issn, year: impl Into<String>, volume: impl Into<String>) -> Self {
        Self {
            issn,
            year: year.into(),
            volume: volume.into(),
        }
    }
}

impl fmt::Display for ValidationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.issn, self.year, self.volume)
    }
}

/// Keys built for one citation.
///
/// `volume_mode` is `None` when the year was unusable and no keys could be
/// built at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySet {
    pub keys: BTreeSet<ValidationKey>,
    pub volume_mode: Option<VolumeMode>,
}

impl KeySet {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Result of running a key set through the tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disambiguation {
    /// Exactly one key validated at `tier`.
    Unique {
        key: ValidationKey,
        tier: ValidationTier,
    },
    /// `count` keys validated at `tier`; looser tiers were not consulted.
    Ambiguous { tier: ValidationTier, count: usize },
    /// No key validated at any tier.
    Exhausted,
}

pub struct KeyValidator<'a> {
    db: &'a ReferenceDatabase,
    estimator: &'a dyn VolumeEstimator,
}

impl<'a> KeyValidator<'a> {
    pub fn new(db: &'a ReferenceDatabase, estimator: &'a dyn VolumeEstimator) -> Self {
        Self { db, estimator }
    }

    /// Build one key per candidate ISSN from the citation's year and volume.
    ///
    /// A numeric volume is used as is. Otherwise a volume is inferred per ISSN
    /// and only ISSNs with a prediction get a key.
    pub fn build_keys(&self, citation: &Citation, issns: &BTreeSet<Issn>) -> KeySet {
        let Some(year_str) = citation.publication_date.as_deref().and_then(year_prefix) else {
            return KeySet::default();
        };
        let Ok(year) = year_str.parse::<u16>() else {
            return KeySet::default();
        };

        if let Some(volume) = citation.volume.as_deref().filter(|v| is_numeric_volume(v)) {
            let keys = issns
                .iter()
                .map(|issn| ValidationKey::new(issn.clone(), year_str.clone(), volume))
                .collect();
            return KeySet {
                keys,
                volume_mode: Some(VolumeMode::Original),
            };
        }

        let keys = issns
            .iter()
            .filter_map(|issn| {
                let volume = self.estimator.infer(issn, year)?;
                Some(ValidationKey::new(
                    issn.clone(),
                    year_str.clone(),
                    volume.to_string(),
                ))
            })
            .collect();
        KeySet {
            keys,
            volume_mode: Some(VolumeMode::Inferred),
        }
    }

    /// The subset of `keys` present in the base for `tier`.
    pub fn validate(&self, keys: &KeySet, tier: ValidationTier) -> BTreeSet<ValidationKey> {
        let base = self.db.validation_base(tier);
        keys.keys
            .iter()
            .filter(|k| base.contains(&k.to_string()))
            .cloned()
            .collect()
    }

    /// Validate tier by tier, escalating only while nothing matches.
    pub fn disambiguate(&self, keys: &KeySet) -> Disambiguation {
        let mut tier = Some(ValidationTier::Default);

        while let Some(current) = tier {
            let mut matched = self.validate(keys, current);
            match matched.len() {
                0 => tier = current.next(),
                1 => {
                    if let Some(key) = matched.pop_first() {
                        return Disambiguation::Unique { key, tier: current };
                    }
                }
                count => {
                    return Disambiguation::Ambiguous {
                        tier: current,
                        count,
                    };
                }
            }
        }

        Disambiguation::Exhausted
    }
}

/// The 4-digit year at the start of a raw publication date.
///
/// Longer dates (`"20190315"`, `"2019-03"`) are cut to their first four
/// characters before checking.
pub fn parse_year(raw: &str) -> Option<u16> {
    year_prefix(raw)?.parse().ok()
}

/// The first four characters of `raw` when they are all ASCII digits.
/// Keys are built from this text, so leading zeros survive.
fn year_prefix(raw: &str) -> Option<&str> {
    raw.get(..4).filter(|head| head.bytes().all(|b| b.is_ascii_digit()))
}

/// Whether a raw volume is a plain non-empty run of digits.
pub fn is_numeric_volume(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use citenorm_refdb::RefDbSnapshot;

    /// Estimator returning a fixed volume and counting its calls.
    struct FixedEstimator {
        volume: Option<u64>,
        calls: AtomicUsize,
    }

    impl FixedEstimator {
        fn new(volume: Option<u64>) -> Self {
            Self {
                volume,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl VolumeEstimator for FixedEstimator {
        fn infer(&self, _issn: &Issn, _year: u16) -> Option<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.volume
        }
    }

    fn db(default: &[&str], lr: &[&str], lr_ml1: &[&str]) -> ReferenceDatabase {
        let mut snap = RefDbSnapshot::new();
        snap.issn_year_volume = default.iter().map(|s| s.to_string()).collect();
        snap.issn_year_volume_lr = lr.iter().map(|s| s.to_string()).collect();
        snap.issn_year_volume_lr_ml1 = lr_ml1.iter().map(|s| s.to_string()).collect();
        ReferenceDatabase::from_snapshot(snap).unwrap()
    }

    fn citation(year: Option<&str>, volume: Option<&str>) -> Citation {
        Citation {
            local_id: "c1".into(),
            publication_date: year.map(str::to_string),
            volume: volume.map(str::to_string),
            ..Citation::default()
        }
    }

    fn issns(list: &[&str]) -> BTreeSet<Issn> {
        list.iter().map(|s| Issn::new(*s)).collect()
    }

    fn key_strings(keys: &KeySet) -> Vec<String> {
        keys.keys.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn parses_leading_year() {
        assert_eq!(parse_year("2019"), Some(2019));
        assert_eq!(parse_year("20190315"), Some(2019));
        assert_eq!(parse_year("2019-03"), Some(2019));
        assert_eq!(parse_year("19"), None);
        assert_eq!(parse_year("s.d."), None);
        assert_eq!(parse_year("ca. 2019"), None);
        assert_eq!(parse_year("２０１９"), None);
    }

    #[test]
    fn year_keeps_leading_zeros_in_keys() {
        let db = db(&[], &[], &[]);
        let est = FixedEstimator::new(Some(5));
        let v = KeyValidator::new(&db, &est);

        let keys = v.build_keys(&citation(Some("0999"), Some("5")), &issns(&["00010001"]));
        assert_eq!(key_strings(&keys), vec!["00010001-0999-5"]);

        let keys = v.build_keys(&citation(Some("09990101"), None), &issns(&["00010001"]));
        assert_eq!(key_strings(&keys), vec!["00010001-0999-5"]);
        assert_eq!(parse_year("0999"), Some(999));
    }

    #[test]
    fn numeric_volume_detection() {
        assert!(is_numeric_volume("15"));
        assert!(!is_numeric_volume(""));
        assert!(!is_numeric_volume("15A"));
        assert!(!is_numeric_volume("v. 15"));
    }

    #[test]
    fn numeric_volume_builds_original_keys_without_inference() {
        let db = db(&[], &[], &[]);
        let est = FixedEstimator::new(Some(99));
        let v = KeyValidator::new(&db, &est);

        let keys = v.build_keys(&citation(Some("2020"), Some("15")), &issns(&["00010001", "00020002"]));
        assert_eq!(keys.volume_mode, Some(VolumeMode::Original));
        assert_eq!(key_strings(&keys), vec!["00010001-2020-15", "00020002-2020-15"]);
        assert_eq!(est.calls(), 0);
    }

    #[test]
    fn missing_or_non_numeric_volume_is_inferred() {
        let db = db(&[], &[], &[]);
        let est = FixedEstimator::new(Some(20));
        let v = KeyValidator::new(&db, &est);

        let keys = v.build_keys(&citation(Some("2020"), None), &issns(&["00010001"]));
        assert_eq!(keys.volume_mode, Some(VolumeMode::Inferred));
        assert_eq!(key_strings(&keys), vec!["00010001-2020-20"]);

        let keys = v.build_keys(&citation(Some("2020"), Some("suppl")), &issns(&["00010001"]));
        assert_eq!(key_strings(&keys), vec!["00010001-2020-20"]);
        assert_eq!(est.calls(), 2);
    }

    #[test]
    fn failed_inference_yields_empty_inferred_set() {
        let db = db(&[], &[], &[]);
        let est = FixedEstimator::new(None);
        let v = KeyValidator::new(&db, &est);

        let keys = v.build_keys(&citation(Some("2020"), None), &issns(&["00010001", "00020002"]));
        assert!(keys.is_empty());
        assert_eq!(keys.volume_mode, Some(VolumeMode::Inferred));
        assert_eq!(est.calls(), 2);
    }

    #[test]
    fn unusable_year_yields_no_keys() {
        let db = db(&[], &[], &[]);
        let est = FixedEstimator::new(Some(1));
        let v = KeyValidator::new(&db, &est);

        for year in [None, Some(""), Some("s.d."), Some("202")] {
            let keys = v.build_keys(&citation(year, Some("15")), &issns(&["00010001"]));
            assert!(keys.is_empty());
            assert_eq!(keys.volume_mode, None, "year {year:?}");
        }
        assert_eq!(est.calls(), 0);
    }

    #[test]
    fn validate_intersects_with_selected_base() {
        let db = db(&["00010001-2020-15"], &["00020002-2020-15"], &[]);
        let est = FixedEstimator::new(None);
        let v = KeyValidator::new(&db, &est);
        let keys = v.build_keys(&citation(Some("2020"), Some("15")), &issns(&["00010001", "00020002"]));

        let hits = v.validate(&keys, ValidationTier::Default);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.first().unwrap().to_string(), "00010001-2020-15");
        assert_eq!(v.validate(&keys, ValidationTier::Lr).len(), 1);
        assert!(v.validate(&keys, ValidationTier::LrMl1).is_empty());
    }

    #[test]
    fn escalates_until_a_tier_matches() {
        let db = db(&[], &[], &["00020002-2020-15"]);
        let est = FixedEstimator::new(None);
        let v = KeyValidator::new(&db, &est);
        let keys = v.build_keys(&citation(Some("2020"), Some("15")), &issns(&["00010001", "00020002"]));

        match v.disambiguate(&keys) {
            Disambiguation::Unique { key, tier } => {
                assert_eq!(tier, ValidationTier::LrMl1);
                assert_eq!(key.issn, Issn::new("00020002"));
            }
            other => panic!("expected unique match, got {other:?}"),
        }
    }

    #[test]
    fn ambiguity_stops_escalation() {
        // Two matches at DEFAULT, one at LR: LR must never be consulted.
        let db = db(
            &["00010001-2020-15", "00020002-2020-15"],
            &["00010001-2020-15"],
            &[],
        );
        let est = FixedEstimator::new(None);
        let v = KeyValidator::new(&db, &est);
        let keys = v.build_keys(&citation(Some("2020"), Some("15")), &issns(&["00010001", "00020002"]));

        assert_eq!(
            v.disambiguate(&keys),
            Disambiguation::Ambiguous {
                tier: ValidationTier::Default,
                count: 2
            }
        );
    }

    #[test]
    fn nothing_matches_anywhere() {
        let db = db(&["00090009-2020-15"], &[], &[]);
        let est = FixedEstimator::new(None);
        let v = KeyValidator::new(&db, &est);
        let keys = v.build_keys(&citation(Some("2020"), Some("15")), &issns(&["00010001"]));
        assert_eq!(v.disambiguate(&keys), Disambiguation::Exhausted);
        assert_eq!(v.disambiguate(&KeySet::default()), Disambiguation::Exhausted);
    }
}
