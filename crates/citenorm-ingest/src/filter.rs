use chrono::NaiveDate;

use citenorm_core::Document;

use crate::IngestError;

/// Selects which documents of a dump are standardized.
///
/// Date bounds are inclusive and compared against the document's
/// `processing_date`; documents without a parsable date are excluded once
/// any bound is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub collection: Option<String>,
    pub from: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub pid: Option<String>,
}

impl DocumentFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(pid) = &self.pid
            && &doc.pid != pid
        {
            return false;
        }
        if let Some(collection) = &self.collection
            && &doc.collection_acronym != collection
        {
            return false;
        }
        if self.from.is_none() && self.until.is_none() {
            return true;
        }

        let Some(date) = doc.processing_date.as_deref().and_then(|d| parse_date(d).ok()) else {
            return false;
        };
        self.from.is_none_or(|from| date >= from) && self.until.is_none_or(|until| date <= until)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Parse `YYYY-MM-DD` or `YYYYMMDD`, ignoring anything after the date.
pub fn parse_date(raw: &str) -> Result<NaiveDate, IngestError> {
    let raw = raw.trim();
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw.get(..8).unwrap_or(raw), "%Y%m%d"))
        .map_err(|_| IngestError::InvalidDate(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pid: &str, collection: &str, date: Option<&str>) -> Document {
        Document {
            pid: pid.into(),
            collection_acronym: collection.into(),
            processing_date: date.map(str::to_string),
            citations: vec![],
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_iso_and_compact_dates() {
        assert_eq!(parse_date("2020-03-04").unwrap(), ymd(2020, 3, 4));
        assert_eq!(parse_date("2020-03-04T10:00:00").unwrap(), ymd(2020, 3, 4));
        assert_eq!(parse_date("20200304").unwrap(), ymd(2020, 3, 4));
        assert!(matches!(parse_date("March 4"), Err(IngestError::InvalidDate(_))));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = DocumentFilter::default();
        assert!(f.is_empty());
        assert!(f.matches(&doc("S1", "scl", None)));
    }

    #[test]
    fn pid_and_collection_are_exact() {
        let f = DocumentFilter {
            collection: Some("scl".into()),
            pid: Some("S1".into()),
            ..Default::default()
        };
        assert!(f.matches(&doc("S1", "scl", None)));
        assert!(!f.matches(&doc("S1", "arg", None)));
        assert!(!f.matches(&doc("S2", "scl", None)));
    }

    #[test]
    fn date_bounds_are_inclusive() {
        let f = DocumentFilter {
            from: Some(ymd(2020, 1, 1)),
            until: Some(ymd(2020, 12, 31)),
            ..Default::default()
        };
        assert!(f.matches(&doc("a", "scl", Some("2020-01-01"))));
        assert!(f.matches(&doc("b", "scl", Some("2020-12-31"))));
        assert!(!f.matches(&doc("c", "scl", Some("2021-01-01"))));
        assert!(!f.matches(&doc("d", "scl", Some("2019-12-31"))));
        assert!(!f.matches(&doc("e", "scl", None)));
        assert!(!f.matches(&doc("f", "scl", Some("unknown"))));
    }
}
