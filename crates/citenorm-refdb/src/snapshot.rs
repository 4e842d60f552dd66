//! On-disk snapshot format.
//!
//! A snapshot is a single JSON document, optionally gzip-compressed, holding
//! the registry tables under their registry names plus a `format_version`
//! header. Gzip is detected from the magic bytes, not the file extension.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::{Issn, IssnL, RefDbError};

/// Snapshot schema version written by this crate and the only one it reads.
pub const FORMAT_VERSION: u32 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Canonical data for one serial, keyed by its ISSN-L.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JournalData {
    #[serde(default)]
    pub issns: BTreeSet<Issn>,
    #[serde(default)]
    pub main_title: Vec<String>,
    #[serde(default)]
    pub main_abbrev_title: Vec<String>,
    #[serde(default)]
    pub alternative_titles: Vec<String>,
}

/// Per-ISSN linear model `volume(year) = a + b * year`, stored as `[a, b, r2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64, f64)", into = "(f64, f64, f64)")]
pub struct Equation {
    pub a: f64,
    pub b: f64,
    /// Goodness of fit of the regression. Carried for reference only.
    pub r2: f64,
}

impl Equation {
    pub fn new(a: f64, b: f64, r2: f64) -> Self {
        Self { a, b, r2 }
    }

    /// Evaluate the model for `year`.
    pub fn predict(&self, year: u16) -> f64 {
        self.a + self.b * f64::from(year)
    }
}

impl From<(f64, f64, f64)> for Equation {
    fn from((a, b, r2): (f64, f64, f64)) -> Self {
        Self { a, b, r2 }
    }
}

impl From<Equation> for (f64, f64, f64) {
    fn from(eq: Equation) -> Self {
        (eq.a, eq.b, eq.r2)
    }
}

/// The serialized form of a reference database.
///
/// Composite keys in the three `issn-year-volume*` sets use the compact ISSN:
/// `"00319406-2020-15"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefDbSnapshot {
    pub format_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(rename = "title-to-issnl", default)]
    pub title_to_issnl: BTreeMap<String, BTreeSet<IssnL>>,
    #[serde(rename = "issn-to-issnl", default)]
    pub issn_to_issnl: HashMap<Issn, IssnL>,
    #[serde(rename = "issnl-to-data", default)]
    pub issnl_to_data: HashMap<IssnL, JournalData>,
    #[serde(rename = "issn-year-volume", default)]
    pub issn_year_volume: HashSet<String>,
    #[serde(rename = "issn-year-volume-lr", default)]
    pub issn_year_volume_lr: HashSet<String>,
    #[serde(rename = "issn-year-volume-lr-ml1", default)]
    pub issn_year_volume_lr_ml1: HashSet<String>,
    #[serde(rename = "issn-to-equation", default)]
    pub issn_to_equation: HashMap<Issn, Equation>,
}

/// Reads only the header; every other field is skipped.
#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

impl RefDbSnapshot {
    /// An empty snapshot at the current format version.
    pub fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            ..Self::default()
        }
    }

    /// Read and decode a snapshot file (plain or gzip JSON).
    pub fn read_from(path: &Path) -> Result<Self, RefDbError> {
        let mut raw = Vec::new();
        File::open(path)?.read_to_end(&mut raw)?;

        let bytes = if raw.starts_with(&GZIP_MAGIC) {
            let mut decoded = Vec::with_capacity(raw.len() * 4);
            GzDecoder::new(raw.as_slice()).read_to_end(&mut decoded)?;
            decoded
        } else {
            raw
        };

        Self::from_slice(&bytes)
    }

    /// Decode a snapshot from JSON bytes, checking the format version first so
    /// that a snapshot from another schema reports a version error rather than
    /// a field-level parse error.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, RefDbError> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        if probe.format_version != FORMAT_VERSION {
            return Err(RefDbError::UnsupportedVersion {
                found: probe.format_version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Write the snapshot to `path`, gzip-compressed when the path ends in `.gz`.
    pub fn write_to(&self, path: &Path) -> Result<(), RefDbError> {
        let file = BufWriter::new(File::create(path)?);
        let gzip = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        if gzip {
            let mut encoder = GzEncoder::new(file, Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?.flush()?;
        } else {
            let mut file = file;
            serde_json::to_writer(&mut file, self)?;
            file.flush()?;
        }
        Ok(())
    }
}
