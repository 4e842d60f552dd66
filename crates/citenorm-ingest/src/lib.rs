//! Citation source: reads citing documents and their references from dumps.
//!
//! Accepted inputs are newline-delimited JSON (one document per line) or a
//! single JSON array of documents, either of them optionally gzip-compressed.
//! Malformed documents are logged and skipped; only I/O failures abort.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use thiserror::Error;

pub mod filter;

// Re-export domain types for convenience
pub use citenorm_core::{Citation, Document};
pub use filter::{DocumentFilter, parse_date};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),
}

/// Read every document in `path` that passes `filter`.
pub fn read_documents(path: &Path, filter: &DocumentFilter) -> Result<Vec<Document>, IngestError> {
    let reader = open_input(path)?;
    let docs = read_from(reader, filter)?;
    tracing::info!(path = %path.display(), documents = docs.len(), "loaded documents");
    Ok(docs)
}

/// Read documents from any buffered reader (decompressed already).
pub fn read_from(mut reader: impl BufRead, filter: &DocumentFilter) -> Result<Vec<Document>, IngestError> {
    let is_array = loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(Vec::new());
        }
        let skip = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if skip < buf.len() {
            let first = buf[skip];
            reader.consume(skip);
            break first == b'[';
        }
        let len = buf.len();
        reader.consume(len);
    };

    let mut docs = Vec::new();
    let mut skipped = 0usize;

    if is_array {
        let values: Vec<serde_json::Value> = serde_json::from_reader(reader)?;
        for (i, value) in values.into_iter().enumerate() {
            match serde_json::from_value::<Document>(value) {
                Ok(doc) if filter.matches(&doc) => docs.push(doc),
                Ok(_) => {}
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(index = i, error = %e, "skipping malformed document");
                }
            }
        }
    } else {
        let mut line = Vec::new();
        let mut lineno = 0usize;
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            lineno += 1;
            if line.trim_ascii().is_empty() {
                continue;
            }
            // Decoded from bytes so an invalid UTF-8 line only loses itself.
            match serde_json::from_slice::<Document>(&line) {
                Ok(doc) if filter.matches(&doc) => docs.push(doc),
                Ok(_) => {}
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(line = lineno, error = %e, "skipping malformed document");
                }
            }
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "some documents could not be parsed");
    }
    Ok(docs)
}

fn open_input(path: &Path) -> Result<Box<dyn BufRead>, IngestError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    let file = File::open(path)?;

    if n == 2 && magic == GZIP_MAGIC {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}
