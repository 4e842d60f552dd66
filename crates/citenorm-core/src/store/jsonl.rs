use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Deserialize;

use super::{StandardizedCitation, StatusStore, StoreError};
use crate::status::StatusCode;

/// Append-only newline-delimited JSON store.
///
/// Every record is one line; later lines for the same citation id win. The
/// id → status index is rebuilt from the file on open.
pub struct JsonlStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

struct Inner {
    file: File,
    index: HashMap<String, StatusCode>,
    /// The file does not end in `\n`; the next append starts a fresh line.
    needs_newline: bool,
}

/// The two fields needed to rebuild the index.
#[derive(Deserialize)]
struct IndexEntry {
    #[serde(rename = "_id")]
    id: String,
    status: StatusCode,
}

impl JsonlStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let (index, needs_newline) = if path.exists() {
            read_index(path)?
        } else {
            (HashMap::new(), false)
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!(path = %path.display(), entries = index.len(), "opened jsonl store");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                file,
                index,
                needs_newline,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_index(path: &Path) -> Result<(HashMap<String, StatusCode>, bool), StoreError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut index = HashMap::new();
    let mut line = Vec::new();
    let mut lineno = 0usize;
    let mut needs_newline = false;

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        lineno += 1;
        needs_newline = line.last() != Some(&b'\n');
        if line.trim_ascii().is_empty() {
            continue;
        }
        match serde_json::from_slice::<IndexEntry>(&line) {
            Ok(entry) => {
                index.insert(entry.id, entry.status);
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno,
                    error = %e,
                    "skipping malformed store line"
                );
            }
        }
    }

    Ok((index, needs_newline))
}

impl StatusStore for JsonlStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn get_status(&self, citation_id: &str) -> Result<Option<StatusCode>, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.index.get(citation_id).copied())
    }

    fn upsert_batch(&self, records: &[StandardizedCitation]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let mut buf = Vec::new();
        if inner.needs_newline {
            buf.push(b'\n');
        }
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        // A failed write may leave a partial line behind.
        let file = &mut inner.file;
        if let Err(e) = file.write_all(&buf).and_then(|()| file.flush()) {
            inner.needs_newline = true;
            return Err(e.into());
        }
        inner.needs_newline = false;
        for record in records {
            inner.index.insert(record.citation_id.clone(), record.status);
        }

        tracing::trace!(records = records.len(), "appended batch");
        Ok(records.len())
    }

    fn len(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.index.len())
    }
}
