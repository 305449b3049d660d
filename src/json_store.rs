//! JSON array backend
//!
//! The whole array is read, extended by one entry and written back on every
//! append. Entries already in the file are carried over untouched, whatever
//! shape an earlier release gave them.

use chrono::{DateTime, Local, SecondsFormat, Utc};
use log::{info, warn};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};
use crate::record::{FeedbackRecord, HEADERS};
use crate::store::{BackendKind, StorageBackend};

/// Entry shape written by this release
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFeedback<'a> {
    #[serde(flatten)]
    pub record: &'a FeedbackRecord,
    pub raw_timestamp: String,
}

/// Keys of the canonical fields, in order, as written by `StoredFeedback`
const FIELD_KEYS: [&str; 8] = [
    "submissionDate",
    "submissionTime",
    "likedMost",
    "planningToBuy",
    "interestedIn",
    "experienceRating",
    "name",
    "whatsapp",
];

/// Single JSON file holding an array of submissions
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonStore { path: path.into() }
    }

    /// Current entries for an append
    ///
    /// A missing file and unreadable content both start a fresh array; the
    /// latter is logged since the old content will be replaced.
    fn existing_entries(&self) -> Vec<Value> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(
                    "Could not read {} ({}), starting a new array",
                    self.path.display(),
                    e
                );
                return Vec::new();
            }
        };

        if contents.trim().is_empty() {
            return Vec::new();
        }

        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                warn!(
                    "{} does not hold a JSON array, starting a new one",
                    self.path.display()
                );
                Vec::new()
            }
            Err(e) => {
                warn!(
                    "Could not parse {} ({}), starting a new array",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }
}

impl StorageBackend for JsonStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Json
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &FeedbackRecord, captured_at: &DateTime<Local>) -> Result<()> {
        let mut entries = self.existing_entries();

        let entry = StoredFeedback {
            record,
            raw_timestamp: captured_at
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        entries.push(serde_json::to_value(&entry)?);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&entries)?;
        fs::write(&self.path, json)?;

        info!(
            "Feedback saved to JSON file {} ({} entries)",
            self.path.display(),
            entries.len()
        );
        Ok(())
    }

    fn load(&self) -> Result<Vec<FeedbackRecord>> {
        if !self.path.exists() {
            return Err(StorageError::NotFound(self.path.display().to_string()));
        }

        let contents = fs::read_to_string(&self.path)?;
        let entries: Vec<Value> = serde_json::from_str(&contents)?;

        Ok(entries
            .iter()
            .map(|entry| record_from_entry(entry).with_normalized_timestamp())
            .collect())
    }
}

/// Read one stored entry into a record
///
/// Accepts the camelCase keys of this release as well as the column header
/// labels used by older files. Numbers and arrays are flattened to text.
fn record_from_entry(entry: &Value) -> FeedbackRecord {
    let cells: Vec<String> = FIELD_KEYS
        .iter()
        .zip(HEADERS.iter())
        .map(|(key, label)| {
            entry
                .get(*key)
                .or_else(|| entry.get(*label))
                .map(value_text)
                .unwrap_or_default()
        })
        .collect();

    FeedbackRecord::from_row(cells.as_slice())
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}
