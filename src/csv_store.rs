//! Flat CSV backend
//!
//! One header line followed by one line per submission. Each append opens
//! the file, writes a single line and closes it again; nothing is cached.

use log::{debug, info};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::{Result, StorageError};
use crate::record::{FeedbackRecord, HEADERS};
use crate::store::{BackendKind, StorageBackend};

/// Multi-select answers are joined with this in CSV, keeping commas for columns
pub const CSV_SEPARATOR: &str = "; ";

/// Append-only CSV file
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvStore { path: path.into() }
    }
}

impl StorageBackend for CsvStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Csv
    }

    fn list_separator(&self) -> &'static str {
        CSV_SEPARATOR
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &FeedbackRecord, _captured_at: &DateTime<Local>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // An existing but empty file still needs its header
        let needs_header = fs::metadata(&self.path).map_or(true, |meta| meta.len() == 0);

        let mut content = String::new();
        if needs_header {
            debug!("Creating CSV file with header at {}", self.path.display());
            content.push_str(&to_csv_line(&HEADERS));
        }
        content.push_str(&to_csv_line(&record.to_row()));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(content.as_bytes())?;

        info!("Feedback appended to CSV file {}", self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Vec<FeedbackRecord>> {
        if !self.path.exists() {
            return Err(StorageError::NotFound(self.path.display().to_string()));
        }

        let text = fs::read_to_string(&self.path)?;
        let mut rows = parse_csv(&text).into_iter().peekable();

        if rows
            .peek()
            .is_some_and(|first| first.first().map(String::as_str) == Some(HEADERS[0]))
        {
            rows.next();
        }

        Ok(rows
            .map(|row| FeedbackRecord::from_row(row.as_slice()).with_normalized_timestamp())
            .collect())
    }
}

/// Escape one CSV field
///
/// A field is quoted, with internal quotes doubled, only when it contains a
/// comma, a quote or a line break.
///
/// # Examples
/// ```
/// use feedback_ledger::csv_store::escape_field;
///
/// assert_eq!(escape_field("plain"), "plain");
/// assert_eq!(escape_field("a, b"), "\"a, b\"");
/// assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
/// ```
pub fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        let escaped = value.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    } else {
        value.to_string()
    }
}

/// Join escaped fields into one newline-terminated line
pub fn to_csv_line(fields: &[&str]) -> String {
    let mut line = fields
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Parse CSV text into rows of fields
///
/// Quote-aware: quoted fields may contain commas, doubled quotes and line
/// breaks. Both `\n` and `\r\n` end a row. Blank lines are skipped.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    let mut finish_row = |row: &mut Vec<String>, field: &mut String| {
        row.push(std::mem::take(field));
        let done = std::mem::take(row);
        if !(done.len() == 1 && done[0].is_empty()) {
            rows.push(done);
        }
    };

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    // Doubled quote inside a quoted field
                    current_field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => row.push(std::mem::take(&mut current_field)),
            '\r' if !in_quotes => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                finish_row(&mut row, &mut current_field);
            }
            '\n' if !in_quotes => finish_row(&mut row, &mut current_field),
            _ => current_field.push(c),
        }
    }

    if !current_field.is_empty() || !row.is_empty() {
        finish_row(&mut row, &mut current_field);
    }

    rows
}
