//! Spreadsheet backend
//!
//! The workbook holds one sheet with a styled header row followed by one
//! row per submission. `rust_xlsxwriter` cannot edit an existing file, so
//! every write reads the current rows with `calamine`, normalizes them,
//! adds the new row and writes the whole sheet back out.

use calamine::{Data, Reader, Xlsx, open_workbook};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use rust_xlsxwriter::{Color, Format, FormatPattern, Workbook};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, StorageError};
use crate::record::{FIELD_COUNT, FeedbackRecord, HEADERS};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::store::{BackendKind, StorageBackend};
use crate::timefmt;

/// Name of the sheet holding the submissions
pub const SHEET_NAME: &str = "Feedback Data";

/// Number formats for the date and time cells of a new row
const DATE_FORMAT: &str = "d/m/yyyy";
const TIME_FORMAT: &str = "hh:mm:ss am/pm";

/// Column widths of a freshly created workbook
const DEFAULT_WIDTHS: [f64; FIELD_COUNT] = [15.0, 15.0, 20.0, 15.0, 20.0, 12.0, 20.0, 18.0];

const MIN_COLUMN_WIDTH: usize = 12;
const WIDTH_PADDING: usize = 2;
const EMPTY_CELL_WIDTH: usize = 10;

const DATE_COLUMN: usize = 0;
const TIME_COLUMN: usize = 1;

lazy_static! {
    // Day zero of the 1900 date system, as Excel counts it
    static ref EXCEL_EPOCH: NaiveDateTime = NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
}

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Outcome of a repair run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RepairSummary {
    pub total_rows: usize,
    pub unique_rows: usize,
    pub removed_rows: usize,
}

/// One data row as held between reading and rewriting the sheet
///
/// `cells` are display strings. The date and time cells additionally keep
/// the underlying timestamp when the workbook stored a real date value, so
/// rewriting does not downgrade them to text.
#[derive(Debug, Clone, PartialEq)]
struct SheetRow {
    cells: Vec<String>,
    date_value: Option<NaiveDateTime>,
    time_value: Option<NaiveDateTime>,
}

impl SheetRow {
    fn from_record(record: &FeedbackRecord, captured_at: NaiveDateTime) -> Self {
        SheetRow {
            cells: record.to_row().iter().map(|c| c.to_string()).collect(),
            date_value: Some(captured_at),
            time_value: Some(captured_at),
        }
    }

    fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }

    /// Pipe-joined cells, used to spot duplicates
    fn key(&self) -> String {
        self.cells.join("|")
    }
}

/// Workbook file with a single feedback sheet
pub struct ExcelStore {
    path: PathBuf,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ExcelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ExcelStore {
            path: path.into(),
            retry: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
        }
    }

    /// Replace the write retry policy and the way it pauses
    pub fn with_retry(mut self, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        self.retry = retry;
        self.sleeper = sleeper;
        self
    }

    /// Create the workbook with its header row if it does not exist yet
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }

        info!("Creating new workbook at {}", self.path.display());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut workbook = build_workbook(&[], &DEFAULT_WIDTHS)?;
        self.save_with_retry(&mut workbook)
    }

    /// Check whether the file can be opened for writing
    ///
    /// Another program (typically a spreadsheet application) holding the
    /// file makes this fail. The write is still attempted afterwards.
    fn is_locked(&self) -> bool {
        match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(_) => false,
            Err(e) => {
                warn!(
                    "Workbook {} appears to be locked by another application: {}",
                    self.path.display(),
                    e
                );
                true
            }
        }
    }

    /// Read every data row below the header, with dates and times normalized
    fn read_rows(&self) -> Result<Vec<SheetRow>> {
        let mut workbook: Xlsx<_> = open_workbook(&self.path)?;

        if !workbook.sheet_names().iter().any(|name| name == SHEET_NAME) {
            return Err(StorageError::SheetMissing(SHEET_NAME.to_string()));
        }

        let range = workbook.worksheet_range(SHEET_NAME)?;
        let last_row = match range.end() {
            Some((row, _)) => row,
            None => return Ok(Vec::new()),
        };

        let mut rows = Vec::new();
        // Row 0 is the header; it is always rewritten with the expected labels
        for row in 1..=last_row {
            let mut sheet_row = SheetRow {
                cells: Vec::with_capacity(FIELD_COUNT),
                date_value: None,
                time_value: None,
            };

            for col in 0..FIELD_COUNT {
                let data = range.get_value((row, col as u32));
                let (text, value) = cell_text(data, col);
                match col {
                    DATE_COLUMN => sheet_row.date_value = value,
                    TIME_COLUMN => sheet_row.time_value = value,
                    _ => {}
                }
                sheet_row.cells.push(text);
            }

            rows.push(sheet_row);
        }

        Ok(rows)
    }

    /// Rows for an append: a missing sheet is recreated rather than an error
    fn rows_for_append(&self) -> Result<Vec<SheetRow>> {
        match self.read_rows() {
            Ok(rows) => Ok(rows),
            Err(StorageError::SheetMissing(name)) => {
                warn!("Worksheet '{}' not found, creating a new one", name);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn save_with_retry(&self, workbook: &mut Workbook) -> Result<()> {
        self.retry
            .run(self.sleeper.as_ref(), |attempt| {
                debug!("Saving workbook {} (attempt {})", self.path.display(), attempt);
                workbook.save(&self.path)
            })
            .map_err(|(attempts, e)| StorageError::RetriesExhausted {
                attempts,
                source: Box::new(e.into()),
            })
    }

    /// Remove duplicate and blank rows and rewrite the sheet
    ///
    /// Rows are compared on their eight cells after date and time
    /// normalization; the first occurrence wins and keeps its position.
    /// The sheet is rewritten from scratch and the previous content is not
    /// kept anywhere.
    pub fn repair(&self) -> Result<RepairSummary> {
        if !self.path.exists() {
            return Err(StorageError::NotFound(self.path.display().to_string()));
        }

        let rows = self.read_rows()?;
        let total_rows = rows.len();

        let mut seen = HashSet::new();
        let unique: Vec<SheetRow> = rows
            .into_iter()
            .filter(|row| !row.is_blank())
            .filter(|row| seen.insert(row.key()))
            .collect();

        let summary = RepairSummary {
            total_rows,
            unique_rows: unique.len(),
            removed_rows: total_rows - unique.len(),
        };

        let mut workbook = build_workbook(&unique, &column_widths(&unique))?;
        self.save_with_retry(&mut workbook)?;

        info!(
            "Workbook repaired: {} rows read, {} kept, {} removed",
            summary.total_rows, summary.unique_rows, summary.removed_rows
        );
        Ok(summary)
    }
}

impl StorageBackend for ExcelStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Excel
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &FeedbackRecord, captured_at: &DateTime<Local>) -> Result<()> {
        self.ensure_exists()?;
        let locked = self.is_locked();

        let mut rows = self.rows_for_append()?;
        rows.push(SheetRow::from_record(record, captured_at.naive_local()));
        let next_row = rows.len() + 1;

        let mut workbook = build_workbook(&rows, &column_widths(&rows))?;
        match self.save_with_retry(&mut workbook) {
            Ok(()) => {
                info!(
                    "Workbook updated, data written to row {} of {}",
                    next_row,
                    self.path.display()
                );
                if locked {
                    warn!("Workbook was locked during the write; close it if updates do not appear");
                }
                Ok(())
            }
            Err(e) if locked => Err(StorageError::Locked {
                source: Box::new(e),
            }),
            Err(e) => Err(e),
        }
    }

    fn load(&self) -> Result<Vec<FeedbackRecord>> {
        if !self.path.exists() {
            return Err(StorageError::NotFound(self.path.display().to_string()));
        }

        Ok(self
            .read_rows()?
            .into_iter()
            .filter(|row| !row.is_blank())
            .map(|row| FeedbackRecord::from_row(row.cells.as_slice()))
            .collect())
    }
}

/// Build a workbook holding the header and the given rows
fn build_workbook(rows: &[SheetRow], widths: &[f64; FIELD_COUNT]) -> Result<Workbook> {
    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::Black)
        .set_pattern(FormatPattern::Solid)
        .set_background_color(Color::RGB(0xE6E6E6));
    let date_format = Format::new().set_num_format(DATE_FORMAT);
    let time_format = Format::new().set_num_format(TIME_FORMAT);

    let mut workbook = Workbook::new();
    {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(SHEET_NAME)?;

        for (col, header) in HEADERS.iter().enumerate() {
            worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        }

        for (index, row) in rows.iter().enumerate() {
            let row_num = (index + 1) as u32;

            for (col, text) in row.cells.iter().enumerate() {
                let stamp = match col {
                    DATE_COLUMN => row.date_value.map(|v| (v, &date_format)),
                    TIME_COLUMN => row.time_value.map(|v| (v, &time_format)),
                    _ => None,
                };

                match stamp {
                    Some((value, format)) => {
                        worksheet.write_number_with_format(
                            row_num,
                            col as u16,
                            to_excel_serial(&value),
                            format,
                        )?;
                    }
                    None if text.is_empty() => {}
                    None => {
                        worksheet.write_string(row_num, col as u16, text)?;
                    }
                }
            }
        }

        for (col, width) in widths.iter().enumerate() {
            worksheet.set_column_width(col as u16, *width)?;
        }
    }

    Ok(workbook)
}

/// Column widths fitted to the longest value in each column
///
/// Empty cells count as 10 characters; every column gets 2 characters of
/// padding and is never narrower than 12.
fn column_widths(rows: &[SheetRow]) -> [f64; FIELD_COUNT] {
    let mut widths = [0.0; FIELD_COUNT];

    for (col, width) in widths.iter_mut().enumerate() {
        let cell_len = |text: &str| match text.chars().count() {
            0 => EMPTY_CELL_WIDTH,
            n => n,
        };

        let longest = rows
            .iter()
            .map(|row| row.cells.get(col).map_or(EMPTY_CELL_WIDTH, |c| cell_len(c)))
            .chain(std::iter::once(cell_len(HEADERS[col])))
            .max()
            .unwrap_or(EMPTY_CELL_WIDTH);

        *width = (longest + WIDTH_PADDING).max(MIN_COLUMN_WIDTH) as f64;
    }

    widths
}

/// Display text of a cell, plus the timestamp for date and time cells
fn cell_text(data: Option<&Data>, col: usize) -> (String, Option<NaiveDateTime>) {
    let data = match data {
        Some(data) => data,
        None => return (String::new(), None),
    };

    if col == DATE_COLUMN || col == TIME_COLUMN {
        let stamp = match data {
            Data::DateTime(dt) => from_excel_serial(dt.as_f64()),
            Data::Float(serial) => from_excel_serial(*serial),
            _ => None,
        };

        if let Some(at) = stamp {
            let text = if col == DATE_COLUMN {
                timefmt::display_date(&at)
            } else {
                timefmt::display_time(&at)
            };
            return (text, Some(at));
        }

        let raw = plain_text(data);
        let text = if col == DATE_COLUMN {
            timefmt::normalize_date(&raw)
        } else {
            timefmt::normalize_time(&raw)
        };
        return (text, None);
    }

    (plain_text(data), None)
}

fn plain_text(data: &Data) -> String {
    match data {
        Data::String(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => from_excel_serial(dt.as_f64())
            .map(|at| at.to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

fn to_excel_serial(at: &NaiveDateTime) -> f64 {
    (*at - *EXCEL_EPOCH).num_milliseconds() as f64 / MILLIS_PER_DAY
}

fn from_excel_serial(serial: f64) -> Option<NaiveDateTime> {
    // Anything past 9999-12-31 is not a date Excel can show
    if !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    EXCEL_EPOCH.checked_add_signed(Duration::milliseconds(millis))
}
