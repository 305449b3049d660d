//! Error types for the storage layer

use thiserror::Error;

/// Result type used by every storage backend
pub type Result<T> = std::result::Result<T, StorageError>;

/// Failures a storage backend can report
///
/// The fallback coordinator turns these into per-backend report entries,
/// so none of them ever reaches a request handler as a panic.
#[derive(Error, Debug)]
pub enum StorageError {
    /// File system error (open, read, write, create directory)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error while building or saving a workbook
    #[error("Spreadsheet write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Error while opening or reading a workbook
    #[error("Spreadsheet read error: {0}")]
    XlsxRead(#[from] calamine::XlsxError),

    /// The workbook exists but has no sheet with the expected name
    #[error("Worksheet '{0}' not found")]
    SheetMissing(String),

    /// A backing file that the operation needs does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation is not available with the current configuration
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A blocking task was cancelled or panicked
    #[error("Background task failed: {0}")]
    Join(String),

    /// A write failed while another program held the file open
    #[error("{source} (file may be locked by another application; close it and try again)")]
    Locked {
        #[source]
        source: Box<StorageError>,
    },

    /// Every write attempt failed; carries the last error
    #[error("Write failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<StorageError>,
    },
}
