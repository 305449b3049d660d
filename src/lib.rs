/*!
# Feedback Ledger

A small feedback collection service that writes every submission to three
files at once: a spreadsheet, a JSON array and a CSV log.

## Overview

Customers fill in a form; the server normalizes the answers into one fixed
record shape and hands it to every configured storage backend. A save
succeeds when at least one backend kept the record, so a locked workbook or
a read-only disk degrades the service instead of losing the submission.

## Architecture

### Storage Layer
- **record**: Canonical feedback record and payload normalization
- **timefmt**: Display formats for dates and times, plus legacy cleanup
- **csv_store**: Append-only CSV log with quote-aware parsing
- **json_store**: Pretty-printed JSON array, rewritten on each save
- **excel_store**: Styled workbook with write retry and a repair operation
- **retry**: Bounded retry policy with an injectable sleeper
- **store**: Fallback coordinator over the ordered backend list

### Runtime
- **environment**: Local or hosted classification from process markers
- **config**: Command line and environment configuration, storage paths
- **error**: Storage error type
- **app**: Routing and request handlers (requires the `web` feature)

## REST API Endpoints

- `GET /` - Feedback form
- `POST /submit-feedback` - Store a submission (JSON or form encoded)
- `GET /view-feedback` - Read stored records from the first usable source
- `GET /download-csv`, `/download-json`, `/download-excel` - Raw file download
- `POST /fix-excel` - Deduplicate and rewrite the workbook
- `GET /health` - Environment, uptime and file status
*/

pub mod config;
pub mod csv_store;
pub mod environment;
pub mod error;
pub mod excel_store;
pub mod json_store;
pub mod record;
pub mod retry;
pub mod store;
pub mod timefmt;

#[cfg(feature = "web")]
pub mod app;

pub use error::{Result, StorageError};
pub use record::{FeedbackPayload, FeedbackRecord};
pub use store::{BackendKind, FeedbackStore, SaveOutcome, StorageBackend};
