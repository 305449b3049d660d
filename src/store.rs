//! Fallback coordinator over the storage backends
//!
//! Backends sit in an ordered list behind [`StorageBackend`]. A save tries
//! every one of them and succeeds when at least one did; a read takes the
//! first backend, in list order, whose file exists and parses.

use chrono::{DateTime, Local};
use log::{error, info, warn};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::StoragePaths;
use crate::csv_store::CsvStore;
use crate::environment::Environment;
use crate::error::{Result, StorageError};
use crate::excel_store::{ExcelStore, RepairSummary};
use crate::json_store::JsonStore;
use crate::record::{DEFAULT_SEPARATOR, FeedbackPayload, FeedbackRecord};

/// Which kind of file a backend writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Excel,
    Json,
    Csv,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Excel => "excel",
            BackendKind::Json => "json",
            BackendKind::Csv => "csv",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A persistent store for feedback records
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Separator used to join multi-select answers for this backend
    fn list_separator(&self) -> &'static str {
        DEFAULT_SEPARATOR
    }

    /// File the backend writes to
    fn path(&self) -> &Path;

    fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Persist one record captured at `captured_at`
    fn append(&self, record: &FeedbackRecord, captured_at: &DateTime<Local>) -> Result<()>;

    /// Read back every stored record, dates and times normalized
    fn load(&self) -> Result<Vec<FeedbackRecord>>;
}

/// Source of the submission timestamp
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Result of one backend during a save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendReport {
    pub backend: BackendKind,
    pub success: bool,
    pub message: String,
}

/// Aggregated result of a save across all backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    pub success: bool,
    pub storage_methods: Vec<String>,
    pub details: Vec<BackendReport>,
}

/// Records read back from the first usable source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackView {
    pub data: Vec<FeedbackRecord>,
    pub source: String,
}

/// Whether each backend's file currently exists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub excel: bool,
    pub json: bool,
    pub csv: bool,
}

/// Files of the configured backends, in list order
///
/// Paths are fixed once a store is built, so a copy can be consulted
/// without going through the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendFiles(Vec<(BackendKind, PathBuf)>);

impl BackendFiles {
    /// Path of a backend's file, if that backend is configured
    pub fn path(&self, kind: BackendKind) -> Option<&Path> {
        self.0
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, path)| path.as_path())
    }

    /// Whether each backend's file currently exists
    pub fn status(&self) -> FileStatus {
        let exists = |kind| self.path(kind).is_some_and(|p| p.exists());
        FileStatus {
            excel: exists(BackendKind::Excel),
            json: exists(BackendKind::Json),
            csv: exists(BackendKind::Csv),
        }
    }
}

/// Coordinates saves and reads across the configured backends
pub struct FeedbackStore {
    backends: Vec<Box<dyn StorageBackend>>,
    excel: Option<Arc<ExcelStore>>,
    clock: Arc<dyn Clock>,
}

/// Lets the shared workbook handle sit in the backend list
impl StorageBackend for Arc<ExcelStore> {
    fn kind(&self) -> BackendKind {
        self.as_ref().kind()
    }

    fn path(&self) -> &Path {
        self.as_ref().path()
    }

    fn append(&self, record: &FeedbackRecord, captured_at: &DateTime<Local>) -> Result<()> {
        self.as_ref().append(record, captured_at)
    }

    fn load(&self) -> Result<Vec<FeedbackRecord>> {
        self.as_ref().load()
    }
}

impl FeedbackStore {
    /// Standard backend set for an environment
    ///
    /// The workbook is only part of the set in a local environment. Order is
    /// also read priority: workbook, then JSON, then CSV.
    pub fn for_environment(environment: &Environment, paths: &StoragePaths) -> Self {
        let excel = if environment.hosting {
            info!(
                "Hosted environment ({}), spreadsheet storage disabled",
                environment.platform
            );
            None
        } else {
            Some(Arc::new(ExcelStore::new(&paths.excel)))
        };

        Self::with_backends(
            excel,
            vec![
                Box::new(JsonStore::new(&paths.json)),
                Box::new(CsvStore::new(&paths.csv)),
            ],
        )
    }

    /// Build from explicit parts; `excel`, when given, is tried first
    pub fn with_backends(excel: Option<Arc<ExcelStore>>, others: Vec<Box<dyn StorageBackend>>) -> Self {
        let mut backends: Vec<Box<dyn StorageBackend>> = Vec::with_capacity(others.len() + 1);
        if let Some(excel) = &excel {
            backends.push(Box::new(Arc::clone(excel)));
        }
        backends.extend(others);

        FeedbackStore {
            backends,
            excel,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the timestamp source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Kinds of the configured backends, in order
    pub fn backend_kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    /// Save a submission to every backend
    ///
    /// The timestamp is taken once so every backend records the same
    /// instant. A failing backend is reported and the next one is tried.
    pub fn save(&self, payload: &FeedbackPayload) -> SaveOutcome {
        let captured_at = self.clock.now();
        let mut details = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let record = FeedbackRecord::normalize(payload, backend.list_separator(), &captured_at);

            let report = match backend.append(&record, &captured_at) {
                Ok(()) => BackendReport {
                    backend: backend.kind(),
                    success: true,
                    message: format!("Saved to {}", backend.path().display()),
                },
                Err(e) => {
                    warn!("{} backend failed: {}", backend.kind(), e);
                    BackendReport {
                        backend: backend.kind(),
                        success: false,
                        message: e.to_string(),
                    }
                }
            };
            details.push(report);
        }

        let storage_methods: Vec<String> = details
            .iter()
            .filter(|d| d.success)
            .map(|d| d.backend.name().to_string())
            .collect();
        let success = !storage_methods.is_empty();

        if success {
            info!("Feedback stored via: {}", storage_methods.join(", "));
        } else {
            error!("Feedback could not be stored by any backend");
        }

        SaveOutcome {
            success,
            storage_methods,
            details,
        }
    }

    /// Read records from the first backend that has a readable file
    pub fn load_all(&self) -> FeedbackView {
        for backend in &self.backends {
            if !backend.exists() {
                continue;
            }

            match backend.load() {
                Ok(data) => {
                    return FeedbackView {
                        data,
                        source: backend.kind().name().to_string(),
                    };
                }
                Err(e) => warn!("Could not read {} backend: {}", backend.kind(), e),
            }
        }

        FeedbackView {
            data: Vec::new(),
            source: "none".to_string(),
        }
    }

    /// Create the workbook up front so it can be opened before the first
    /// submission arrives. Failure is logged; saves will try again.
    pub fn prepare(&self) {
        if let Some(excel) = &self.excel {
            if let Err(e) = excel.ensure_exists() {
                warn!("Could not create workbook {}: {}", excel.path().display(), e);
                warn!("Spreadsheet storage may not work on this host, JSON and CSV remain available");
            }
        }
    }

    /// Deduplicate and rewrite the workbook
    pub fn repair(&self) -> Result<RepairSummary> {
        match &self.excel {
            Some(excel) => excel.repair(),
            None => Err(StorageError::Unsupported(
                "spreadsheet storage is disabled in this environment".to_string(),
            )),
        }
    }

    pub fn files(&self) -> BackendFiles {
        BackendFiles(
            self.backends
                .iter()
                .map(|b| (b.kind(), b.path().to_path_buf()))
                .collect(),
        )
    }
}
