//! Runtime configuration and storage locations
//!
//! Everything here is resolved once at startup and handed to the store and
//! the router explicitly.

#[cfg(feature = "web")]
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::environment::Environment;

/// File names of the three stores
pub const EXCEL_FILE: &str = "feedback_data.xlsx";
pub const JSON_FILE: &str = "feedback_data.json";
pub const CSV_FILE: &str = "feedback_data.csv";

/// Scratch directory name used when hosted
const HOSTED_DIR: &str = "feedback-ledger";

/// Server configuration, from command line or environment
#[cfg(feature = "web")]
#[derive(Debug, Clone, Parser)]
#[command(name = "website", about = "Feedback collection server")]
pub struct AppConfig {
    /// Address to listen on
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory for the data files when running locally
    #[arg(long, env = "FEEDBACK_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Directory of static assets served next to the form page
    #[arg(long, env = "FEEDBACK_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// File whose absence means the service runs on a managed host
    #[arg(long, env = "FEEDBACK_MARKER_FILE", default_value = "Cargo.toml")]
    pub marker_file: PathBuf,
}

/// Locations of the three backend files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    pub dir: PathBuf,
    pub excel: PathBuf,
    pub json: PathBuf,
    pub csv: PathBuf,
}

impl StoragePaths {
    /// All three files inside `dir`
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        StoragePaths {
            excel: dir.join(EXCEL_FILE),
            json: dir.join(JSON_FILE),
            csv: dir.join(CSV_FILE),
            dir,
        }
    }

    /// Choose the directory for an environment
    ///
    /// Local runs keep data in `data_dir`; hosted runs use a directory under
    /// the system temp dir since the working directory may be read-only.
    pub fn resolve(environment: &Environment, data_dir: &Path) -> Self {
        if environment.hosting {
            Self::in_dir(std::env::temp_dir().join(HOSTED_DIR))
        } else {
            Self::in_dir(data_dir)
        }
    }
}
