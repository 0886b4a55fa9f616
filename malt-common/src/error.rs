use std::process::ExitStatus;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum MaltError {
    #[error("I/O Error: {0}")]
    Io(#[from] Arc<std::io::Error>),

    #[error("HTTP Request Error: {0}")]
    Http(#[from] Arc<reqwest::Error>),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] Arc<serde_json::Error>),

    #[error("Parsing Error in {0}: {1}")]
    Parse(&'static str, String),

    #[error("Formula Not Found: {0}")]
    NotFound(String),

    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("DownloadError: Failed to download '{0}' from '{1}': {2}")]
    Download(String, String, String),

    #[error("Checksum Mismatch: {0}")]
    ChecksumMismatch(String),

    #[error("Build failed with {status}: {output}")]
    Build { status: ExitStatus, output: String },

    #[error("Test procedure failed for '{0}': {1}")]
    Test(String, String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Installation Error: {0}")]
    Install(String),

    #[error("Failed to execute command: {0}")]
    CommandExec(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Timed out after {0}s: {1}")]
    Timeout(u64, String),

    #[error("Cache Error: {0}")]
    Cache(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for MaltError {
    fn from(err: std::io::Error) -> Self {
        MaltError::Io(Arc::new(err))
    }
}

impl From<reqwest::Error> for MaltError {
    fn from(err: reqwest::Error) -> Self {
        MaltError::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for MaltError {
    fn from(err: serde_json::Error) -> Self {
        MaltError::Json(Arc::new(err))
    }
}

impl MaltError {
    /// Process exit code for the CLI: each fatal error class gets its own
    /// code so scripts can tell a bad recipe from a bad download.
    pub fn exit_code(&self) -> i32 {
        match self {
            MaltError::Parse(_, _) | MaltError::Json(_) => 2,
            MaltError::NotFound(_) => 3,
            MaltError::Cycle(_) => 4,
            MaltError::Download(_, _, _) | MaltError::Http(_) => 5,
            MaltError::ChecksumMismatch(_) => 6,
            MaltError::Build { .. } => 7,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, MaltError>;
