//! Error kinds raised while exporting, packaging and delivering reports.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("export request for scan {scan_id} rejected: {reason}")]
    ExportRequest { scan_id: i64, reason: String },

    #[error("export {file_id} for scan {scan_id} not ready after {attempts} status polls")]
    ExportTimeout {
        scan_id: i64,
        file_id: String,
        attempts: u32,
    },

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

impl ReportError {
    pub fn transport(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        ReportError::Transport {
            url: url.into(),
            message: err.to_string(),
        }
    }

    pub fn delivery(err: impl std::fmt::Display) -> Self {
        ReportError::Delivery(err.to_string())
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::Filesystem {
            path: path.into(),
            source,
        }
    }
}
