//! Scanning platform API: scan listing and the export job endpoints.

pub mod client;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ReportError;

pub use client::NessusClient;

/// A scan job as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scan {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub folder_id: Option<i64>,
}

/// Body of an export submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRequest {
    pub format: String,
    pub chapters: String,
}

/// Opaque handle of a server-side export job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileId(pub String);

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of an export job as reported by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Ready,
    /// Anything other than `ready`, carrying the raw status string.
    Pending(String),
}

impl ExportStatus {
    pub fn from_raw(raw: &str) -> Self {
        if raw == "ready" {
            ExportStatus::Ready
        } else {
            ExportStatus::Pending(raw.to_string())
        }
    }
}

/// Operations the report pipeline needs from the scanning platform.
#[async_trait::async_trait]
pub trait ScanPlatform: Send + Sync {
    /// List every scan visible to the API key.
    async fn list_scans(&self) -> Result<Vec<Scan>, ReportError>;

    /// Submit an export job and return its handle.
    async fn request_export(
        &self,
        scan_id: i64,
        request: &ExportRequest,
    ) -> Result<FileId, ReportError>;

    async fn export_status(
        &self,
        scan_id: i64,
        file_id: &FileId,
    ) -> Result<ExportStatus, ReportError>;

    /// Fetch the rendered export. Only valid once the job is ready.
    async fn download_export(&self, scan_id: i64, file_id: &FileId)
        -> Result<Vec<u8>, ReportError>;
}

/// List the scans that belong to `folder_id`.
pub async fn scans_in_folder(
    platform: &dyn ScanPlatform,
    folder_id: i64,
) -> Result<Vec<Scan>, ReportError> {
    info!(folder_id, "fetching scans in folder");
    let scans = filter_by_folder(platform.list_scans().await?, folder_id);
    info!(folder_id, count = scans.len(), "found scans in folder");
    Ok(scans)
}

fn filter_by_folder(scans: Vec<Scan>, folder_id: i64) -> Vec<Scan> {
    scans
        .into_iter()
        .filter(|scan| scan.folder_id == Some(folder_id))
        .collect()
}
