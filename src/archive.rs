//! Per-folder zip archive of exported reports.

use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ReportError;
use crate::export::{export_report, ExportSettings, STANDARD_REPORTS};
use crate::month::MonthTag;
use crate::nessus::{Scan, ScanPlatform};

/// What ended up in a finished archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Entry names in write order.
    pub entries: Vec<String>,
    /// Exports that failed or came back empty and were left out.
    pub failed_exports: usize,
}

impl ArchiveSummary {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// `{output_dir}/nessus_reports_{folder}_{month}.zip`
pub fn archive_path(output_dir: &Path, folder_name: &str, month: &MonthTag) -> PathBuf {
    output_dir.join(format!("nessus_reports_{folder_name}_{month}.zip"))
}

/// Insert the scan id before `_report.{ext}`, for scans whose names collide
/// once sanitized.
fn disambiguate(filename: &str, scan_id: i64) -> String {
    match filename.rsplit_once("_report.") {
        Some((stem, ext)) => format!("{stem}_{scan_id}_report.{ext}"),
        None => format!("{scan_id}_{filename}"),
    }
}

/// Export every standard report for `scans` into one deflate-compressed archive.
///
/// An existing archive for the same folder and month is overwritten. Failed
/// exports are omitted; the archive is written as long as the file itself
/// can be created. Entry names are unique: a name already taken by an earlier
/// scan gets the scan id appended.
pub async fn build_folder_archive(
    platform: &dyn ScanPlatform,
    scans: &[Scan],
    folder_name: &str,
    output_dir: &Path,
    month: &MonthTag,
    settings: &ExportSettings,
) -> Result<ArchiveSummary, ReportError> {
    std::fs::create_dir_all(output_dir).map_err(|e| ReportError::filesystem(output_dir, e))?;

    let path = archive_path(output_dir, folder_name, month);
    let file = File::create(&path).map_err(|e| ReportError::filesystem(&path, e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = Vec::new();
    let mut written = HashSet::new();
    let mut failed_exports = 0;

    for scan in scans {
        for kind in &STANDARD_REPORTS {
            let artifact = match export_report(platform, scan, kind, month, settings).await {
                Some(artifact) if !artifact.content.is_empty() => artifact,
                Some(artifact) => {
                    warn!(file = %artifact.filename, "export returned no content, leaving it out");
                    failed_exports += 1;
                    continue;
                }
                None => {
                    failed_exports += 1;
                    continue;
                }
            };

            let mut name = artifact.filename;
            if written.contains(&name) {
                let renamed = disambiguate(&name, scan.id);
                warn!(
                    scan_id = scan.id,
                    file = %name,
                    renamed = %renamed,
                    "duplicate entry name"
                );
                name = renamed;
            }
            if !written.insert(name.clone()) {
                warn!(scan_id = scan.id, file = %name, "duplicate entry name, leaving it out");
                failed_exports += 1;
                continue;
            }

            zip.start_file(name.as_str(), options)
                .map_err(|source| ReportError::Archive {
                    path: path.clone(),
                    source,
                })?;
            zip.write_all(&artifact.content)
                .map_err(|e| ReportError::filesystem(&path, e))?;
            entries.push(name);
        }
    }

    zip.finish().map_err(|source| ReportError::Archive {
        path: path.clone(),
        source,
    })?;

    info!(
        folder = folder_name,
        path = %path.display(),
        entries = entries.len(),
        failed_exports,
        "archive created"
    );

    Ok(ArchiveSummary {
        path,
        entries,
        failed_exports,
    })
}
