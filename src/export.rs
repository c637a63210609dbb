//! Export pipeline: submit an export job, wait for it, download the result.
//!
//! Failures are contained per artifact. [`export_report`] never returns an
//! error; a failed export is logged and reported as `None` so the caller can
//! carry on with the next one.

use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::ExportConfig;
use crate::error::ReportError;
use crate::month::MonthTag;
use crate::nessus::{ExportRequest, ExportStatus, Scan, ScanPlatform};

/// A named selection of report chapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportKind {
    /// Distinguishes the kind in the artifact filename.
    pub suffix: &'static str,
    /// Platform chapter selector string.
    pub chapters: &'static str,
}

pub const VULN_SUMMARY: ReportKind = ReportKind {
    suffix: "vuln_summary",
    chapters: "exploitable_vulns_top25;exploitable_vulns_by_plugin",
};

pub const REMEDIATIONS: ReportKind = ReportKind {
    suffix: "remediations",
    chapters: "remediations",
};

/// Reports produced for every scan, in archive order.
pub const STANDARD_REPORTS: [ReportKind; 2] = [VULN_SUMMARY, REMEDIATIONS];

/// How long to wait for a server-side export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` waits until the job is ready, however long that takes.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: Some(900),
        }
    }
}

/// Export settings shared by every pipeline in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    pub format: String,
    pub poll: PollPolicy,
}

impl ExportSettings {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            format: config.format.clone(),
            poll: PollPolicy {
                interval: Duration::from_secs(config.poll_interval_secs),
                max_attempts: (config.max_poll_attempts > 0).then_some(config.max_poll_attempts),
            },
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self::from_config(&ExportConfig::default())
    }
}

/// One downloaded report, ready to be written into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportArtifact {
    pub filename: String,
    pub content: Vec<u8>,
}

/// Replace path separators and whitespace so a scan name is safe as an
/// archive entry name.
pub fn sanitize_scan_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// `{safe_name}_{month}_{suffix}_report.{ext}`
pub fn report_filename(scan_name: &str, month: &MonthTag, kind: &ReportKind, ext: &str) -> String {
    format!(
        "{}_{}_{}_report.{}",
        sanitize_scan_name(scan_name),
        month,
        kind.suffix,
        ext
    )
}

/// Run the pipeline for one scan and report kind, skipping on failure.
pub async fn export_report(
    platform: &dyn ScanPlatform,
    scan: &Scan,
    kind: &ReportKind,
    month: &MonthTag,
    settings: &ExportSettings,
) -> Option<ReportArtifact> {
    match try_export(platform, scan, kind, month, settings).await {
        Ok(artifact) => {
            info!(
                scan = %scan.name,
                file = %artifact.filename,
                bytes = artifact.content.len(),
                "export successful"
            );
            Some(artifact)
        }
        Err(e) => {
            error!(scan = %scan.name, report = kind.suffix, error = %e, "export report failed");
            None
        }
    }
}

/// Submit, poll until ready, download.
pub async fn try_export(
    platform: &dyn ScanPlatform,
    scan: &Scan,
    kind: &ReportKind,
    month: &MonthTag,
    settings: &ExportSettings,
) -> Result<ReportArtifact, ReportError> {
    let request = ExportRequest {
        format: settings.format.clone(),
        chapters: kind.chapters.to_string(),
    };

    // 1. Submit.
    let file_id = platform.request_export(scan.id, &request).await?;
    debug!(scan_id = scan.id, file_id = %file_id, report = kind.suffix, "export requested");

    // 2. Poll until ready.
    let mut polls: u32 = 0;
    loop {
        match platform.export_status(scan.id, &file_id).await? {
            ExportStatus::Ready => break,
            ExportStatus::Pending(status) => {
                polls += 1;
                if settings.poll.max_attempts.is_some_and(|max| polls >= max) {
                    return Err(ReportError::ExportTimeout {
                        scan_id: scan.id,
                        file_id: file_id.0,
                        attempts: polls,
                    });
                }
                debug!(scan_id = scan.id, file_id = %file_id, %status, polls, "export not ready");
                tokio::time::sleep(settings.poll.interval).await;
            }
        }
    }

    // 3. Download.
    let content = platform.download_export(scan.id, &file_id).await?;

    Ok(ReportArtifact {
        filename: report_filename(&scan.name, month, kind, &settings.format),
        content,
    })
}
