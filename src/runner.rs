//! Run orchestrator: list, package and deliver each configured folder.
//!
//! Failures are contained per folder. A folder that cannot be listed or
//! packaged is reported through the notifier and the run moves on to the
//! next one.

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::archive::{build_folder_archive, ArchiveSummary};
use crate::config::{AppConfig, FolderConfig};
use crate::error::ReportError;
use crate::export::ExportSettings;
use crate::mail::{compose_report_mail, Mailer};
use crate::month::MonthTag;
use crate::nessus::{scans_in_folder, ScanPlatform};
use crate::notify::{Notifier, Severity};

/// How one folder's processing ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderOutcome {
    /// Archive built; `emailed` tells whether the relay accepted the mail.
    Packaged {
        archive: ArchiveSummary,
        emailed: bool,
    },
    /// The folder had no scans.
    Skipped,
    /// Listing or packaging failed.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderReport {
    pub folder: String,
    pub outcome: FolderOutcome,
}

/// Result of a complete run over every configured folder.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub month: MonthTag,
    pub folders: Vec<FolderReport>,
}

impl RunSummary {
    pub fn emailed(&self) -> usize {
        self.folders
            .iter()
            .filter(|f| matches!(f.outcome, FolderOutcome::Packaged { emailed: true, .. }))
            .count()
    }

    pub fn failed_exports(&self) -> usize {
        self.folders
            .iter()
            .map(|f| match &f.outcome {
                FolderOutcome::Packaged { archive, .. } => archive.failed_exports,
                _ => 0,
            })
            .sum()
    }
}

/// Drives one monthly run. Collaborators are injected so the orchestration
/// can run against any platform, notifier and mailer.
pub struct Runner<'a> {
    config: &'a AppConfig,
    platform: &'a dyn ScanPlatform,
    notifier: &'a dyn Notifier,
    mailer: &'a dyn Mailer,
    export: ExportSettings,
}

impl<'a> Runner<'a> {
    pub fn new(
        config: &'a AppConfig,
        platform: &'a dyn ScanPlatform,
        notifier: &'a dyn Notifier,
        mailer: &'a dyn Mailer,
    ) -> Self {
        Self {
            config,
            platform,
            notifier,
            mailer,
            export: ExportSettings::from_config(&config.export),
        }
    }

    /// Process every configured folder in order.
    pub async fn run(&self, month: &MonthTag) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, month = %month);

        async {
            info!(folders = self.config.folders.len(), "starting Nessus report automation");

            let mut folders = Vec::with_capacity(self.config.folders.len());
            for folder in &self.config.folders {
                let outcome = self
                    .process_folder(folder, month)
                    .instrument(info_span!("folder", name = %folder.name, id = folder.id))
                    .await;
                folders.push(FolderReport {
                    folder: folder.name.clone(),
                    outcome,
                });
            }

            let summary = RunSummary {
                run_id,
                month: month.clone(),
                folders,
            };
            info!(
                folders = summary.folders.len(),
                emailed = summary.emailed(),
                failed_exports = summary.failed_exports(),
                "all folder report processing completed"
            );
            summary
        }
        .instrument(span)
        .await
    }

    /// List, package and deliver one folder. Never fails; errors become
    /// [`FolderOutcome::Failed`] plus an attention notification.
    pub async fn process_folder(&self, folder: &FolderConfig, month: &MonthTag) -> FolderOutcome {
        info!("processing folder");
        match self.package_folder(folder, month).await {
            Ok(Some(archive)) => {
                let emailed = self.deliver(folder, month, &archive).await;
                FolderOutcome::Packaged { archive, emailed }
            }
            Ok(None) => FolderOutcome::Skipped,
            Err(e) => {
                error!(error = %e, "folder processing failed");
                self.notifier
                    .notify(
                        &format!("❌ [{}] Nessus report processing failed: {e}", folder.name),
                        Severity::Attention,
                    )
                    .await;
                FolderOutcome::Failed(e.to_string())
            }
        }
    }

    async fn package_folder(
        &self,
        folder: &FolderConfig,
        month: &MonthTag,
    ) -> Result<Option<ArchiveSummary>, ReportError> {
        let scans = scans_in_folder(self.platform, folder.id).await?;
        if scans.is_empty() {
            warn!("no scans found in folder, skipping");
            self.notifier
                .notify(
                    &format!(
                        "⚠️ [{}] No scanning tasks found, skipping this month's Nessus report.",
                        folder.name
                    ),
                    Severity::Warning,
                )
                .await;
            return Ok(None);
        }

        let archive = build_folder_archive(
            self.platform,
            &scans,
            &folder.name,
            &self.config.output_dir,
            month,
            &self.export,
        )
        .await?;

        let mut message = format!(
            "✅ [{}] Nessus report for this month has been successfully packaged: {}",
            folder.name,
            archive.file_name()
        );
        if archive.failed_exports > 0 {
            warn!(failed_exports = archive.failed_exports, "archive is missing some reports");
            message.push_str(&format!(" ({} exports failed)", archive.failed_exports));
        }
        self.notifier.notify(&message, Severity::Good).await;

        Ok(Some(archive))
    }

    /// Email the archive. Returns whether the relay accepted it.
    async fn deliver(
        &self,
        folder: &FolderConfig,
        month: &MonthTag,
        archive: &ArchiveSummary,
    ) -> bool {
        let mail = compose_report_mail(&self.config.mail, &folder.name, month, &archive.path);
        let recipients = mail.to.join(", ");

        match self.mailer.send(&mail).await {
            Ok(()) => {
                info!(to = %recipients, attachment = %mail.attachment_name(), "email sent");
                self.notifier
                    .notify(
                        &format!(
                            "✅ {} Email has been sent to {} (Attachment: {})",
                            mail.subject,
                            recipients,
                            mail.attachment_name()
                        ),
                        Severity::Good,
                    )
                    .await;
                true
            }
            Err(e) => {
                error!(error = %e, "email sending failed");
                self.notifier
                    .notify(
                        &format!("❌ {} Email sending failed: {e}", folder.name),
                        Severity::Attention,
                    )
                    .await;
                false
            }
        }
    }
}
