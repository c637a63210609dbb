//! End-to-end runs of the orchestrator against in-memory collaborators.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use nessus_courier::config::{AppConfig, FolderConfig, MailConfig};
use nessus_courier::mail::{Mailer, OutgoingMail};
use nessus_courier::nessus::{ExportRequest, ExportStatus, FileId, Scan, ScanPlatform};
use nessus_courier::notify::{Notifier, Severity};
use nessus_courier::runner::{FolderOutcome, Runner};
use nessus_courier::{MonthTag, ReportError};

/// In-memory platform. Scans listed in `failing_exports` reject every export;
/// `list_failures` makes `list_scans` fail that many times before succeeding.
#[derive(Default)]
struct MemoryPlatform {
    scans: Vec<Scan>,
    failing_exports: Vec<i64>,
    list_failures: AtomicUsize,
    export_calls: Mutex<Vec<(i64, String)>>,
}

#[async_trait::async_trait]
impl ScanPlatform for MemoryPlatform {
    async fn list_scans(&self) -> Result<Vec<Scan>, ReportError> {
        let remaining = self.list_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.list_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ReportError::transport("memory://scans", "HTTP 502"));
        }
        Ok(self.scans.clone())
    }

    async fn request_export(
        &self,
        scan_id: i64,
        request: &ExportRequest,
    ) -> Result<FileId, ReportError> {
        self.export_calls
            .lock()
            .unwrap()
            .push((scan_id, request.chapters.clone()));
        if self.failing_exports.contains(&scan_id) {
            return Err(ReportError::ExportRequest {
                scan_id,
                reason: "HTTP 500".to_string(),
            });
        }
        Ok(FileId(format!("{scan_id}-{}", request.chapters.len())))
    }

    async fn export_status(
        &self,
        _scan_id: i64,
        _file_id: &FileId,
    ) -> Result<ExportStatus, ReportError> {
        Ok(ExportStatus::Ready)
    }

    async fn download_export(
        &self,
        scan_id: i64,
        file_id: &FileId,
    ) -> Result<Vec<u8>, ReportError> {
        Ok(format!("<html>{scan_id} {file_id}</html>").into_bytes())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    events: Mutex<Vec<(String, Severity)>>,
}

impl RecordingNotifier {
    fn events(&self) -> Vec<(String, Severity)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: &str, severity: Severity) {
        self.events
            .lock()
            .unwrap()
            .push((message.to_string(), severity));
    }
}

#[derive(Default)]
struct RecordingMailer {
    fail: bool,
    sent: Mutex<Vec<OutgoingMail>>,
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), ReportError> {
        if self.fail {
            return Err(ReportError::delivery("connection refused"));
        }
        assert!(mail.attachment.exists(), "attachment must exist when mailing");
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}

fn scan(id: i64, name: &str, folder: i64) -> Scan {
    Scan {
        id,
        name: name.to_string(),
        folder_id: Some(folder),
    }
}

fn config(output_dir: &Path) -> AppConfig {
    let mut config = AppConfig {
        folders: vec![
            FolderConfig {
                id: 3,
                name: "PH".to_string(),
            },
            FolderConfig {
                id: 4,
                name: "TP".to_string(),
            },
        ],
        output_dir: output_dir.to_path_buf(),
        mail: MailConfig {
            from: "scanner@example.com".to_string(),
            to: vec!["sec@example.com".to_string()],
            subject_prefix: "Nessus Report".to_string(),
            ..MailConfig::default()
        },
        ..AppConfig::default()
    };
    config.export.poll_interval_secs = 0;
    config
}

fn month() -> MonthTag {
    "202501".parse().unwrap()
}

fn zip_entries(path: &Path) -> Vec<String> {
    let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    archive.file_names().map(String::from).collect()
}

#[tokio::test]
async fn test_two_scan_folder_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let platform = MemoryPlatform {
        scans: vec![
            scan(1, "Web App", 3),
            scan(2, "DB/Srv", 3),
            scan(9, "Elsewhere", 8),
        ],
        ..MemoryPlatform::default()
    };
    let notifier = RecordingNotifier::default();
    let mailer = RecordingMailer::default();

    let runner = Runner::new(&config, &platform, &notifier, &mailer);
    let outcome = runner.process_folder(&config.folders[0], &month()).await;

    let archive = match outcome {
        FolderOutcome::Packaged { archive, emailed: true } => archive,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(archive.path, dir.path().join("nessus_reports_PH_202501.zip"));

    let mut entries = zip_entries(&archive.path);
    entries.sort();
    assert_eq!(
        entries,
        vec![
            "DB_Srv_202501_remediations_report.html",
            "DB_Srv_202501_vuln_summary_report.html",
            "Web_App_202501_remediations_report.html",
            "Web_App_202501_vuln_summary_report.html",
        ]
    );

    // Two exports per scan in the folder, never for scans outside it.
    let calls = platform.export_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 4);
    assert!(calls.iter().all(|(id, _)| *id == 1 || *id == 2));

    let sent = mailer.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Nessus Report - PH - 202501");
    assert_eq!(sent[0].attachment, archive.path);
    assert_eq!(sent[0].to, vec!["sec@example.com"]);

    let events = notifier.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].1, Severity::Good);
    assert!(events[0].0.contains("successfully packaged: nessus_reports_PH_202501.zip"));
    assert_eq!(events[1].1, Severity::Good);
    assert!(events[1]
        .0
        .contains("Nessus Report - PH - 202501 Email has been sent to sec@example.com"));
}

#[tokio::test]
async fn test_empty_folder_skips_archive_and_email() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let platform = MemoryPlatform {
        scans: vec![scan(1, "Web App", 3)],
        ..MemoryPlatform::default()
    };
    let notifier = RecordingNotifier::default();
    let mailer = RecordingMailer::default();

    let runner = Runner::new(&config, &platform, &notifier, &mailer);
    let outcome = runner.process_folder(&config.folders[1], &month()).await;

    assert_eq!(outcome, FolderOutcome::Skipped);
    assert!(!dir.path().join("nessus_reports_TP_202501.zip").exists());
    assert!(mailer.sent.lock().unwrap().is_empty());
    assert!(platform.export_calls.lock().unwrap().is_empty());

    let events = notifier.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1, Severity::Warning);
    assert!(events[0].0.contains("[TP] No scanning tasks found"));
}

#[tokio::test]
async fn test_failed_exports_still_emailed() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let platform = MemoryPlatform {
        scans: vec![scan(1, "Web App", 3), scan(2, "DB/Srv", 3)],
        failing_exports: vec![1],
        ..MemoryPlatform::default()
    };
    let notifier = RecordingNotifier::default();
    let mailer = RecordingMailer::default();

    let runner = Runner::new(&config, &platform, &notifier, &mailer);
    let outcome = runner.process_folder(&config.folders[0], &month()).await;

    let FolderOutcome::Packaged { archive, emailed } = outcome else {
        panic!("folder should still be packaged");
    };
    assert!(emailed);
    assert_eq!(archive.failed_exports, 2);
    assert_eq!(platform.export_calls.lock().unwrap().len(), 4);

    let mut entries = zip_entries(&archive.path);
    entries.sort();
    assert_eq!(
        entries,
        vec![
            "DB_Srv_202501_remediations_report.html",
            "DB_Srv_202501_vuln_summary_report.html",
        ]
    );
    assert!(notifier.events()[0].0.contains("(2 exports failed)"));
}

#[tokio::test]
async fn test_mail_failure_notifies_attention() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let platform = MemoryPlatform {
        scans: vec![scan(1, "Web App", 3)],
        ..MemoryPlatform::default()
    };
    let notifier = RecordingNotifier::default();
    let mailer = RecordingMailer {
        fail: true,
        ..RecordingMailer::default()
    };

    let runner = Runner::new(&config, &platform, &notifier, &mailer);
    let outcome = runner.process_folder(&config.folders[0], &month()).await;

    assert!(matches!(outcome, FolderOutcome::Packaged { emailed: false, .. }));
    let events = notifier.events();
    let last = events.last().unwrap();
    assert_eq!(last.1, Severity::Attention);
    assert!(last.0.contains("PH Email sending failed"));
    assert!(last.0.contains("connection refused"));
}

#[tokio::test]
async fn test_folder_failure_does_not_stop_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let platform = MemoryPlatform {
        scans: vec![scan(1, "Web App", 3), scan(5, "Branch", 4)],
        list_failures: AtomicUsize::new(1),
        ..MemoryPlatform::default()
    };
    let notifier = RecordingNotifier::default();
    let mailer = RecordingMailer::default();

    let runner = Runner::new(&config, &platform, &notifier, &mailer);
    let summary = runner.run(&month()).await;

    assert_eq!(summary.folders.len(), 2);
    assert_eq!(summary.folders[0].folder, "PH");
    assert!(matches!(
        summary.folders[0].outcome,
        FolderOutcome::Failed(ref msg) if msg.contains("HTTP 502")
    ));
    assert_eq!(summary.folders[1].folder, "TP");
    assert!(matches!(summary.folders[1].outcome, FolderOutcome::Packaged { emailed: true, .. }));
    assert_eq!(summary.emailed(), 1);
    assert_eq!(summary.failed_exports(), 0);

    assert!(!dir.path().join("nessus_reports_PH_202501.zip").exists());
    assert!(dir.path().join("nessus_reports_TP_202501.zip").exists());

    let severities: HashMap<Severity, usize> =
        notifier.events().into_iter().fold(HashMap::new(), |mut acc, (_, sev)| {
            *acc.entry(sev).or_default() += 1;
            acc
        });
    assert_eq!(severities.get(&Severity::Attention), Some(&1));
    assert_eq!(severities.get(&Severity::Good), Some(&2));
    assert!(notifier.events()[0].0.contains("[PH] Nessus report processing failed"));
}

#[tokio::test]
async fn test_rerun_overwrites_archive() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let notifier = RecordingNotifier::default();
    let mailer = RecordingMailer::default();

    let first = MemoryPlatform {
        scans: vec![scan(1, "Web App", 3), scan(2, "DB/Srv", 3)],
        ..MemoryPlatform::default()
    };
    Runner::new(&config, &first, &notifier, &mailer)
        .process_folder(&config.folders[0], &month())
        .await;

    let second = MemoryPlatform {
        scans: vec![scan(2, "DB/Srv", 3)],
        ..MemoryPlatform::default()
    };
    Runner::new(&config, &second, &notifier, &mailer)
        .process_folder(&config.folders[0], &month())
        .await;

    let entries = zip_entries(&dir.path().join("nessus_reports_PH_202501.zip"));
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.starts_with("DB_Srv_")));
}
