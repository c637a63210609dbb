//! Report delivery by email.

use std::path::{Path, PathBuf};

use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::config::MailConfig;
use crate::error::ReportError;
use crate::month::MonthTag;

/// A report email with one zip attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    pub attachment: PathBuf,
}

impl OutgoingMail {
    pub fn attachment_name(&self) -> String {
        self.attachment
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "reports.zip".to_string())
    }
}

/// `{prefix} - {folder} - {month}`
pub fn report_subject(prefix: &str, folder_name: &str, month: &MonthTag) -> String {
    format!("{prefix} - {folder_name} - {month}")
}

/// Compose the monthly report email for one folder's archive.
pub fn compose_report_mail(
    config: &MailConfig,
    folder_name: &str,
    month: &MonthTag,
    archive: &Path,
) -> OutgoingMail {
    OutgoingMail {
        from: config.from.clone(),
        to: config.to.clone(),
        subject: report_subject(&config.subject_prefix, folder_name, month),
        body: format!(
            "Hi,\nThis is {folder_name} ({month}) Nessus scan report. \n\
             Please refer to the attached ZIP file.\n\n— Automated Reporting System"
        ),
        attachment: archive.to_path_buf(),
    }
}

#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), ReportError>;
}

/// Plain SMTP submission to a relay (no auth, no TLS).
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Self {
        let transport =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.smtp_server.as_str())
                .port(config.smtp_port)
                .build();
        Self { transport }
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), ReportError> {
        let message = build_message(mail)?;
        debug!(subject = %mail.subject, "submitting mail to relay");
        self.transport
            .send(message)
            .await
            .map_err(ReportError::delivery)?;
        Ok(())
    }
}

fn mailbox(addr: &str) -> Result<Mailbox, ReportError> {
    addr.parse::<Mailbox>()
        .map_err(|e| ReportError::delivery(format!("invalid address {addr:?}: {e}")))
}

/// Render the MIME message, reading the attachment from disk.
pub fn build_message(mail: &OutgoingMail) -> Result<Message, ReportError> {
    let data = std::fs::read(&mail.attachment)
        .map_err(|e| ReportError::filesystem(&mail.attachment, e))?;

    let mut builder = Message::builder()
        .from(mailbox(&mail.from)?)
        .subject(mail.subject.clone());
    for to in &mail.to {
        builder = builder.to(mailbox(to)?);
    }

    let zip_type = ContentType::parse("application/zip").map_err(ReportError::delivery)?;
    builder
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(mail.body.clone()))
                .singlepart(Attachment::new(mail.attachment_name()).body(data, zip_type)),
        )
        .map_err(ReportError::delivery)
}
