//! nessus-courier -- monthly Nessus report export, packaging and delivery.
//!
//! For each configured folder on the scanning platform, every scan is
//! exported in two report flavours, the results are zipped into one archive
//! per folder and month, and the archive is emailed to a distribution list.
//! Progress and failures are posted to a Teams webhook.

pub mod archive;
pub mod config;
pub mod error;
pub mod export;
pub mod logging;
pub mod mail;
pub mod month;
pub mod nessus;
pub mod notify;
pub mod runner;

pub use error::ReportError;
pub use month::MonthTag;

use anyhow::Result;

use crate::config::AppConfig;
use crate::mail::SmtpMailer;
use crate::nessus::NessusClient;
use crate::notify::TeamsNotifier;
use crate::runner::{RunSummary, Runner};

/// Run every configured folder against the live platform, relay and webhook.
pub async fn run(config: &AppConfig, month: &MonthTag) -> Result<RunSummary> {
    let platform = NessusClient::new(&config.nessus)?;
    let notifier = TeamsNotifier::new(&config.notify)?;
    let mailer = SmtpMailer::new(&config.mail);

    let runner = Runner::new(config, &platform, &notifier, &mailer);
    Ok(runner.run(month).await)
}
