//! Chat notifications for run progress and failures.
//!
//! Notifications are fire-and-forget: [`Notifier::notify`] has no error
//! path, so a broken webhook can never interrupt report delivery.

pub mod card;

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::NotifyConfig;

/// Severity of a notification, rendered as the message color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Good,
    Warning,
    Attention,
}

impl Severity {
    /// Adaptive card text color.
    pub fn card_color(self) -> &'static str {
        match self {
            Severity::Info => "accent",
            Severity::Good => "good",
            Severity::Warning => "warning",
            Severity::Attention => "attention",
        }
    }
}

/// Receives status events from each pipeline stage.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str, severity: Severity);
}

/// Posts adaptive cards to a Microsoft Teams incoming webhook.
pub struct TeamsNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl TeamsNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            webhook_url: config.teams_webhook_url.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.webhook_url.is_some()
    }
}

#[async_trait::async_trait]
impl Notifier for TeamsNotifier {
    async fn notify(&self, message: &str, severity: Severity) {
        let Some(url) = self.webhook_url.as_deref() else {
            warn!("TEAMS_WEBHOOK_URL is not set, skipping Teams notification");
            return;
        };

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M").to_string();
        let payload = card::build(message, severity, &timestamp);

        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status() == StatusCode::ACCEPTED => {
                info!(?severity, "Teams notification sent");
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!(%status, %body, "Teams notification rejected");
            }
            Err(e) => {
                error!(error = %e, "Teams notification failed");
            }
        }
    }
}
