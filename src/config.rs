//! Runtime configuration for nessus-courier.
//!
//! Settings are loaded once at startup from an optional TOML file and then
//! overlaid with the environment variables used by the original deployment
//! (`NESSUS_URL`, `ACCESS_KEY`, `EMAIL_TO`, ...). The resulting [`AppConfig`]
//! is immutable and handed to each component by reference.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "NESSUS_COURIER_CONFIG";

/// Config file picked up from the working directory when nothing else is set.
pub const DEFAULT_CONFIG_FILE: &str = "nessus-courier.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration for one report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nessus: NessusConfig,
    pub export: ExportConfig,
    /// Folders processed by `run`, in order.
    pub folders: Vec<FolderConfig>,
    pub output_dir: PathBuf,
    pub mail: MailConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nessus: NessusConfig::default(),
            export: ExportConfig::default(),
            folders: Vec::new(),
            output_dir: PathBuf::from("reports"),
            mail: MailConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parse configuration from a TOML file at `path`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Config file the CLI reads, if any:
    /// 1. `explicit` path (from `--config`), or the `NESSUS_COURIER_CONFIG` path.
    /// 2. `./nessus-courier.toml` if it exists.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(|| {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                local.exists().then(|| local.to_path_buf())
            })
    }

    /// Load configuration the way the CLI does: the file from
    /// [`AppConfig::locate`] or compiled-in defaults, with process environment
    /// variables applied on top. Call [`AppConfig::validate`] before starting
    /// a run.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::locate(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from an environment lookup.
    ///
    /// Blank values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get("NESSUS_URL") {
            self.nessus.url = url;
        }
        if let Some(key) = get("ACCESS_KEY") {
            self.nessus.access_key = key;
        }
        if let Some(key) = get("SECRET_KEY") {
            self.nessus.secret_key = key;
        }
        if let Some(flag) = get("NESSUS_VERIFY_TLS") {
            self.nessus.verify_tls = parse_bool(&flag)
                .with_context(|| format!("NESSUS_VERIFY_TLS is not a boolean: {flag}"))?;
        }

        for name in ["PH", "TP"] {
            let key = format!("{name}_FOLDER_ID");
            if let Some(raw) = get(key.as_str()) {
                let id: i64 = raw
                    .parse()
                    .with_context(|| format!("{key} is not a numeric folder id: {raw}"))?;
                self.upsert_folder(name, id);
            }
        }

        if let Some(dir) = get("OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(server) = get("SMTP_SERVER") {
            self.mail.smtp_server = server;
        }
        if let Some(port) = get("SMTP_PORT") {
            self.mail.smtp_port = port
                .parse()
                .with_context(|| format!("SMTP_PORT is not a port number: {port}"))?;
        }
        if let Some(from) = get("EMAIL_FROM") {
            self.mail.from = from;
        }
        if let Some(to) = get("EMAIL_TO") {
            self.mail.to = to
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(subject) = get("EMAIL_SUBJECT") {
            self.mail.subject_prefix = subject;
        }
        if let Some(url) = get("TEAMS_WEBHOOK_URL") {
            self.notify.teams_webhook_url = Some(url);
        }
        Ok(())
    }

    fn upsert_folder(&mut self, name: &str, id: i64) {
        match self.folders.iter_mut().find(|f| f.name == name) {
            Some(folder) => folder.id = id,
            None => self.folders.push(FolderConfig {
                id,
                name: name.to_string(),
            }),
        }
    }

    /// Check the settings needed to talk to the scanning platform.
    pub fn validate_platform(&self) -> Result<()> {
        if self.nessus.url.is_empty() {
            bail!("scanning platform URL is not configured (NESSUS_URL)");
        }
        if self.nessus.access_key.is_empty() || self.nessus.secret_key.is_empty() {
            bail!("platform API keys are not configured (ACCESS_KEY / SECRET_KEY)");
        }
        Ok(())
    }

    /// Reject configurations that cannot possibly complete a run.
    pub fn validate(&self) -> Result<()> {
        self.validate_platform()?;
        if self.folders.is_empty() {
            bail!("no folders configured (PH_FOLDER_ID / TP_FOLDER_ID or [[folders]])");
        }
        if self.mail.from.is_empty() {
            bail!("mail sender is not configured (EMAIL_FROM)");
        }
        if self.mail.to.is_empty() {
            bail!("mail recipients are not configured (EMAIL_TO)");
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Scanning platform
// ---------------------------------------------------------------------------

/// Connection settings for the scanning platform REST API.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NessusConfig {
    /// Base URL, e.g. `https://nessus.internal:8834`.
    pub url: String,
    pub access_key: String,
    pub secret_key: String,
    /// Validate the platform's TLS certificate. Off by default because
    /// scanner appliances usually ship self-signed certificates.
    pub verify_tls: bool,
    /// Per-request timeout (seconds).
    pub request_timeout_secs: u64,
}

impl Default for NessusConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            verify_tls: false,
            request_timeout_secs: 60,
        }
    }
}

impl NessusConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl fmt::Debug for NessusConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NessusConfig")
            .field("url", &self.url)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("verify_tls", &self.verify_tls)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Export format and status-poll settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Report format requested from the platform; also the entry extension.
    pub format: String,
    /// Delay between export status polls (seconds).
    pub poll_interval_secs: u64,
    /// Give up on an export after this many non-ready polls. `0` waits forever.
    pub max_poll_attempts: u32,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            format: "html".to_string(),
            poll_interval_secs: 2,
            max_poll_attempts: 900,
        }
    }
}

// ---------------------------------------------------------------------------
// Folders
// ---------------------------------------------------------------------------

/// One organizational folder on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderConfig {
    pub id: i64,
    /// Display name used in archive names, subjects and notifications.
    pub name: String,
}

// ---------------------------------------------------------------------------
// Mail
// ---------------------------------------------------------------------------

/// SMTP relay and message settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub from: String,
    pub to: Vec<String>,
    /// Subject prefix; the full subject is `{prefix} - {folder} - {month}`.
    pub subject_prefix: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_server: "localhost".to_string(),
            smtp_port: 25,
            from: String::new(),
            to: Vec::new(),
            subject_prefix: "Nessus Monthly Report".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Chat webhook settings. An unset webhook disables notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub teams_webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub dir: PathBuf,
    pub file_name: String,
    /// Rotate the log file once it would grow past this many bytes.
    pub max_bytes: u64,
    /// Rotated files kept alongside the active one.
    pub max_backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: PathBuf::from("logs"),
            file_name: "nessus_report.log".to_string(),
            max_bytes: 5 * 1024 * 1024,
            max_backups: 5,
        }
    }
}

impl LoggingConfig {
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}
