use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use nessus_courier::config::AppConfig;
use nessus_courier::nessus::{scans_in_folder, NessusClient};
use nessus_courier::notify::{Notifier, Severity, TeamsNotifier};
use nessus_courier::MonthTag;

#[derive(Parser)]
#[command(
    name = "nessus-courier",
    about = "Export, package and deliver monthly Nessus scan reports",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (TOML). Environment variables override its values.
    #[arg(long, global = true, env = "NESSUS_COURIER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export, package and email reports for every configured folder
    Run {
        /// Reporting month (YYYYMM); defaults to the current month
        #[arg(long)]
        month: Option<String>,
    },

    /// List the scans in a platform folder
    ListScans {
        /// Folder id on the scanning platform
        #[arg(long)]
        folder_id: i64,
    },

    /// Post a single notification to the configured webhook
    Notify {
        /// Message text
        message: String,

        /// Message color
        #[arg(long, value_enum, default_value = "info")]
        severity: Severity,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    nessus_courier::logging::init(&config.logging)?;
    match AppConfig::locate(cli.config.as_deref()) {
        Some(path) => tracing::info!(path = %path.display(), "loaded configuration file"),
        None => tracing::debug!("no config file found, using defaults plus environment"),
    }

    match cli.command {
        Commands::Run { month } => {
            config.validate()?;
            let month = match month {
                Some(raw) => raw.parse::<MonthTag>()?,
                None => MonthTag::current(),
            };
            let summary = nessus_courier::run(&config, &month).await?;
            tracing::info!(
                run_id = %summary.run_id,
                emailed = summary.emailed(),
                folders = summary.folders.len(),
                "run finished"
            );
        }
        Commands::ListScans { folder_id } => {
            config.validate_platform()?;
            let client = NessusClient::new(&config.nessus)?;
            let scans = scans_in_folder(&client, folder_id)
                .await
                .with_context(|| format!("failed to list scans in folder {folder_id}"))?;
            if scans.is_empty() {
                println!("No scans found in folder {}.", folder_id);
            } else {
                println!("{:<10} | Name", "ID");
                println!("{:-<10}-|-{:-<40}", "", "");
                for scan in scans {
                    println!("{:<10} | {}", scan.id, scan.name);
                }
            }
        }
        Commands::Notify { message, severity } => {
            let notifier = TeamsNotifier::new(&config.notify)?;
            if !notifier.is_configured() {
                println!("TEAMS_WEBHOOK_URL is not set; nothing was sent.");
            }
            notifier.notify(&message, severity).await;
        }
    }

    Ok(())
}
