//! eiabot entry point.
//!
//! `run` prints the invocation outcome as JSON on stdout; logs go to stderr.

use anyhow::Result;
use clap::{Parser, Subcommand};
use eiabot::{AppConfig, AppError, AppResult, InvocationOutcome, Pipeline};
use eiabot_core::ReportKind;
use eiabot_feed::EiaClient;
use eiabot_notify::{Notifier, RecordingNotifier, TelegramNotifier};
use eiabot_persistence::{PostingLog, SqlitePostingLog};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// Posts EIA petroleum statistics to Telegram.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via EIABOT_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch, and post if the latest period is new (default)
    Run {
        /// crude-stocks or futures
        #[arg(short, long)]
        report: Option<ReportKind>,
    },
    /// Dry run: print the message that would be posted
    Check {
        #[arg(short, long)]
        report: Option<ReportKind>,
    },
    /// List recorded postings
    History {
        #[arg(short, long)]
        report: Option<ReportKind>,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = AppConfig::resolve_path(args.config.as_deref());
    let config = AppConfig::load(&config_path)?;

    eiabot_telemetry::init_logging(config.telemetry.log_level.as_deref())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %config_path.display(),
        "Starting eiabot"
    );
    if config.source_file.is_none() {
        warn!(path = %config_path.display(), "Config file not found, using defaults");
    }

    let command = args.command.unwrap_or(Command::Run { report: None });
    let code = match command {
        Command::Run { report } => {
            let kind = report.unwrap_or(config.default_report);
            let outcome = match build_pipeline(&config, true) {
                Ok(pipeline) => pipeline.run(kind).await,
                Err(e) => {
                    warn!(error = %e, "Startup failed");
                    InvocationOutcome::failed(&e)
                }
            };
            println!("{}", serde_json::to_string(&outcome)?);
            export_metrics(&config);
            ExitCode::from(outcome.exit_code())
        }
        Command::Check { report } => {
            let kind = report.unwrap_or(config.default_report);
            let pipeline = build_pipeline(&config, false)?;
            let check = pipeline.check(kind).await?;
            println!(
                "report={} period={} new_data={}",
                check.kind, check.period, check.new_data
            );
            for (series, reason) in &check.omitted {
                println!("omitted {series}: {reason}");
            }
            println!("\n{}", check.text);
            ExitCode::SUCCESS
        }
        Command::History { report, limit } => {
            let kind = report.unwrap_or(config.default_report);
            let log = open_log(&config)?;
            for record in log.records(&kind.dataset(), limit)? {
                println!(
                    "{}\t{}\tposted={}\t{}",
                    record.dataset,
                    record.period,
                    record.posted,
                    record.recorded_at.to_rfc3339()
                );
            }
            ExitCode::SUCCESS
        }
    };

    Ok(code)
}

/// Wire the real clients. `deliver = false` swaps in a notifier that only
/// records, for dry runs.
fn build_pipeline(config: &AppConfig, deliver: bool) -> AppResult<Pipeline> {
    if deliver {
        config.validate()?;
    } else {
        config.validate_upstream()?;
    }

    let source = Arc::new(EiaClient::new(
        config.upstream.base_url.as_str(),
        config.upstream.api_key.as_str(),
        config.upstream.timeout(),
    )?);

    let notifier: Arc<dyn Notifier> = if deliver {
        Arc::new(
            TelegramNotifier::new(
                config.telegram.api_base.as_str(),
                config.telegram.bot_token.as_str(),
                config.telegram.chat_id.as_str(),
                config.telegram.timeout(),
            )?
            .with_web_page_preview(!config.telegram.disable_web_page_preview),
        )
    } else {
        Arc::new(RecordingNotifier::new())
    };

    Ok(Pipeline::new(
        source,
        open_log(config)?,
        notifier,
        config.dedup.clone(),
        config.upstream.fetch_options(),
    ))
}

fn open_log(config: &AppConfig) -> AppResult<Arc<dyn PostingLog>> {
    if let Some(parent) = config.store.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Persistence(eiabot_persistence::PersistenceError::StorageUnavailable(
                    format!("create {}: {e}", parent.display()),
                ))
            })?;
        }
    }
    let log = SqlitePostingLog::open(&config.store.path, config.store.busy_timeout())?;
    Ok(Arc::new(log))
}

fn export_metrics(config: &AppConfig) {
    if let Some(path) = &config.telemetry.metrics_textfile {
        if let Err(e) = eiabot_telemetry::write_textfile(path) {
            warn!(path = %path.display(), error = %e, "Failed to write metrics textfile");
        }
    }
}
