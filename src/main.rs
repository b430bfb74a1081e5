use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use expiry_notifier::analytics::AnalyticsClient;
use expiry_notifier::config;
use expiry_notifier::mailer::SmtpMailer;
use expiry_notifier::pipeline;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let _guard = init_tracing(&cfg.log_level, cfg.log_file.as_deref());

    let client = AnalyticsClient::new(&cfg.api_base_path, cfg.api_key.clone())?;
    let mailer = SmtpMailer::new(&cfg.smtp_host, cfg.smtp_port);
    let today = chrono::Local::now().date_naive();

    let summary = pipeline::run(&cfg, &client, &mailer, today).await?;
    info!(
        candidates = summary.candidates,
        sent = summary.sent,
        skipped = summary.skipped,
        "run complete"
    );
    Ok(())
}

/// Console logging, plus a daily-rolling file when `log_file` is set. The
/// returned guard must stay alive until exit so the file writer flushes.
fn init_tracing(log_level: &str, log_file: Option<&str>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let unparsable_level = EnvFilter::try_new(log_level).is_err();
    let stdout_layer = fmt::layer().with_target(false).compact();

    let guard = match log_file {
        Some(path) => {
            let path = Path::new(path);
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .unwrap_or_else(|| "expiry-notifier.log".as_ref());
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            let file_layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .init();
            None
        }
    };

    if unparsable_level {
        warn!(log_level, "unparsable log_level, falling back to info");
    }
    guard
}
