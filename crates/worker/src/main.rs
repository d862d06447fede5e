use clap::{Parser, Subcommand};
use pulse_core::sentiment::client::HttpSentimentClient;
use pulse_core::sentiment::SentimentSource;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod alerts;
mod export;

#[derive(Debug, Parser)]
#[command(name = "pulse_worker", about = "Sentiment alerts and sentiment data exports")]
struct Args {
    /// Record store location. Overrides DATABASE_URL.
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Alert rule file. Overrides ALERTS_FILE.
    #[arg(long, global = true)]
    alerts_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage and evaluate sentiment alert rules.
    #[command(subcommand)]
    Alerts(alerts::AlertsCommand),

    /// Store sentiment snapshots and export them as files.
    #[command(subcommand)]
    Export(export::ExportCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = pulse_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }
    if let Some(path) = args.alerts_file {
        settings.alerts_file = path;
    }

    let client = HttpSentimentClient::from_settings(&settings)?;
    if !client.has_news_source() {
        tracing::warn!(
            "no news source configured; sentiment will be empty unless social is available"
        );
    }
    let source: Arc<dyn SentimentSource> = Arc::new(client);

    let result = match args.command {
        Command::Alerts(cmd) => alerts::run(cmd, &settings, source).await,
        Command::Export(cmd) => export::run(cmd, &settings, source).await,
    };

    if let Err(err) = &result {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(error = %format!("{err:#}"), "worker failed");
    }
    result
}

fn init_sentry(settings: &pulse_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
