use clap::Subcommand;
use pulse_core::config::Settings;
use pulse_core::export::{BulkOutcome, ExportFormat, Exporter, DEFAULT_HISTORY_DAYS};
use pulse_core::sentiment::SentimentSource;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Subcommand)]
pub enum ExportCommand {
    /// Fetch current sentiment for a symbol and store it.
    Analyze { symbol: String },
    /// Write stored history for a symbol to a file.
    Export {
        symbol: String,
        #[arg(long, default_value = "csv")]
        format: ExportFormat,
        #[arg(long, default_value_t = DEFAULT_HISTORY_DAYS)]
        days: i64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Analyze then export each symbol over the last 7 days.
    Bulk {
        #[arg(required = true)]
        symbols: Vec<String>,
        #[arg(long, default_value = "csv")]
        format: ExportFormat,
    },
    /// Render an HTML report for a symbol.
    Report {
        symbol: String,
        #[arg(long, default_value_t = DEFAULT_HISTORY_DAYS)]
        days: i64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Stats,
}

pub async fn run(
    cmd: ExportCommand,
    settings: &Settings,
    source: Arc<dyn SentimentSource>,
) -> anyhow::Result<()> {
    let pool = pulse_core::storage::open(&settings.database_url).await?;
    let exporter = Exporter::new(pool, source, &settings.export_dir);

    match cmd {
        ExportCommand::Analyze { symbol } => match exporter.analyze(&symbol).await {
            Ok(Some(a)) => println!(
                "{symbol}: {} ({:.3}), confidence {:.1}%, {} sources; stored",
                a.overall.label,
                a.overall.average_score,
                a.overall.confidence * 100.0,
                a.overall.total_sources
            ),
            Ok(None) => println!("{symbol}: no sentiment data available"),
            Err(err) => {
                tracing::error!(symbol = %symbol, error = %format!("{err:#}"), "analyze failed");
                println!("{symbol}: analysis failed: {err:#}");
            }
        },
        ExportCommand::Export {
            symbol,
            format,
            days,
            output,
        } => {
            let written = exporter
                .export(&symbol, days, format, output.as_deref())
                .await;
            print_written(&symbol, written)
        }
        ExportCommand::Bulk { symbols, format } => {
            let results = exporter.bulk(&symbols, format).await;
            let ok = results
                .values()
                .filter(|o| matches!(o, BulkOutcome::Success { .. }))
                .count();

            for (symbol, outcome) in &results {
                match outcome {
                    BulkOutcome::Success { sentiment, filename } => println!(
                        "{symbol}: {} ({:.3}) -> {}",
                        sentiment.label,
                        sentiment.average_score,
                        filename
                            .as_ref()
                            .map(|p| p.display().to_string())
                            .unwrap_or_else(|| "export failed".to_string())
                    ),
                    BulkOutcome::Failed { error } | BulkOutcome::Error { error } => {
                        println!("{symbol}: {} ({error})", outcome.status())
                    }
                }
            }
            println!("bulk export finished: {ok}/{} succeeded", results.len());
        }
        ExportCommand::Report {
            symbol,
            days,
            output,
        } => {
            let written = exporter
                .render_html_report(&symbol, days, output.as_deref())
                .await;
            print_written(&symbol, written)
        }
        ExportCommand::Stats => match exporter.stats().await {
            Ok(stats) => {
                println!(
                    "{} record(s) across {} symbol(s)",
                    stats.total_records, stats.unique_symbols
                );
                if let (Some(from), Some(to)) = (stats.earliest, stats.latest) {
                    println!("range: {} .. {}", from.to_rfc3339(), to.to_rfc3339());
                }
                for top in &stats.top_symbols {
                    println!("  {}: {}", top.symbol, top.count);
                }
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "stats failed");
                println!("failed to read stats: {err:#}");
            }
        },
    }

    Ok(())
}

fn print_written(symbol: &str, path: Option<PathBuf>) {
    match path {
        Some(p) => println!("{symbol}: wrote {}", p.display()),
        None => println!("{symbol}: export failed; see logs"),
    }
}
