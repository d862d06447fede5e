pub mod report;

use crate::domain::snapshot::SentimentSnapshot;
use crate::sentiment::types::OverallSentiment;
use crate::sentiment::SentimentSource;
use crate::storage::records::{self, StoreStats};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_HISTORY_DAYS: i64 = 30;
pub const BULK_WINDOW_DAYS: i64 = 7;

const CSV_COLUMNS: [&str; 11] = [
    "symbol",
    "timestamp",
    "sentiment_score",
    "sentiment_label",
    "confidence",
    "news_articles_count",
    "tweets_count",
    "positive_percentage",
    "negative_percentage",
    "neutral_percentage",
    "source",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Html,
}

impl ExportFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Html => "html",
        }
    }

    fn file_prefix(self) -> &'static str {
        match self {
            Self::Csv | Self::Json => "sentiment_data",
            Self::Html => "sentiment_report",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            other => {
                anyhow::bail!("unsupported export format: {other} (expected csv, json or html)")
            }
        }
    }
}

/// Result of one `analyze` call: the aggregate and the row that was stored.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub overall: OverallSentiment,
    pub snapshot: SentimentSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BulkOutcome {
    Success {
        sentiment: OverallSentiment,
        filename: Option<PathBuf>,
    },
    Failed {
        error: String,
    },
    Error {
        error: String,
    },
}

impl BulkOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    export_info: ExportInfo<'a>,
    records: &'a [SentimentSnapshot],
}

#[derive(Serialize)]
struct ExportInfo<'a> {
    symbol: &'a str,
    export_date: DateTime<Utc>,
    days_included: i64,
    total_records: usize,
}

/// Persists snapshots to the record store and writes them out as files.
pub struct Exporter {
    pool: SqlitePool,
    source: Arc<dyn SentimentSource>,
    export_dir: PathBuf,
}

impl Exporter {
    pub fn new(
        pool: SqlitePool,
        source: Arc<dyn SentimentSource>,
        export_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pool,
            source,
            export_dir: export_dir.into(),
        }
    }

    /// Fetches a fresh report for `symbol` and stores it. `Ok(None)` when the
    /// report has no overall sentiment.
    pub async fn analyze(&self, symbol: &str) -> anyhow::Result<Option<Analysis>> {
        let report = self
            .source
            .analyze(symbol, true)
            .await
            .with_context(|| format!("sentiment analysis failed for {symbol}"))?;

        let Some(overall) = report.overall.clone() else {
            tracing::warn!(symbol, "no sentiment data available");
            return Ok(None);
        };
        let Some(snapshot) = SentimentSnapshot::from_report(symbol, &report, Utc::now()) else {
            return Ok(None);
        };

        self.store(symbol, &snapshot).await?;
        Ok(Some(Analysis { overall, snapshot }))
    }

    pub async fn store(&self, symbol: &str, snapshot: &SentimentSnapshot) -> anyhow::Result<i64> {
        records::store(&self.pool, symbol, snapshot).await
    }

    pub async fn history(&self, symbol: &str, days: i64) -> anyhow::Result<Vec<SentimentSnapshot>> {
        records::history(&self.pool, symbol, days, Utc::now()).await
    }

    pub async fn stats(&self) -> anyhow::Result<StoreStats> {
        records::stats(&self.pool).await
    }

    pub async fn export(
        &self,
        symbol: &str,
        days: i64,
        format: ExportFormat,
        filename: Option<&Path>,
    ) -> Option<PathBuf> {
        let now = Utc::now();
        let path = match filename {
            Some(p) => p.to_path_buf(),
            None => self.default_path(format, symbol, now),
        };

        let written = async {
            let rows = records::history(&self.pool, symbol, days, now).await?;
            ensure_parent(&path)?;
            match format {
                ExportFormat::Csv => write_csv(&path, &rows)?,
                ExportFormat::Json => write_json(&path, symbol, days, now, &rows)?,
                ExportFormat::Html => {
                    let html = report::render_html(symbol, days, now, &rows);
                    std::fs::write(&path, html)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                }
            }
            anyhow::Ok(rows.len())
        }
        .await;

        match written {
            Ok(rows) => {
                tracing::info!(symbol, %format, rows, path = %path.display(), "export written");
                Some(path)
            }
            Err(err) => {
                tracing::error!(symbol, %format, error = %format!("{err:#}"), "export failed");
                None
            }
        }
    }

    pub async fn export_csv(
        &self,
        symbol: &str,
        days: i64,
        filename: Option<&Path>,
    ) -> Option<PathBuf> {
        self.export(symbol, days, ExportFormat::Csv, filename).await
    }

    pub async fn export_json(
        &self,
        symbol: &str,
        days: i64,
        filename: Option<&Path>,
    ) -> Option<PathBuf> {
        self.export(symbol, days, ExportFormat::Json, filename).await
    }

    pub async fn render_html_report(
        &self,
        symbol: &str,
        days: i64,
        filename: Option<&Path>,
    ) -> Option<PathBuf> {
        self.export(symbol, days, ExportFormat::Html, filename).await
    }

    /// Analyzes and exports each symbol in turn. One symbol's failure never
    /// stops the batch.
    pub async fn bulk(
        &self,
        symbols: &[String],
        format: ExportFormat,
    ) -> BTreeMap<String, BulkOutcome> {
        let mut results = BTreeMap::new();

        for symbol in symbols {
            tracing::info!(symbol = %symbol, "bulk export: processing");
            let outcome = match self.analyze(symbol).await {
                Ok(Some(analysis)) => BulkOutcome::Success {
                    sentiment: analysis.overall,
                    filename: self.export(symbol, BULK_WINDOW_DAYS, format, None).await,
                },
                Ok(None) => BulkOutcome::Failed {
                    error: "No sentiment data available".to_string(),
                },
                Err(err) => {
                    tracing::error!(
                        symbol = %symbol,
                        error = %format!("{err:#}"),
                        "bulk export: symbol failed"
                    );
                    BulkOutcome::Error {
                        error: format!("{err:#}"),
                    }
                }
            };
            results.insert(symbol.clone(), outcome);
        }

        results
    }

    fn default_path(&self, format: ExportFormat, symbol: &str, now: DateTime<Utc>) -> PathBuf {
        self.export_dir.join(format!(
            "{}_{}_{}.{}",
            format.file_prefix(),
            file_safe(symbol),
            now.format("%Y%m%d_%H%M%S"),
            format.extension()
        ))
    }
}

fn file_safe(symbol: &str) -> String {
    symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

// Header is written by hand so an empty window still yields a valid file.
fn write_csv(path: &Path, rows: &[SentimentSnapshot]) -> anyhow::Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    wtr.write_record(CSV_COLUMNS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_json(
    path: &Path,
    symbol: &str,
    days: i64,
    now: DateTime<Utc>,
    rows: &[SentimentSnapshot],
) -> anyhow::Result<()> {
    let doc = JsonExport {
        export_info: ExportInfo {
            symbol,
            export_date: now,
            days_included: days,
            total_records: rows.len(),
        },
        records: rows,
    };

    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &doc).context("failed to serialize export")?;
    out.flush()?;
    Ok(())
}
