use crate::domain::snapshot::{SentimentLabel, SentimentSnapshot};
use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

const TOP_SYMBOLS_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_records: i64,
    pub unique_symbols: i64,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
    pub top_symbols: Vec<SymbolCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolCount {
    pub symbol: String,
    pub count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    symbol: String,
    timestamp: String,
    sentiment_score: f64,
    sentiment_label: String,
    confidence: f64,
    news_articles_count: i64,
    tweets_count: i64,
    positive_percentage: f64,
    negative_percentage: f64,
    neutral_percentage: f64,
    source: String,
}

impl TryFrom<RecordRow> for SentimentSnapshot {
    type Error = anyhow::Error;

    fn try_from(row: RecordRow) -> anyhow::Result<Self> {
        Ok(Self {
            timestamp: decode_timestamp(&row.timestamp)?,
            sentiment_label: SentimentLabel::parse(&row.sentiment_label)?,
            symbol: row.symbol,
            sentiment_score: row.sentiment_score,
            confidence: row.confidence,
            news_articles_count: row.news_articles_count,
            tweets_count: row.tweets_count,
            positive_percentage: row.positive_percentage,
            negative_percentage: row.negative_percentage,
            neutral_percentage: row.neutral_percentage,
            source: row.source,
        })
    }
}

// Fixed-width UTC text so lexicographic order in SQLite equals time order.
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid stored timestamp: {s}"))?
        .with_timezone(&Utc))
}

/// Inserts one row. Repeated stores of the same instant produce duplicate rows.
pub async fn store(
    pool: &SqlitePool,
    symbol: &str,
    snapshot: &SentimentSnapshot,
) -> anyhow::Result<i64> {
    let res = sqlx::query(
        "INSERT INTO sentiment_records (symbol, timestamp, sentiment_score, sentiment_label, \
         confidence, news_articles_count, tweets_count, positive_percentage, \
         negative_percentage, neutral_percentage, source) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(symbol)
    .bind(encode_timestamp(snapshot.timestamp))
    .bind(snapshot.sentiment_score)
    .bind(snapshot.sentiment_label.as_str())
    .bind(snapshot.confidence)
    .bind(snapshot.news_articles_count)
    .bind(snapshot.tweets_count)
    .bind(snapshot.positive_percentage)
    .bind(snapshot.negative_percentage)
    .bind(snapshot.neutral_percentage)
    .bind(&snapshot.source)
    .execute(pool)
    .await
    .context("insert sentiment_records failed")?;

    tracing::debug!(symbol, score = snapshot.sentiment_score, "stored sentiment snapshot");
    Ok(res.last_insert_rowid())
}

/// Rows for `symbol` no older than `days` before `now`, newest first.
pub async fn history(
    pool: &SqlitePool,
    symbol: &str,
    days: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<SentimentSnapshot>> {
    // A window reaching before year 1 (or past chrono's range) covers every row.
    let since = Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .filter(|since| since.year() >= 1)
        .map(encode_timestamp);

    let rows: Vec<RecordRow> = sqlx::query_as(
        "SELECT symbol, timestamp, sentiment_score, sentiment_label, confidence, \
         news_articles_count, tweets_count, positive_percentage, negative_percentage, \
         neutral_percentage, source \
         FROM sentiment_records \
         WHERE symbol = ? AND (? IS NULL OR timestamp >= ?) \
         ORDER BY timestamp DESC, id DESC",
    )
    .bind(symbol)
    .bind(&since)
    .bind(&since)
    .fetch_all(pool)
    .await
    .context("select sentiment_records failed")?;

    rows.into_iter().map(SentimentSnapshot::try_from).collect()
}

pub async fn stats(pool: &SqlitePool) -> anyhow::Result<StoreStats> {
    let (total_records,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sentiment_records")
        .fetch_one(pool)
        .await
        .context("count sentiment_records failed")?;

    let (unique_symbols,): (i64,) =
        sqlx::query_as("SELECT COUNT(DISTINCT symbol) FROM sentiment_records")
            .fetch_one(pool)
            .await
            .context("count distinct symbols failed")?;

    let (earliest, latest): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT MIN(timestamp), MAX(timestamp) FROM sentiment_records")
            .fetch_one(pool)
            .await
            .context("select timestamp range failed")?;

    let top: Vec<(String, i64)> = sqlx::query_as(
        "SELECT symbol, COUNT(*) AS count FROM sentiment_records \
         GROUP BY symbol ORDER BY count DESC, symbol ASC LIMIT ?",
    )
    .bind(TOP_SYMBOLS_LIMIT)
    .fetch_all(pool)
    .await
    .context("select top symbols failed")?;

    Ok(StoreStats {
        total_records,
        unique_symbols,
        earliest: earliest.as_deref().map(decode_timestamp).transpose()?,
        latest: latest.as_deref().map(decode_timestamp).transpose()?,
        top_symbols: top
            .into_iter()
            .map(|(symbol, count)| SymbolCount { symbol, count })
            .collect(),
    })
}

pub async fn symbols(pool: &SqlitePool) -> anyhow::Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT symbol FROM sentiment_records ORDER BY symbol")
            .fetch_all(pool)
            .await
            .context("select distinct symbols failed")?;
    Ok(rows.into_iter().map(|(s,)| s).collect())
}
