use crate::sentiment::types::SentimentReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const LABEL_THRESHOLD: f64 = 0.1;
pub const DEFAULT_SOURCE: &str = "comprehensive";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn from_score(score: f64) -> Self {
        if score > LABEL_THRESHOLD {
            Self::Positive
        } else if score < -LABEL_THRESHOLD {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "Positive",
            Self::Negative => "Negative",
            Self::Neutral => "Neutral",
        }
    }

    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "Positive" => Ok(Self::Positive),
            "Negative" => Ok(Self::Negative),
            "Neutral" => Ok(Self::Neutral),
            other => anyhow::bail!("unknown sentiment label: {other}"),
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scored observation for a symbol. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub sentiment_score: f64,
    pub sentiment_label: SentimentLabel,
    pub confidence: f64,
    pub news_articles_count: i64,
    pub tweets_count: i64,
    pub positive_percentage: f64,
    pub negative_percentage: f64,
    pub neutral_percentage: f64,
    pub source: String,
}

impl SentimentSnapshot {
    pub fn new(symbol: &str, timestamp: DateTime<Utc>, score: f64) -> Self {
        let score = score.clamp(-1.0, 1.0);
        Self {
            symbol: symbol.to_string(),
            timestamp,
            sentiment_score: score,
            sentiment_label: SentimentLabel::from_score(score),
            confidence: score.abs(),
            news_articles_count: 0,
            tweets_count: 0,
            positive_percentage: 0.0,
            negative_percentage: 0.0,
            neutral_percentage: 0.0,
            source: DEFAULT_SOURCE.to_string(),
        }
    }

    /// Returns `None` when the report carries no overall aggregate.
    pub fn from_report(
        symbol: &str,
        report: &SentimentReport,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        let overall = report.overall.as_ref()?;
        let summary = &report.summary;

        let mut snapshot = Self::new(symbol, timestamp, overall.average_score);
        snapshot.news_articles_count = summary.total_articles as i64;
        snapshot.tweets_count = summary.total_tweets as i64;
        snapshot.positive_percentage = summary.positive_percentage;
        snapshot.negative_percentage = summary.negative_percentage;
        snapshot.neutral_percentage = summary.neutral_percentage;
        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::types::{OverallSentiment, SentimentSummary};
    use chrono::TimeZone;

    #[test]
    fn labels_use_fixed_thresholds() {
        assert_eq!(SentimentLabel::from_score(0.11), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.1), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.1), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.11), SentimentLabel::Negative);
    }

    #[test]
    fn confidence_is_absolute_score() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();
        let snapshot = SentimentSnapshot::new("TSLA", ts, -0.42);
        assert_eq!(snapshot.sentiment_label, SentimentLabel::Negative);
        assert!((snapshot.confidence - 0.42).abs() < 1e-9);
    }

    #[test]
    fn from_report_copies_distribution() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();
        let report = SentimentReport {
            overall: Some(OverallSentiment {
                average_score: 0.25,
                label: SentimentLabel::Positive,
                confidence: 0.25,
                total_sources: 8,
            }),
            summary: SentimentSummary {
                positive_percentage: 50.0,
                negative_percentage: 12.5,
                neutral_percentage: 37.5,
                total_articles: 5,
                total_tweets: 3,
            },
            ..Default::default()
        };

        let snapshot = SentimentSnapshot::from_report("AAPL", &report, ts).unwrap();
        assert_eq!(snapshot.news_articles_count, 5);
        assert_eq!(snapshot.tweets_count, 3);
        assert_eq!(snapshot.positive_percentage, 50.0);
        assert_eq!(snapshot.source, DEFAULT_SOURCE);
    }

    #[test]
    fn from_report_without_overall_is_none() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();
        assert!(SentimentSnapshot::from_report("AAPL", &SentimentReport::default(), ts).is_none());
    }
}
