use crate::html;
use crate::domain::snapshot::{SentimentLabel, SentimentSnapshot};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportStats {
    pub total_records: usize,
    pub average_score: f64,
    pub max_score: f64,
    pub min_score: f64,
    pub positive_count: usize,
    pub negative_count: usize,
    pub neutral_count: usize,
    pub total_articles: i64,
    pub total_tweets: i64,
}

impl ReportStats {
    /// All-zero statistics for an empty window.
    pub fn compute(records: &[SentimentSnapshot]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let mut stats = Self {
            total_records: records.len(),
            max_score: f64::MIN,
            min_score: f64::MAX,
            ..Self::default()
        };
        let mut sum = 0.0;

        for r in records {
            sum += r.sentiment_score;
            stats.max_score = stats.max_score.max(r.sentiment_score);
            stats.min_score = stats.min_score.min(r.sentiment_score);
            match r.sentiment_label {
                SentimentLabel::Positive => stats.positive_count += 1,
                SentimentLabel::Negative => stats.negative_count += 1,
                SentimentLabel::Neutral => stats.neutral_count += 1,
            }
            stats.total_articles += r.news_articles_count;
            stats.total_tweets += r.tweets_count;
        }

        stats.average_score = sum / records.len() as f64;
        stats
    }
}

const STYLE: &str = r#"
body { font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }
.container {
  max-width: 1200px; margin: 0 auto; background-color: #fff; padding: 30px;
  border-radius: 10px; box-shadow: 0 2px 10px rgba(0,0,0,0.1);
}
.header {
  text-align: center; margin-bottom: 30px; border-bottom: 2px solid #007bff; padding-bottom: 20px;
}
.stats-grid {
  display: grid; grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
  gap: 20px; margin-bottom: 30px;
}
.stat-card {
  background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: #fff;
  padding: 20px; border-radius: 10px; text-align: center;
}
.stat-value { font-size: 2em; font-weight: bold; margin-bottom: 5px; }
.stat-label { font-size: 0.9em; opacity: 0.9; }
.records-table { width: 100%; border-collapse: collapse; margin-top: 20px; }
.records-table th, .records-table td { border: 1px solid #ddd; padding: 12px; text-align: left; }
.records-table th { background-color: #f8f9fa; font-weight: bold; }
.positive { color: #28a745; }
.negative { color: #dc3545; }
.neutral { color: #ffc107; }
.footer {
  text-align: center; margin-top: 30px; padding-top: 20px; border-top: 1px solid #ddd; color: #666;
}
"#;

pub fn render_html(
    symbol: &str,
    days: i64,
    generated_at: DateTime<Utc>,
    records: &[SentimentSnapshot],
) -> String {
    let stats = ReportStats::compute(records);
    let symbol = html::escape(symbol);

    let cards: [(String, &str); 9] = [
        (stats.total_records.to_string(), "Total Records"),
        (format!("{:.3}", stats.average_score), "Average Sentiment"),
        (format!("{:.3}", stats.max_score), "Highest Sentiment"),
        (format!("{:.3}", stats.min_score), "Lowest Sentiment"),
        (stats.positive_count.to_string(), "Positive Records"),
        (stats.negative_count.to_string(), "Negative Records"),
        (stats.neutral_count.to_string(), "Neutral Records"),
        (stats.total_articles.to_string(), "Total Articles"),
        (stats.total_tweets.to_string(), "Total Tweets"),
    ];

    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html lang=\"en\">");
    let _ = writeln!(out, "<head>");
    let _ = writeln!(out, "<meta charset=\"UTF-8\">");
    let _ = writeln!(
        out,
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">"
    );
    let _ = writeln!(out, "<title>Sentiment Analysis Report - {symbol}</title>");
    let _ = writeln!(out, "<style>{STYLE}</style>");
    let _ = writeln!(out, "</head>");
    let _ = writeln!(out, "<body>");
    let _ = writeln!(out, "<div class=\"container\">");

    let _ = writeln!(out, "<div class=\"header\">");
    let _ = writeln!(out, "<h1>Sentiment Analysis Report</h1>");
    let _ = writeln!(out, "<h2>{symbol}</h2>");
    let _ = writeln!(
        out,
        "<p>Generated on {}</p>",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "<p>Analysis Period: {days} days</p>");
    let _ = writeln!(out, "</div>");

    let _ = writeln!(out, "<div class=\"stats-grid\">");
    for (value, label) in &cards {
        let _ = writeln!(
            out,
            "<div class=\"stat-card\"><div class=\"stat-value\">{value}</div>\
             <div class=\"stat-label\">{label}</div></div>"
        );
    }
    let _ = writeln!(out, "</div>");

    let _ = writeln!(out, "<h3>Sentiment History</h3>");
    let _ = writeln!(out, "<table class=\"records-table\">");
    let _ = writeln!(
        out,
        "<thead><tr><th>Date</th><th>Sentiment</th><th>Score</th><th>Confidence</th>\
         <th>Articles</th><th>Tweets</th><th>Positive %</th><th>Negative %</th></tr></thead>"
    );
    let _ = writeln!(out, "<tbody>");
    for r in records {
        let label = r.sentiment_label.as_str();
        let _ = writeln!(
            out,
            "<tr><td>{}</td><td class=\"{}\">{}</td><td>{:.3}</td><td>{:.1}%</td>\
             <td>{}</td><td>{}</td><td>{:.1}%</td><td>{:.1}%</td></tr>",
            r.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            label.to_ascii_lowercase(),
            label,
            r.sentiment_score,
            r.confidence * 100.0,
            r.news_articles_count,
            r.tweets_count,
            r.positive_percentage,
            r.negative_percentage,
        );
    }
    let _ = writeln!(out, "</tbody>");
    let _ = writeln!(out, "</table>");

    let _ = writeln!(out, "<div class=\"footer\">");
    let _ = writeln!(out, "<p>Generated by sentiment pulse</p>");
    let _ = writeln!(
        out,
        "<p>This analysis is for educational purposes only \
         and should not be used as financial advice.</p>"
    );
    let _ = writeln!(out, "</div>");
    let _ = writeln!(out, "</div>");
    let _ = writeln!(out, "</body>");
    let _ = writeln!(out, "</html>");
    out
}
