use crate::config::SmtpSettings;
use crate::domain::alert::{AlertRule, Crossing, SentimentReading};
use crate::domain::snapshot::SentimentLabel;
use crate::html;
use anyhow::Context;
use chrono::{DateTime, Utc};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt::Write;
use std::time::Duration;

const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Everything a channel needs to describe one threshold crossing.
#[derive(Debug, Clone)]
pub struct AlertNotice {
    pub symbol: String,
    pub crossing: Crossing,
    pub reading: SentimentReading,
    pub threshold_positive: f64,
    pub threshold_negative: f64,
}

impl AlertNotice {
    pub fn new(rule: &AlertRule, crossing: Crossing, reading: &SentimentReading) -> Self {
        Self {
            symbol: rule.symbol.clone(),
            crossing,
            reading: reading.clone(),
            threshold_positive: rule.threshold_positive,
            threshold_negative: rule.threshold_negative,
        }
    }

    pub fn email_subject(&self) -> String {
        format!("Sentiment Alert: {}", self.symbol)
    }

    pub fn email_html(&self) -> String {
        let marker = match self.reading.label {
            SentimentLabel::Positive => "&#128994;",
            SentimentLabel::Negative => "&#128308;",
            SentimentLabel::Neutral => "&#128993;",
        };
        let symbol = html::escape(&self.symbol);

        let mut out = String::new();
        let _ = writeln!(out, "<html><body>");
        let _ = writeln!(out, "<h2>{marker} Sentiment Alert: {symbol}</h2>");
        let _ = writeln!(
            out,
            "<p><strong>Current Sentiment:</strong> {} ({:.3})</p>",
            self.reading.label, self.reading.sentiment_score
        );
        let _ = writeln!(
            out,
            "<p><strong>Confidence:</strong> {:.1}%</p>",
            self.reading.confidence * 100.0
        );
        let _ = writeln!(
            out,
            "<p><strong>Sources:</strong> {} data points</p>",
            self.reading.sources
        );
        let _ = writeln!(
            out,
            "<p><strong>Timestamp:</strong> {}</p>",
            self.reading.timestamp.to_rfc3339()
        );
        let _ = writeln!(out, "<hr>");
        let _ = writeln!(out, "<p><strong>Alert Thresholds:</strong></p>");
        let _ = writeln!(out, "<ul>");
        let _ = writeln!(out, "<li>Positive: {}</li>", self.threshold_positive);
        let _ = writeln!(out, "<li>Negative: {}</li>", self.threshold_negative);
        let _ = writeln!(out, "</ul>");
        let _ = writeln!(out, "</body></html>");
        out
    }

    pub fn webhook_payload(&self, sent_at: DateTime<Utc>) -> serde_json::Value {
        serde_json::json!({
            "symbol": self.symbol,
            "direction": self.crossing,
            "sentiment_data": {
                "symbol": self.reading.symbol,
                "sentiment_score": self.reading.sentiment_score,
                "confidence": self.reading.confidence,
                "label": self.reading.label,
                "sources": self.reading.sources,
                "timestamp": self.reading.timestamp,
            },
            "alert_thresholds": {
                "positive": self.threshold_positive,
                "negative": self.threshold_negative,
            },
            "timestamp": sent_at,
        })
    }
}

/// Delivery channels for triggered alerts. Each call is attempted once.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send_email(&self, to: &str, notice: &AlertNotice) -> anyhow::Result<()>;

    async fn send_webhook(&self, url: &str, notice: &AlertNotice) -> anyhow::Result<()>;
}

/// SMTP (STARTTLS) email plus JSON webhook POSTs.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    http: reqwest::Client,
    smtp: SmtpSettings,
}

impl ChannelNotifier {
    pub fn new(smtp: SmtpSettings) -> anyhow::Result<Self> {
        let timeout_secs = std::env::var("WEBHOOK_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build webhook http client")?;

        Ok(Self { http, smtp })
    }
}

#[async_trait::async_trait]
impl Notifier for ChannelNotifier {
    async fn send_email(&self, to: &str, notice: &AlertNotice) -> anyhow::Result<()> {
        let (user, password) = self
            .smtp
            .credentials()
            .context("SMTP credentials not configured (EMAIL_USER / EMAIL_PASSWORD)")?;
        let sender = self.smtp.sender().unwrap_or(user);

        let from: Mailbox = sender
            .parse()
            .with_context(|| format!("invalid sender address: {sender}"))?;
        let to: Mailbox = to
            .parse()
            .with_context(|| format!("invalid recipient address: {to}"))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(notice.email_subject())
            .header(ContentType::TEXT_HTML)
            .body(notice.email_html())
            .context("failed to build alert email")?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.server)
            .with_context(|| format!("invalid SMTP relay {}", self.smtp.server))?
            .port(self.smtp.port)
            .credentials(Credentials::new(user.to_string(), password.to_string()))
            .build();

        mailer.send(message).await.context("SMTP send failed")?;
        Ok(())
    }

    async fn send_webhook(&self, url: &str, notice: &AlertNotice) -> anyhow::Result<()> {
        let payload = notice.webhook_payload(Utc::now());
        let res = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .context("webhook request failed")?;

        let status = res.status();
        anyhow::ensure!(status.is_success(), "webhook HTTP {status}");
        Ok(())
    }
}
