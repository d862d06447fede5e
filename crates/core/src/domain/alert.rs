//! Alert rules and the crossing state machine.
//!
//! Polling a rule is modelled as a pure transition: the current rule plus a
//! fresh [`SentimentReading`] produce the next rule state and, on a threshold
//! crossing, a [`Trigger`] naming the notifications to send. Delivery happens
//! in `alerts::evaluator`; its outcomes come back through
//! [`AlertRule::record_trigger`].

use crate::domain::snapshot::SentimentLabel;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const MAX_ALERT_HISTORY: usize = 100;
pub const DEFAULT_THRESHOLD_POSITIVE: f64 = 0.5;
pub const DEFAULT_THRESHOLD_NEGATIVE: f64 = -0.5;
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub symbol: String,
    #[serde(default = "default_threshold_positive")]
    pub threshold_positive: f64,
    #[serde(default = "default_threshold_negative")]
    pub threshold_negative: f64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub last_checked: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sentiment: Option<f64>,
    #[serde(default)]
    pub alert_history: Vec<TriggerRecord>,
}

fn default_threshold_positive() -> f64 {
    DEFAULT_THRESHOLD_POSITIVE
}

fn default_threshold_negative() -> f64 {
    DEFAULT_THRESHOLD_NEGATIVE
}

fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

/// RFC 3339, or an ISO-8601 local time without offset which is read as UTC.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => s.parse::<NaiveDateTime>().map(|naive| naive.and_utc()),
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| parse_timestamp(&raw).map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Crossing {
    Positive,
    Negative,
}

/// A fresh sentiment measurement taken for one rule check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    pub symbol: String,
    pub sentiment_score: f64,
    pub confidence: f64,
    pub label: SentimentLabel,
    pub sources: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Email { to: String },
    Webhook { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub crossing: Crossing,
    pub reading: SentimentReading,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: AlertRule,
    pub trigger: Option<Trigger>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub sentiment_score: f64,
    pub label: SentimentLabel,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Crossing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_sent: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_sent: Option<bool>,
}

impl Trigger {
    /// Builds the history entry once delivery has been attempted.
    pub fn into_record(
        self,
        now: DateTime<Utc>,
        email_sent: Option<bool>,
        webhook_sent: Option<bool>,
    ) -> TriggerRecord {
        TriggerRecord {
            timestamp: now,
            sentiment_score: self.reading.sentiment_score,
            label: self.reading.label,
            confidence: self.reading.confidence,
            direction: Some(self.crossing),
            email_sent,
            webhook_sent,
        }
    }
}

impl AlertRule {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            threshold_positive: DEFAULT_THRESHOLD_POSITIVE,
            threshold_negative: DEFAULT_THRESHOLD_NEGATIVE,
            email: None,
            webhook_url: None,
            check_interval: DEFAULT_CHECK_INTERVAL_SECS,
            last_checked: None,
            last_sentiment: None,
            alert_history: Vec::new(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let Some(last_checked) = self.last_checked else {
            return true;
        };
        // A clock that moved backwards reads as not due.
        u64::try_from((now - last_checked).num_seconds())
            .is_ok_and(|elapsed| elapsed >= self.check_interval)
    }

    /// Which threshold, if any, `current` crossed relative to the stored score.
    pub fn crossing(&self, current: f64) -> Option<Crossing> {
        let previous = self.last_sentiment?;

        let positive = previous <= self.threshold_positive && current > self.threshold_positive;
        let negative = previous >= self.threshold_negative && current < self.threshold_negative;

        match (positive, negative) {
            // Unreachable for any threshold pair; larger absolute threshold wins if it happens.
            (true, true) => {
                if self.threshold_negative.abs() > self.threshold_positive.abs() {
                    Some(Crossing::Negative)
                } else {
                    Some(Crossing::Positive)
                }
            }
            (true, false) => Some(Crossing::Positive),
            (false, true) => Some(Crossing::Negative),
            (false, false) => None,
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        let mut out = Vec::new();
        if let Some(to) = &self.email {
            out.push(Notification::Email { to: to.clone() });
        }
        if let Some(url) = &self.webhook_url {
            out.push(Notification::Webhook { url: url.clone() });
        }
        out
    }

    /// Applies one successful observation. The returned rule always carries the
    /// new `last_checked`/`last_sentiment`; history is untouched until
    /// [`AlertRule::record_trigger`] is called with the delivery outcome.
    pub fn observe(&self, reading: &SentimentReading, now: DateTime<Utc>) -> Transition {
        let trigger = self.crossing(reading.sentiment_score).map(|crossing| Trigger {
            crossing,
            reading: reading.clone(),
            notifications: self.notifications(),
        });

        let mut next = self.clone();
        next.last_checked = Some(now);
        next.last_sentiment = Some(reading.sentiment_score);

        Transition { next, trigger }
    }

    pub fn record_trigger(&mut self, record: TriggerRecord) {
        self.alert_history.push(record);
        if self.alert_history.len() > MAX_ALERT_HISTORY {
            let excess = self.alert_history.len() - MAX_ALERT_HISTORY;
            self.alert_history.drain(..excess);
        }
    }

    pub fn triggers_on(&self, day: chrono::NaiveDate) -> usize {
        self.alert_history
            .iter()
            .filter(|r| r.timestamp.date_naive() == day)
            .count()
    }
}
