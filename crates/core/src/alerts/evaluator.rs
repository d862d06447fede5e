use crate::alerts::notify::{AlertNotice, Notifier};
use crate::alerts::store;
use crate::domain::alert::{
    AlertRule, Notification, SentimentReading, Transition, Trigger, TriggerRecord,
};
use crate::sentiment::SentimentSource;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

pub const MONITOR_TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    NotDue,
    NoData,
    Observed,
    Triggered(TriggerRecord),
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertSummary {
    pub total_alerts: usize,
    pub active_alerts: usize,
    pub alerts_triggered_today: usize,
    pub alerts: Vec<RuleSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleSummary {
    pub symbol: String,
    pub threshold_positive: f64,
    pub threshold_negative: f64,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_sentiment: Option<f64>,
    pub alerts_today: usize,
}

/// Polls the sentiment source for each rule and fires notifications on crossings.
pub struct AlertEvaluator {
    rules: Vec<AlertRule>,
    source: Arc<dyn SentimentSource>,
    notifier: Arc<dyn Notifier>,
    config_path: PathBuf,
    // Set when the file exists but could not be read; saving would destroy it.
    load_error: Option<String>,
}

impl AlertEvaluator {
    /// Loads rules from `config_path`. An unreadable file is logged and treated
    /// as empty, and the evaluator then refuses to save over it.
    pub fn load(
        config_path: impl Into<PathBuf>,
        source: Arc<dyn SentimentSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config_path = config_path.into();
        let (rules, load_error) = match store::load_rules(&config_path) {
            Ok(rules) => {
                tracing::info!(
                    count = rules.len(),
                    path = %config_path.display(),
                    "loaded alert rules"
                );
                (rules, None)
            }
            Err(err) => {
                let msg = format!("{err:#}");
                tracing::error!(error = %msg, "failed to load alert rules; starting empty");
                (Vec::new(), Some(msg))
            }
        };

        Self {
            rules,
            source,
            notifier,
            config_path,
            load_error,
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Writes the full rule list. Failures are logged and reported as `false`.
    pub fn save(&self) -> bool {
        if let Some(load_error) = &self.load_error {
            tracing::error!(
                path = %self.config_path.display(),
                load_error = %load_error,
                "alerts file was not loaded; refusing to overwrite it"
            );
            return false;
        }

        match store::save_rules(&self.config_path, &self.rules) {
            Ok(()) => {
                tracing::info!(
                    count = self.rules.len(),
                    path = %self.config_path.display(),
                    "saved alert rules"
                );
                true
            }
            Err(err) => {
                tracing::error!(error = %format!("{err:#}"), "failed to save alert rules");
                false
            }
        }
    }

    /// Appends a rule as given; thresholds and contact methods are not validated.
    pub fn add(
        &mut self,
        symbol: &str,
        threshold_positive: f64,
        threshold_negative: f64,
        email: Option<String>,
        webhook_url: Option<String>,
        check_interval: u64,
    ) -> AlertRule {
        let mut rule = AlertRule::new(symbol);
        rule.threshold_positive = threshold_positive;
        rule.threshold_negative = threshold_negative;
        rule.email = email;
        rule.webhook_url = webhook_url;
        rule.check_interval = check_interval;

        self.rules.push(rule.clone());
        self.save();
        tracing::info!(symbol, "added alert");
        rule
    }

    /// Removes every rule for `symbol` and returns how many were removed.
    pub fn remove(&mut self, symbol: &str) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| r.symbol != symbol);
        let removed = before - self.rules.len();
        self.save();
        tracing::info!(symbol, removed, "removed alerts");
        removed
    }

    /// Current sentiment for a symbol, or `None` when the source has nothing.
    pub async fn check_sentiment(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Option<SentimentReading> {
        let report = match self.source.analyze(symbol, true).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(symbol, error = %format!("{err:#}"), "sentiment fetch failed");
                return None;
            }
        };

        let overall = report.overall?;
        Some(SentimentReading {
            symbol: symbol.to_string(),
            sentiment_score: overall.average_score,
            confidence: overall.confidence,
            label: overall.label,
            sources: overall.total_sources,
            timestamp: now,
        })
    }

    /// Polls one rule and returns its next state. The input rule is never mutated.
    pub async fn check_one(
        &self,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> (AlertRule, CheckOutcome) {
        if !rule.is_due(now) {
            return (rule.clone(), CheckOutcome::NotDue);
        }

        let Some(reading) = self.check_sentiment(&rule.symbol, now).await else {
            tracing::debug!(symbol = %rule.symbol, "no sentiment data this cycle");
            return (rule.clone(), CheckOutcome::NoData);
        };

        let Transition { mut next, trigger } = rule.observe(&reading, now);
        let outcome = match trigger {
            Some(trigger) => {
                let record = self.dispatch(&next, trigger, now).await;
                next.record_trigger(record.clone());
                CheckOutcome::Triggered(record)
            }
            None => CheckOutcome::Observed,
        };

        (next, outcome)
    }

    /// Checks every rule in order, then saves. Returns the number of triggers fired.
    pub async fn check_all(&mut self, now: DateTime<Utc>) -> usize {
        let mut next_rules = Vec::with_capacity(self.rules.len());
        let mut fired = 0usize;

        for rule in &self.rules {
            let (next, outcome) = self.check_one(rule, now).await;
            if matches!(outcome, CheckOutcome::Triggered(_)) {
                fired += 1;
            }
            next_rules.push(next);
        }

        self.rules = next_rules;
        self.save();
        fired
    }

    async fn dispatch(
        &self,
        rule: &AlertRule,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> TriggerRecord {
        let notice = AlertNotice::new(rule, trigger.crossing, &trigger.reading);
        let mut email_sent = None;
        let mut webhook_sent = None;

        for notification in &trigger.notifications {
            match notification {
                Notification::Email { to } => {
                    let ok = match self.notifier.send_email(to, &notice).await {
                        Ok(()) => {
                            tracing::info!(symbol = %rule.symbol, "email alert sent");
                            true
                        }
                        Err(err) => {
                            tracing::error!(
                                symbol = %rule.symbol,
                                error = %format!("{err:#}"),
                                "email alert failed"
                            );
                            false
                        }
                    };
                    email_sent = Some(ok);
                }
                Notification::Webhook { url } => {
                    let ok = match self.notifier.send_webhook(url, &notice).await {
                        Ok(()) => {
                            tracing::info!(symbol = %rule.symbol, "webhook alert sent");
                            true
                        }
                        Err(err) => {
                            tracing::error!(
                                symbol = %rule.symbol,
                                error = %format!("{err:#}"),
                                "webhook alert failed"
                            );
                            false
                        }
                    };
                    webhook_sent = Some(ok);
                }
            }
        }

        tracing::info!(
            symbol = %rule.symbol,
            direction = ?trigger.crossing,
            label = %trigger.reading.label,
            score = trigger.reading.sentiment_score,
            "alert triggered"
        );
        trigger.into_record(now, email_sent, webhook_sent)
    }

    /// Sleep-poll loop: one `check_all` per tick until `duration` elapses or Ctrl-C.
    pub async fn monitor(&mut self, duration: Duration, tick: Duration) {
        let deadline = Instant::now() + duration;
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            duration_secs = duration.as_secs(),
            rules = self.rules.len(),
            "starting sentiment monitoring"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = tokio::time::sleep_until(deadline) => break,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("monitoring stopped by user");
                    break;
                }
            }

            if Instant::now() >= deadline {
                break;
            }

            let fired = self.check_all(Utc::now()).await;
            tracing::debug!(fired, "monitoring tick complete");
        }

        tracing::info!("monitoring completed");
    }

    pub fn summary(&self, now: DateTime<Utc>) -> AlertSummary {
        summarize(&self.rules, now)
    }
}

/// Per-rule status plus the number of triggers recorded on `now`'s UTC day.
pub fn summarize(rules: &[AlertRule], now: DateTime<Utc>) -> AlertSummary {
    let today: NaiveDate = now.date_naive();
    let alerts: Vec<RuleSummary> = rules
        .iter()
        .map(|r| RuleSummary {
            symbol: r.symbol.clone(),
            threshold_positive: r.threshold_positive,
            threshold_negative: r.threshold_negative,
            last_checked: r.last_checked,
            last_sentiment: r.last_sentiment,
            alerts_today: r.triggers_on(today),
        })
        .collect();

    AlertSummary {
        total_alerts: rules.len(),
        active_alerts: rules.iter().filter(|r| r.last_checked.is_some()).count(),
        alerts_triggered_today: alerts.iter().map(|a| a.alerts_today).sum(),
        alerts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert::Crossing;
    use crate::domain::snapshot::SentimentLabel;
    use crate::sentiment::types::{OverallSentiment, SentimentReport};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Returns scripted scores in order; `None` entries simulate a failed fetch.
    struct ScriptedSource {
        scores: Mutex<VecDeque<Option<f64>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedSource {
        fn new(scores: &[Option<f64>]) -> Arc<Self> {
            Arc::new(Self {
                scores: Mutex::new(scores.iter().copied().collect()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl SentimentSource for ScriptedSource {
        async fn analyze(
            &self,
            query: &str,
            _include_social: bool,
        ) -> anyhow::Result<SentimentReport> {
            *self.calls.lock().unwrap() += 1;
            let next = self.scores.lock().unwrap().pop_front().flatten();
            let Some(score) = next else {
                anyhow::bail!("upstream down for {query}");
            };
            Ok(SentimentReport {
                query: query.to_string(),
                overall: Some(OverallSentiment {
                    average_score: score,
                    label: SentimentLabel::from_score(score),
                    confidence: score.abs(),
                    total_sources: 7,
                }),
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        fail_email: bool,
        emails: Mutex<Vec<String>>,
        webhooks: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_email(&self, to: &str, _notice: &AlertNotice) -> anyhow::Result<()> {
            self.emails.lock().unwrap().push(to.to_string());
            anyhow::ensure!(!self.fail_email, "smtp refused");
            Ok(())
        }

        async fn send_webhook(&self, url: &str, _notice: &AlertNotice) -> anyhow::Result<()> {
            self.webhooks.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 6, 9, 0, 0).unwrap()
    }

    fn evaluator(
        dir: &tempfile::TempDir,
        source: Arc<ScriptedSource>,
        notifier: Arc<RecordingNotifier>,
    ) -> AlertEvaluator {
        AlertEvaluator::load(dir.path().join("sentiment_alerts.json"), source, notifier)
    }

    #[tokio::test]
    async fn crossing_scenario_triggers_once() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(&[Some(0.6), Some(0.7)]);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut ev = evaluator(&dir, source.clone(), notifier.clone());

        ev.add("AAPL", 0.5, -0.5, Some("trader@example.com".to_string()), None, 300);
        ev.rules[0].last_sentiment = Some(0.3);

        assert_eq!(ev.check_all(t0()).await, 1);
        assert_eq!(ev.rules()[0].alert_history.len(), 1);
        let record = &ev.rules()[0].alert_history[0];
        assert_eq!(record.direction, Some(Crossing::Positive));
        assert_eq!(record.label, SentimentLabel::Positive);
        assert_eq!(record.email_sent, Some(true));
        assert_eq!(record.webhook_sent, None);

        let later = t0() + ChronoDuration::seconds(300);
        assert_eq!(ev.check_all(later).await, 0);
        assert_eq!(ev.rules()[0].alert_history.len(), 1);
        assert_eq!(ev.rules()[0].last_sentiment, Some(0.7));
        assert_eq!(notifier.emails.lock().unwrap().len(), 1);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn first_check_only_records_observation() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let mut ev = evaluator(&dir, ScriptedSource::new(&[Some(0.95)]), notifier.clone());
        ev.add(
            "TSLA",
            0.5,
            -0.5,
            Some("a@example.com".to_string()),
            Some("https://h".to_string()),
            60,
        );

        let rule = ev.rules()[0].clone();
        let (next, outcome) = ev.check_one(&rule, t0()).await;
        assert_eq!(outcome, CheckOutcome::Observed);
        assert_eq!(next.last_sentiment, Some(0.95));
        assert_eq!(next.last_checked, Some(t0()));
        assert!(notifier.emails.lock().unwrap().is_empty());
        assert!(notifier.webhooks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_due_rule_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(&[Some(0.9)]);
        let ev = evaluator(&dir, source.clone(), Arc::new(RecordingNotifier::default()));

        let mut rule = AlertRule::new("MSFT");
        rule.check_interval = 600;
        rule.last_checked = Some(t0() - ChronoDuration::seconds(120));
        rule.last_sentiment = Some(0.0);

        let (next, outcome) = ev.check_one(&rule, t0()).await;
        assert_eq!(outcome, CheckOutcome::NotDue);
        assert_eq!(next, rule);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_rule_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(&[None]);
        let ev = evaluator(&dir, source, Arc::new(RecordingNotifier::default()));

        let mut rule = AlertRule::new("NVDA");
        rule.last_sentiment = Some(0.2);
        rule.last_checked = Some(t0() - ChronoDuration::hours(1));

        let (next, outcome) = ev.check_one(&rule, t0()).await;
        assert_eq!(outcome, CheckOutcome::NoData);
        assert_eq!(next, rule);
    }

    #[tokio::test]
    async fn email_failure_does_not_block_webhook() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier {
            fail_email: true,
            ..Default::default()
        });
        let mut ev = evaluator(&dir, ScriptedSource::new(&[Some(-0.8)]), notifier.clone());
        ev.add(
            "AMZN",
            0.5,
            -0.5,
            Some("a@example.com".to_string()),
            Some("https://hooks.example.com/x".to_string()),
            300,
        );
        ev.rules[0].last_sentiment = Some(-0.1);

        ev.check_all(t0()).await;

        let record = &ev.rules()[0].alert_history[0];
        assert_eq!(record.direction, Some(Crossing::Negative));
        assert_eq!(record.email_sent, Some(false));
        assert_eq!(record.webhook_sent, Some(true));
        assert_eq!(notifier.webhooks.lock().unwrap().as_slice(), ["https://hooks.example.com/x"]);
    }

    #[tokio::test]
    async fn check_all_persists_full_list() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(&[Some(0.2), Some(-0.3)]);
        let mut ev = evaluator(&dir, source.clone(), Arc::new(RecordingNotifier::default()));
        ev.add("AAPL", 0.5, -0.5, None, None, 300);
        ev.add("GOOGL", 0.5, -0.5, None, None, 300);

        ev.check_all(t0()).await;

        let reloaded = store::load_rules(ev.config_path()).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[0].last_sentiment, Some(0.2));
        assert_eq!(reloaded[1].last_sentiment, Some(-0.3));
        assert_eq!(reloaded[1].last_checked, Some(t0()));
    }

    #[tokio::test]
    async fn remove_deletes_every_matching_rule() {
        let dir = tempfile::tempdir().unwrap();
        let mut ev = evaluator(
            &dir,
            ScriptedSource::new(&[]),
            Arc::new(RecordingNotifier::default()),
        );
        ev.add("AAPL", 0.5, -0.5, None, None, 300);
        ev.add("AAPL", 0.3, -0.3, None, None, 60);
        ev.add("MSFT", 0.5, -0.5, None, None, 300);

        assert_eq!(ev.remove("AAPL"), 2);
        assert_eq!(ev.rules().len(), 1);
        assert_eq!(store::load_rules(ev.config_path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn add_accepts_unvalidated_rules() {
        let dir = tempfile::tempdir().unwrap();
        let mut ev = evaluator(
            &dir,
            ScriptedSource::new(&[]),
            Arc::new(RecordingNotifier::default()),
        );
        let rule = ev.add("ODD", -0.5, 0.5, None, None, 0);
        assert_eq!(rule.threshold_positive, -0.5);
        assert_eq!(rule.threshold_negative, 0.5);
        assert_eq!(ev.rules().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentiment_alerts.json");
        let original = r#"{"alerts": [{"symbol": "AAPL", "threshold_positive": 0.5"#;
        std::fs::write(&path, original).unwrap();

        let mut ev = AlertEvaluator::load(
            &path,
            ScriptedSource::new(&[Some(0.1)]),
            Arc::new(RecordingNotifier::default()),
        );
        assert!(ev.load_error().is_some());
        assert!(ev.rules().is_empty());

        ev.add("MSFT", 0.5, -0.5, None, None, 300);
        ev.check_all(t0()).await;
        assert!(!ev.save());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[tokio::test]
    async fn naive_timestamp_file_survives_add() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentiment_alerts.json");
        std::fs::write(
            &path,
            r#"{"alerts": [{
                "symbol": "AAPL",
                "threshold_positive": 0.5,
                "threshold_negative": -0.5,
                "email": null,
                "webhook_url": null,
                "check_interval": 300,
                "last_checked": "2026-04-01T09:30:00.123456",
                "last_sentiment": 0.42,
                "alert_history": [{
                    "timestamp": "2026-04-01T09:30:00.123456",
                    "sentiment_score": 0.61,
                    "label": "Positive",
                    "confidence": 0.61,
                    "email_sent": false
                }]
            }]}"#,
        )
        .unwrap();

        let mut ev = AlertEvaluator::load(
            &path,
            ScriptedSource::new(&[]),
            Arc::new(RecordingNotifier::default()),
        );
        assert!(ev.load_error().is_none());
        ev.add("MSFT", 0.5, -0.5, None, None, 300);

        let reloaded = store::load_rules(&path).unwrap();
        let symbols: Vec<&str> = reloaded.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, ["AAPL", "MSFT"]);
        assert_eq!(reloaded[0].alert_history.len(), 1);
        assert_eq!(reloaded[0].last_sentiment, Some(0.42));
    }

    #[tokio::test]
    async fn summary_counts_todays_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let mut ev = evaluator(
            &dir,
            ScriptedSource::new(&[Some(0.6)]),
            Arc::new(RecordingNotifier::default()),
        );
        ev.add("AAPL", 0.5, -0.5, None, None, 300);
        ev.add("MSFT", 0.5, -0.5, None, None, 300);
        ev.rules[0].last_sentiment = Some(0.1);
        ev.rules[1].last_checked = Some(t0());

        ev.check_all(t0()).await;

        let summary = ev.summary(t0() + ChronoDuration::hours(2));
        assert_eq!(summary.total_alerts, 2);
        assert_eq!(summary.active_alerts, 2);
        assert_eq!(summary.alerts_triggered_today, 1);
        assert_eq!(summary.alerts[0].alerts_today, 1);

        let tomorrow = ev.summary(t0() + ChronoDuration::days(1));
        assert_eq!(tomorrow.alerts_triggered_today, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_stops_at_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(&[Some(0.1), Some(0.1), Some(0.1)]);
        let mut ev = evaluator(&dir, source.clone(), Arc::new(RecordingNotifier::default()));
        ev.add("AAPL", 0.5, -0.5, None, None, 0);

        ev.monitor(Duration::from_secs(150), MONITOR_TICK).await;
        assert_eq!(source.calls(), 3);
    }
}
