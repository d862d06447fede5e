use chrono::Utc;
use clap::Subcommand;
use pulse_core::alerts::evaluator::{AlertEvaluator, MONITOR_TICK};
use pulse_core::alerts::notify::ChannelNotifier;
use pulse_core::config::Settings;
use pulse_core::domain::alert::{
    DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_THRESHOLD_NEGATIVE, DEFAULT_THRESHOLD_POSITIVE,
};
use pulse_core::sentiment::SentimentSource;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// Add a rule. Thresholds and contacts are stored as given.
    Add {
        symbol: String,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD_POSITIVE, allow_hyphen_values = true)]
        positive: f64,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD_NEGATIVE, allow_hyphen_values = true)]
        negative: f64,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        webhook: Option<String>,
        /// Seconds between checks.
        #[arg(long, default_value_t = DEFAULT_CHECK_INTERVAL_SECS)]
        interval: u64,
    },
    /// Remove every rule for a symbol.
    Remove { symbol: String },
    List,
    /// Print current sentiment for SYMBOL, or run one pass over all due rules.
    Check { symbol: Option<String> },
    /// Check once a minute until the duration elapses or Ctrl-C.
    Monitor {
        #[arg(long, default_value_t = 60)]
        minutes: u64,
    },
    Summary,
}

pub async fn run(
    cmd: AlertsCommand,
    settings: &Settings,
    source: Arc<dyn SentimentSource>,
) -> anyhow::Result<()> {
    let notifier = Arc::new(ChannelNotifier::new(settings.smtp.clone())?);
    let mut evaluator = AlertEvaluator::load(&settings.alerts_file, source, notifier);
    if let Some(err) = evaluator.load_error() {
        println!(
            "warning: {} could not be read ({err}); changes will not be saved",
            settings.alerts_file
        );
    }

    match cmd {
        AlertsCommand::Add {
            symbol,
            positive,
            negative,
            email,
            webhook,
            interval,
        } => {
            if email.is_none() && webhook.is_none() {
                println!("note: {symbol} has no email or webhook; triggers will only be recorded");
            }
            let rule = evaluator.add(&symbol, positive, negative, email, webhook, interval);
            println!(
                "added alert for {} (positive > {}, negative < {}, every {}s)",
                rule.symbol, rule.threshold_positive, rule.threshold_negative, rule.check_interval
            );
        }
        AlertsCommand::Remove { symbol } => match evaluator.remove(&symbol) {
            0 => println!("no alerts found for {symbol}"),
            n => println!("removed {n} alert(s) for {symbol}"),
        },
        AlertsCommand::List => {
            if evaluator.rules().is_empty() {
                println!("no alerts configured");
            }
            for rule in evaluator.rules() {
                let last = match (rule.last_checked, rule.last_sentiment) {
                    (Some(at), Some(score)) => {
                        format!("last {score:.3} at {}", at.format("%Y-%m-%d %H:%M:%S UTC"))
                    }
                    _ => "never checked".to_string(),
                };
                println!(
                    "{}: positive > {}, negative < {}, every {}s, email={}, webhook={}, {last}",
                    rule.symbol,
                    rule.threshold_positive,
                    rule.threshold_negative,
                    rule.check_interval,
                    rule.email.as_deref().unwrap_or("-"),
                    rule.webhook_url.as_deref().unwrap_or("-"),
                );
            }
        }
        AlertsCommand::Check {
            symbol: Some(symbol),
        } => match evaluator.check_sentiment(&symbol, Utc::now()).await {
            Some(r) => println!(
                "{}: {} ({:.3}), confidence {:.1}%, {} sources",
                r.symbol,
                r.label,
                r.sentiment_score,
                r.confidence * 100.0,
                r.sources
            ),
            None => println!("{symbol}: no sentiment data available"),
        },
        AlertsCommand::Check { symbol: None } => {
            let fired = evaluator.check_all(Utc::now()).await;
            println!("checked {} alert(s); {fired} triggered", evaluator.rules().len());
        }
        AlertsCommand::Monitor { minutes } => {
            println!(
                "monitoring {} alert(s) for {minutes} minute(s); Ctrl-C to stop",
                evaluator.rules().len()
            );
            evaluator
                .monitor(Duration::from_secs(minutes.saturating_mul(60)), MONITOR_TICK)
                .await;
            println!("monitoring finished");
        }
        AlertsCommand::Summary => {
            let summary = evaluator.summary(Utc::now());
            println!(
                "{} alert(s), {} active, {} triggered today",
                summary.total_alerts, summary.active_alerts, summary.alerts_triggered_today
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
