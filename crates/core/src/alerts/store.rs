use crate::domain::alert::AlertRule;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
struct AlertFile {
    #[serde(default)]
    alerts: Vec<AlertRule>,
}

/// Missing file means no rules yet.
pub fn load_rules(path: &Path) -> anyhow::Result<Vec<AlertRule>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read alerts file {}", path.display()))?;
    let file: AlertFile = serde_json::from_str(&text)
        .with_context(|| format!("alerts file {} is not valid JSON", path.display()))?;
    Ok(file.alerts)
}

/// Rewrites the whole file. No locking: concurrent writers race, last one wins.
pub fn save_rules(path: &Path, rules: &[AlertRule]) -> anyhow::Result<()> {
    #[derive(Serialize)]
    struct AlertFileRef<'a> {
        alerts: &'a [AlertRule],
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(&AlertFileRef { alerts: rules })
        .context("failed to serialize alert rules")?;
    std::fs::write(path, json)
        .with_context(|| format!("failed to write alerts file {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let rules = load_rules(&dir.path().join("nope.json")).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn save_then_load_keeps_runtime_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sentiment_alerts.json");

        let mut rule = AlertRule::new("AAPL");
        rule.webhook_url = Some("https://hooks.example.com/a".to_string());
        rule.last_checked = Some(Utc.with_ymd_and_hms(2026, 4, 2, 8, 0, 0).unwrap());
        rule.last_sentiment = Some(0.27);

        save_rules(&path, &[rule.clone(), AlertRule::new("TSLA")]).unwrap();
        let loaded = load_rules(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0], rule);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["alerts"][1]["symbol"], "TSLA");
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_rules(&path).is_err());
    }
}
