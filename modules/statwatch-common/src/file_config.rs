use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// TOML-backed tunables loaded from disk.
/// Secrets (database URL, webhook URLs) stay as env vars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    pub scheduler: SchedulerConfig,
    pub anomaly: AnomalyConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerConfig {
    /// Seconds between polling cycles.
    pub tick_interval_secs: u64,
    /// Days without a positive change before an entity is demoted to the inactive tier.
    pub inactivity_threshold_days: i64,
    /// Upper bound on the draw interval; at most one inactive draw per this many ticks.
    pub max_active_interval: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            inactivity_threshold_days: 7,
            max_active_interval: 10,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn inactivity_threshold(&self) -> chrono::Duration {
        chrono::Duration::days(self.inactivity_threshold_days)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AnomalyConfig {
    /// Strikes after which an entity becomes eligible for rollback.
    pub rollback_strike_threshold: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            rollback_strike_threshold: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://secure.runescape.com/m=hiscore_oldschool".to_string(),
            timeout_secs: 10,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML config content. Omitted sections and fields take their defaults.
pub fn parse_config(content: &str) -> Result<FileConfig> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 5);
        assert_eq!(config.scheduler.inactivity_threshold_days, 7);
        assert_eq!(config.scheduler.max_active_interval, 10);
        assert_eq!(config.anomaly.rollback_strike_threshold, 20);
        assert_eq!(config.upstream.timeout_secs, 10);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = parse_config(
            r#"
            [scheduler]
            tick_interval_secs = 30

            [upstream]
            base_url = "http://localhost:8080"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.tick_interval_secs, 30);
        assert_eq!(config.scheduler.inactivity_threshold_days, 7);
        assert_eq!(config.upstream.base_url, "http://localhost:8080");
        assert_eq!(config.upstream.timeout_secs, 10);
    }

    #[test]
    fn unknown_fields_rejected() {
        let result = parse_config(
            r#"
            [scheduler]
            tick_interval = 30
            "#,
        );
        assert!(result.is_err(), "misspelled keys should not be silently ignored");
    }

    #[test]
    fn tick_interval_never_zero() {
        let config = SchedulerConfig {
            tick_interval_secs: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
    }
}
