use crate::error::StatwatchError;

/// Application configuration loaded from environment variables.
/// Contains only secrets and env-specific values; scheduler and upstream
/// tunables live in the TOML FileConfig.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,

    // Notifications
    pub notify_webhook_url: Option<String>,
    pub notify_webhook_url_rollback: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, StatwatchError> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| {
                StatwatchError::Config("DATABASE_URL environment variable is required".into())
            })?,
            notify_webhook_url: non_empty_env("NOTIFY_WEBHOOK_URL"),
            notify_webhook_url_rollback: non_empty_env("NOTIFY_WEBHOOK_URL_ROLLBACK"),
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!(
            "  NOTIFY_WEBHOOK_URL: {}",
            preview_opt(&self.notify_webhook_url)
        );
        tracing::info!(
            "  NOTIFY_WEBHOOK_URL_ROLLBACK: {}",
            preview_opt(&self.notify_webhook_url_rollback)
        );
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn preview(val: &str) -> String {
    let n = val
        .char_indices()
        .nth(5)
        .map(|(i, _)| i)
        .unwrap_or(val.len());
    format!("{}...({} chars)", &val[..n], val.len())
}

fn preview_opt(val: &Option<String>) -> String {
    match val {
        Some(v) if !v.is_empty() => preview(v),
        _ => "<not set>".to_string(),
    }
}
