use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Contracts ending within this many days are flagged on the dashboard.
    pub expiring_window_days: i64,
    pub dashboard_cache_ttl_secs: u64,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst: u32,
    /// Offset used to decide what "today" is (Brasília is -3).
    pub utc_offset_hours: i32,
}

/// Reads an optional variable, parsing it or falling back to `default`.
fn env_or<T: std::str::FromStr>(name: &str, default: T, hint: &str) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be {}", name, hint)),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: env_or("PORT", 3000, "a valid number between 1-65535")?,
            expiring_window_days: env_or("EXPIRING_WINDOW_DAYS", 30, "a number of days")
                .and_then(|days| {
                    if days < 1 {
                        anyhow::bail!("EXPIRING_WINDOW_DAYS must be at least 1");
                    }
                    Ok(days)
                })?,
            dashboard_cache_ttl_secs: env_or(
                "DASHBOARD_CACHE_TTL_SECS",
                60,
                "a number of seconds",
            )?,
            rate_limit_per_second: env_or("RATE_LIMIT_PER_SECOND", 10, "a positive number")
                .and_then(|n| {
                    if n == 0 {
                        anyhow::bail!("RATE_LIMIT_PER_SECOND must be greater than 0");
                    }
                    Ok(n)
                })?,
            rate_limit_burst: env_or("RATE_LIMIT_BURST", 20, "a positive number").and_then(
                |n| {
                    if n == 0 {
                        anyhow::bail!("RATE_LIMIT_BURST must be greater than 0");
                    }
                    Ok(n)
                },
            )?,
            utc_offset_hours: env_or("UTC_OFFSET_HOURS", -3, "a whole number of hours")
                .and_then(|hours| {
                    if !(-12..=14).contains(&hours) {
                        anyhow::bail!("UTC_OFFSET_HOURS must be between -12 and 14");
                    }
                    Ok(hours)
                })?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Server Port: {}", config.port);
        tracing::debug!(
            "Expiring window: {} days, dashboard cache TTL: {}s, UTC offset: {}h",
            config.expiring_window_days,
            config.dashboard_cache_ttl_secs,
            config.utc_offset_hours
        );

        Ok(config)
    }

    /// Current calendar date at the configured offset.
    pub fn today(&self) -> NaiveDate {
        self.local_date(Utc::now())
    }

    /// Calendar date of `instant` at the configured offset.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        match FixedOffset::east_opt(self.utc_offset_hours * 3600) {
            Some(offset) => instant.with_timezone(&offset).date_naive(),
            None => instant.date_naive(),
        }
    }
}
