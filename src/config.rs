//! Runtime configuration loaded from the environment.

use std::path::PathBuf;

use chrono::Duration;

use crate::progression::{ConfigError, LevelCurve, ProgressionConfig, XpTable};

/// Longest accepted token lifetime: one year.
pub const MAX_TOKEN_TTL_MINUTES: i64 = 365 * 24 * 60;

/// Settings read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite file. `None` means the platform data directory.
    pub database_path: Option<PathBuf>,
    pub progression: ProgressionConfig,
    pub token_ttl: Duration,
}

impl AppConfig {
    /// Load from process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = XpTable::default();
        let xp_table = XpTable {
            easy: parse_or(&lookup, "DAILYQUEST_XP_EASY", defaults.easy)?,
            medium: parse_or(&lookup, "DAILYQUEST_XP_MEDIUM", defaults.medium)?,
            hard: parse_or(&lookup, "DAILYQUEST_XP_HARD", defaults.hard)?,
        };

        let curve = lookup("DAILYQUEST_LEVEL_CURVE").unwrap_or_else(|| "linear".to_string());
        let level_curve = match curve.trim().to_ascii_lowercase().as_str() {
            "linear" => LevelCurve::Linear {
                xp_per_level: parse_or(&lookup, "DAILYQUEST_XP_PER_LEVEL", 100)?,
            },
            "progressive" => LevelCurve::Progressive {
                base: parse_or(&lookup, "DAILYQUEST_LEVEL_BASE", 100)?,
                increment: parse_or(&lookup, "DAILYQUEST_LEVEL_INCREMENT", 50)?,
            },
            other => return Err(ConfigError::UnknownCurve(other.to_string())),
        };

        let ttl_minutes: i64 = parse_or(&lookup, "DAILYQUEST_TOKEN_TTL_MINUTES", 30)?;
        let token_ttl = Some(ttl_minutes)
            .filter(|minutes| (1..=MAX_TOKEN_TTL_MINUTES).contains(minutes))
            .and_then(Duration::try_minutes)
            .ok_or_else(|| ConfigError::InvalidValue {
                name: "DAILYQUEST_TOKEN_TTL_MINUTES",
                value: ttl_minutes.to_string(),
            })?;

        Ok(Self {
            database_path: lookup("DAILYQUEST_DB_PATH").map(PathBuf::from),
            progression: ProgressionConfig::new(xp_table, level_curve)?,
            token_ttl,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            progression: ProgressionConfig::default(),
            token_ttl: Duration::minutes(30),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}
