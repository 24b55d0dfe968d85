use std::collections::BTreeSet;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

use crate::error::AnalyticsError;
use crate::models::Status;

pub const DEFAULT_STALENESS_DAYS: i64 = 30;
pub const DEFAULT_RECENT_WINDOW_DAYS: i64 = 30;

/// Calendar bucket size for time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            other => Err(format!("unknown granularity '{}' (expected day, week, month)", other)),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        })
    }
}

/// Knobs recognised by the analytics engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyticsConfig {
    pub granularity: Granularity,
    pub staleness_days: i64,
    pub terminal_statuses: BTreeSet<Status>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Day,
            staleness_days: DEFAULT_STALENESS_DAYS,
            terminal_statuses: default_terminal_statuses(),
        }
    }
}

impl AnalyticsConfig {
    /// Rejects a non-positive staleness window, whichever source set it.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        if self.staleness_days <= 0 {
            return Err(AnalyticsError::invalid_argument(
                "staleness_days",
                format!("must be positive, got {}", self.staleness_days),
            ));
        }
        Ok(())
    }

    pub fn is_terminal(&self, status: Status) -> bool {
        status == Status::Ghosted || self.terminal_statuses.contains(&status)
    }
}

pub fn default_terminal_statuses() -> BTreeSet<Status> {
    [Status::Offer, Status::Rejected, Status::Withdrawn].into_iter().collect()
}

/// Top-level configuration, read from the environment after `.env`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub analytics: AnalyticsConfig,
    pub recent_window_days: i64,
    pub db_path: Option<PathBuf>,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests need not touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let granularity = match lookup("APPTRACK_GRANULARITY") {
            Some(raw) => raw.parse().map_err(|reason| ConfigError::Invalid {
                key: "APPTRACK_GRANULARITY",
                reason,
            })?,
            None => Granularity::default(),
        };

        let staleness_days = parse_positive(&lookup, "APPTRACK_STALENESS_DAYS", DEFAULT_STALENESS_DAYS)?;
        let recent_window_days =
            parse_positive(&lookup, "APPTRACK_RECENT_WINDOW_DAYS", DEFAULT_RECENT_WINDOW_DAYS)?;

        let terminal_statuses = match lookup("APPTRACK_TERMINAL_STATUSES") {
            Some(raw) => parse_status_set(&raw)?,
            None => default_terminal_statuses(),
        };

        let db_path = lookup("APPTRACK_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let log_level = lookup("APPTRACK_LOG_LEVEL").unwrap_or_else(|| "warn".to_string());

        Ok(Self {
            analytics: AnalyticsConfig {
                granularity,
                staleness_days,
                terminal_statuses,
            },
            recent_window_days,
            db_path,
            telemetry: TelemetryConfig { log_level },
        })
    }
}

fn parse_positive<F>(lookup: &F, key: &'static str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a positive number of days, got '{}'", raw),
        }),
    }
}

fn parse_status_set(raw: &str) -> Result<BTreeSet<Status>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Status>().map_err(|reason| ConfigError::Invalid {
                key: "APPTRACK_TERMINAL_STATUSES",
                reason,
            })
        })
        .collect()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
