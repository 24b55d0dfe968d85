use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::config::{AnalyticsConfig, Granularity};
use crate::error::AnalyticsError;
use crate::models::Application;
use crate::titles::normalize_role;

/// Categorical attribute an application can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Status,
    LocationType,
    Company,
    RoleCategory,
}

impl FromStr for Attribute {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "status" => Ok(Self::Status),
            "location" | "location_type" => Ok(Self::LocationType),
            "company" => Ok(Self::Company),
            "role" | "role_category" => Ok(Self::RoleCategory),
            other => Err(format!(
                "unknown attribute '{}' (expected status, location, company, role)",
                other
            )),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Status => "status",
            Self::LocationType => "location",
            Self::Company => "company",
            Self::RoleCategory => "role",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    pub bucket_start: NaiveDate,
    pub cumulative: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakdownEntry {
    pub value: String,
    pub count: usize,
}

/// Headline numbers for the overview row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub unique_companies: usize,
    pub recent: usize,
    pub window_days: i64,
}

/// Read-only aggregate queries over one snapshot of applications.
pub struct Aggregator<'a> {
    apps: Vec<&'a Application>,
}

impl<'a> Aggregator<'a> {
    pub fn new(apps: impl IntoIterator<Item = &'a Application>) -> Self {
        Self {
            apps: apps.into_iter().collect(),
        }
    }

    pub fn total_count(&self) -> usize {
        self.apps.len()
    }

    /// Distinct company names, compared trimmed and case-insensitively. A
    /// blank name is one value, the same group `breakdown_by` reports.
    pub fn unique_company_count(&self) -> usize {
        self.apps
            .iter()
            .map(|app| normalize_company(&app.details.company))
            .collect::<HashSet<_>>()
            .len()
    }

    /// Applications first logged within `[as_of - window_days, as_of]`.
    pub fn recent_count(&self, window_days: i64, as_of: NaiveDateTime) -> Result<usize, AnalyticsError> {
        if window_days <= 0 {
            return Err(AnalyticsError::invalid_argument(
                "window_days",
                format!("must be positive, got {}", window_days),
            ));
        }
        let lower = Duration::try_days(window_days).and_then(|span| as_of.checked_sub_signed(span));

        Ok(self
            .apps
            .iter()
            .map(|app| app.applied_at())
            .filter(|at| *at <= as_of && lower.is_none_or(|lo| *at >= lo))
            .count())
    }

    /// Running total of applications per calendar bucket, from the earliest
    /// to the latest application date. Empty buckets carry the prior total.
    pub fn cumulative_series(&self, granularity: Granularity) -> Vec<SeriesPoint> {
        let mut per_bucket: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        for app in &self.apps {
            *per_bucket
                .entry(bucket_start(app.applied_at().date(), granularity))
                .or_insert(0) += 1;
        }

        let (Some(&first), Some(&last)) = (per_bucket.keys().next(), per_bucket.keys().next_back()) else {
            return Vec::new();
        };

        let mut series = Vec::new();
        let mut cumulative = 0;
        let mut bucket = first;
        loop {
            cumulative += per_bucket.get(&bucket).copied().unwrap_or(0);
            series.push(SeriesPoint {
                bucket_start: bucket,
                cumulative,
            });
            if bucket >= last {
                break;
            }
            match next_bucket(bucket, granularity) {
                Some(next) => bucket = next,
                None => break,
            }
        }

        debug!(%granularity, buckets = series.len(), "cumulative series built");
        series
    }

    /// Counts per distinct value, largest first; ties sort by value.
    pub fn breakdown_by(&self, attribute: Attribute) -> Vec<BreakdownEntry> {
        // key -> (label, count); company keys are case-normalized and keep
        // the first spelling seen as their label.
        let mut groups: HashMap<String, (String, usize)> = HashMap::new();
        for app in &self.apps {
            let (key, label) = match attribute {
                Attribute::Status => {
                    let label = app.current_status().label().to_string();
                    (label.clone(), label)
                }
                Attribute::LocationType => {
                    let label = app.details.location_type.label().to_string();
                    (label.clone(), label)
                }
                Attribute::Company => (
                    normalize_company(&app.details.company),
                    app.details.company.trim().to_string(),
                ),
                Attribute::RoleCategory => {
                    let label = normalize_role(&app.details.role);
                    (label.clone(), label)
                }
            };
            groups.entry(key).or_insert((label, 0)).1 += 1;
        }

        let mut entries: Vec<BreakdownEntry> = groups
            .into_values()
            .map(|(value, count)| BreakdownEntry { value, count })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        entries
    }

    pub fn summary(&self, window_days: i64, as_of: NaiveDateTime) -> Result<Summary, AnalyticsError> {
        Ok(Summary {
            total: self.total_count(),
            unique_companies: self.unique_company_count(),
            recent: self.recent_count(window_days, as_of)?,
            window_days,
        })
    }

    /// Open applications whose follow-up date has arrived, oldest first.
    pub fn follow_ups_due(&self, as_of: NaiveDate, config: &AnalyticsConfig) -> Vec<&'a Application> {
        let mut due: Vec<&'a Application> = self
            .apps
            .iter()
            .copied()
            .filter(|app| !config.is_terminal(app.current_status()))
            .filter(|app| app.details.follow_up.is_some_and(|date| date <= as_of))
            .collect();
        due.sort_by_key(|app| (app.details.follow_up, app.id));
        due
    }
}

fn normalize_company(name: &str) -> String {
    name.trim().to_lowercase()
}

/// First day of the bucket containing `date`; weeks start on Monday.
pub fn bucket_start(date: NaiveDate, granularity: Granularity) -> NaiveDate {
    match granularity {
        Granularity::Day => date,
        Granularity::Week => date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
        Granularity::Month => date.with_day(1).unwrap_or(date),
    }
}

fn next_bucket(start: NaiveDate, granularity: Granularity) -> Option<NaiveDate> {
    match granularity {
        Granularity::Day => start.succ_opt(),
        Granularity::Week => start.checked_add_signed(Duration::days(7)),
        Granularity::Month => start.checked_add_months(Months::new(1)),
    }
}
