use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::timeline::Timeline;

/// Pipeline stage of an application. Variant order is pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    Applied,
    RecruiterScreen,
    Interview,
    Offer,
    Rejected,
    Withdrawn,
    /// Never set by the user, only inferred from silence.
    Ghosted,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Applied,
        Status::RecruiterScreen,
        Status::Interview,
        Status::Offer,
        Status::Rejected,
        Status::Withdrawn,
        Status::Ghosted,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Status::Applied => "Applied",
            Status::RecruiterScreen => "Recruiter Screen",
            Status::Interview => "Interview",
            Status::Offer => "Offer",
            Status::Rejected => "Rejected",
            Status::Withdrawn => "Withdrawn",
            Status::Ghosted => "Ghosted",
        }
    }

    pub fn is_synthetic(self) -> bool {
        self == Status::Ghosted
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();
        match key.as_str() {
            "applied" => Ok(Status::Applied),
            "recruiter screen" | "screen" | "phone screen" => Ok(Status::RecruiterScreen),
            "interview" | "interview 1" | "interview 2+" | "final round" => Ok(Status::Interview),
            "offer" => Ok(Status::Offer),
            "rejected" => Ok(Status::Rejected),
            "withdrawn" => Ok(Status::Withdrawn),
            "ghosted" => Ok(Status::Ghosted),
            _ => Err(format!(
                "unknown status '{}' (expected applied, screen, interview, offer, rejected, withdrawn)",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LocationType {
    Remote,
    Hybrid,
    Onsite,
}

impl LocationType {
    pub fn label(self) -> &'static str {
        match self {
            LocationType::Remote => "Remote",
            LocationType::Hybrid => "Hybrid",
            LocationType::Onsite => "Onsite",
        }
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for LocationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "remote" => Ok(LocationType::Remote),
            "hybrid" => Ok(LocationType::Hybrid),
            "onsite" | "on-site" | "on site" | "office" => Ok(LocationType::Onsite),
            _ => Err(format!(
                "unknown location type '{}' (expected remote, hybrid, onsite)",
                s
            )),
        }
    }
}

/// Base salary range; either end may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SalaryRange {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl SalaryRange {
    /// Builds a range, swapping the ends if they arrive reversed.
    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        match (min, max) {
            (Some(lo), Some(hi)) if lo > hi => Self { min: Some(hi), max: Some(lo) },
            _ => Self { min, max },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

impl fmt::Display for SalaryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "${}k-${}k", min / 1000, max / 1000),
            (Some(min), None) => write!(f, "${}k+", min / 1000),
            (None, Some(max)) => write!(f, "<${}k", max / 1000),
            (None, None) => f.write_str("-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub status: Status,
    pub at: NaiveDateTime,
    pub note: Option<String>,
}

impl StatusEvent {
    pub fn new(status: Status, at: NaiveDateTime) -> Self {
        Self { status, at, note: None }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Static attributes of an application, everything except its timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDetails {
    pub company: String,
    pub role: String,
    pub salary: Option<SalaryRange>,
    pub link: Option<String>,
    pub description: String,
    pub notes: String,
    pub location_type: LocationType,
    pub location_detail: Option<String>,
    pub follow_up: Option<NaiveDate>,
}

impl ApplicationDetails {
    pub fn new(company: impl Into<String>, role: impl Into<String>, location_type: LocationType) -> Self {
        Self {
            company: company.into(),
            role: role.into(),
            salary: None,
            link: None,
            description: String::new(),
            notes: String::new(),
            location_type,
            location_detail: None,
            follow_up: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    pub id: i64,
    pub details: ApplicationDetails,
    pub timeline: Timeline,
}

impl Application {
    pub fn new(id: i64, details: ApplicationDetails, timeline: Timeline) -> Self {
        Self { id, details, timeline }
    }

    pub fn current_status(&self) -> Status {
        self.timeline.current_status()
    }

    /// When the application was first logged.
    pub fn applied_at(&self) -> NaiveDateTime {
        self.timeline.first_event().at
    }

    pub fn last_activity(&self) -> NaiveDateTime {
        self.timeline.last_event().at
    }
}

/// Row shape handed over by the storage collaborator, not yet validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: i64,
    pub details: ApplicationDetails,
    pub events: Vec<StatusEvent>,
    pub created_at: String,
    pub updated_at: String,
}
