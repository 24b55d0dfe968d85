use chrono::NaiveDateTime;
use thiserror::Error;

/// A status history that cannot form a valid timeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimelineError {
    #[error("timeline has no status events")]
    Empty,
    #[error("status event #{index} at {at} is earlier than the preceding event at {previous}")]
    OutOfOrder {
        index: usize,
        previous: NaiveDateTime,
        at: NaiveDateTime,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    #[error("invalid timeline: {0}")]
    InvalidTimeline(#[from] TimelineError),
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },
}

impl AnalyticsError {
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}
