//! Shared builders for unit tests.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::{Application, ApplicationDetails, LocationType, Status, StatusEvent};
use crate::timeline::Timeline;

pub(crate) fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 6).expect("valid date")
}

/// Noon on the given day offset from 2025-01-06 (a Monday).
pub(crate) fn day(n: i64) -> NaiveDateTime {
    epoch().and_hms_opt(12, 0, 0).expect("valid time") + Duration::days(n)
}

pub(crate) fn app(
    id: i64,
    company: &str,
    role: &str,
    location_type: LocationType,
    events: &[(Status, i64)],
) -> Application {
    let events = events
        .iter()
        .map(|(status, n)| StatusEvent::new(*status, day(*n)))
        .collect();
    Application::new(
        id,
        ApplicationDetails::new(company, role, location_type),
        Timeline::new(events).expect("fixture timeline is ordered"),
    )
}

pub(crate) fn applied(id: i64, company: &str, on_day: i64) -> Application {
    app(id, company, "Software Engineer", LocationType::Remote, &[(Status::Applied, on_day)])
}
