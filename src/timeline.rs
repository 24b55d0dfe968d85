use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::TimelineError;
use crate::models::{Status, StatusEvent};

/// Non-empty, time-ordered status history of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Timeline {
    events: Vec<StatusEvent>,
}

/// A change between two distinct statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Status,
    pub to: Status,
    pub at: NaiveDateTime,
}

impl Timeline {
    pub fn new(events: Vec<StatusEvent>) -> Result<Self, TimelineError> {
        if events.is_empty() {
            return Err(TimelineError::Empty);
        }
        for (index, pair) in events.windows(2).enumerate() {
            if pair[1].at < pair[0].at {
                return Err(TimelineError::OutOfOrder {
                    index: index + 1,
                    previous: pair[0].at,
                    at: pair[1].at,
                });
            }
        }
        Ok(Self { events })
    }

    /// Appends an event; it may not predate the current last event.
    pub fn push(&mut self, event: StatusEvent) -> Result<(), TimelineError> {
        let previous = self.last_event().at;
        if event.at < previous {
            return Err(TimelineError::OutOfOrder {
                index: self.events.len(),
                previous,
                at: event.at,
            });
        }
        self.events.push(event);
        Ok(())
    }

    pub fn events(&self) -> &[StatusEvent] {
        &self.events
    }

    pub fn first_event(&self) -> &StatusEvent {
        // Construction guarantees at least one event.
        &self.events[0]
    }

    pub fn last_event(&self) -> &StatusEvent {
        &self.events[self.events.len() - 1]
    }

    pub fn current_status(&self) -> Status {
        self.last_event().status
    }

    /// Status in effect at `t`, or `None` when `t` precedes the first event.
    pub fn status_at_or_before(&self, t: NaiveDateTime) -> Option<Status> {
        let idx = self.events.partition_point(|event| event.at <= t);
        if idx == 0 {
            None
        } else {
            Some(self.events[idx - 1].status)
        }
    }

    /// Adjacent pairs of distinct statuses; repeats collapse into one state.
    pub fn transitions(&self) -> impl Iterator<Item = Transition> + '_ {
        let mut current = self.events[0].status;
        self.events[1..].iter().filter_map(move |event| {
            if event.status == current {
                return None;
            }
            let transition = Transition {
                from: current,
                to: event.status,
                at: event.at,
            };
            current = event.status;
            Some(transition)
        })
    }

    /// The collapsed status sequence, starting with the initial status.
    pub fn distinct_statuses(&self) -> Vec<Status> {
        std::iter::once(self.events[0].status)
            .chain(self.transitions().map(|t| t.to))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn day(n: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .expect("valid date")
            .and_hms_opt(9, 0, 0)
            .expect("valid time")
            + Duration::days(n)
    }

    fn timeline(events: &[(Status, i64)]) -> Timeline {
        Timeline::new(
            events
                .iter()
                .map(|(status, d)| StatusEvent::new(*status, day(*d)))
                .collect(),
        )
        .expect("valid timeline")
    }

    #[test]
    fn rejects_empty_and_unsorted_histories() {
        assert_eq!(Timeline::new(Vec::new()), Err(TimelineError::Empty));

        let err = Timeline::new(vec![
            StatusEvent::new(Status::Applied, day(3)),
            StatusEvent::new(Status::Interview, day(1)),
        ])
        .unwrap_err();
        assert!(matches!(err, TimelineError::OutOfOrder { index: 1, .. }));
    }

    #[test]
    fn equal_timestamps_are_accepted() {
        let tl = timeline(&[(Status::Applied, 0), (Status::RecruiterScreen, 0)]);
        assert_eq!(tl.current_status(), Status::RecruiterScreen);
    }

    #[test]
    fn status_at_or_before_tracks_effective_status() {
        let tl = timeline(&[(Status::Applied, 0), (Status::Interview, 5), (Status::Offer, 10)]);
        assert_eq!(tl.status_at_or_before(day(-1)), None);
        assert_eq!(tl.status_at_or_before(day(0)), Some(Status::Applied));
        assert_eq!(tl.status_at_or_before(day(7)), Some(Status::Interview));
        assert_eq!(tl.status_at_or_before(day(10)), Some(Status::Offer));
        assert_eq!(tl.status_at_or_before(day(99)), Some(Status::Offer));
    }

    #[test]
    fn transitions_collapse_repeated_statuses() {
        let tl = timeline(&[
            (Status::Applied, 0),
            (Status::Applied, 2),
            (Status::Interview, 5),
            (Status::Interview, 6),
            (Status::Rejected, 9),
        ]);
        let pairs: Vec<(Status, Status)> = tl.transitions().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            pairs,
            vec![(Status::Applied, Status::Interview), (Status::Interview, Status::Rejected)]
        );
        assert_eq!(tl.transitions().next().map(|t| t.at), Some(day(5)));
        assert_eq!(
            tl.distinct_statuses(),
            vec![Status::Applied, Status::Interview, Status::Rejected]
        );
    }

    #[test]
    fn single_event_has_no_transitions() {
        let tl = timeline(&[(Status::Applied, 0)]);
        assert_eq!(tl.transitions().count(), 0);
        assert_eq!(tl.distinct_statuses(), vec![Status::Applied]);
    }

    #[test]
    fn push_refuses_backdated_events() {
        let mut tl = timeline(&[(Status::Applied, 4)]);
        assert!(tl.push(StatusEvent::new(Status::Interview, day(2))).is_err());
        tl.push(StatusEvent::new(Status::Interview, day(6)).with_note("onsite loop"))
            .expect("ordered push");
        assert_eq!(tl.current_status(), Status::Interview);
        assert_eq!(tl.last_event().note.as_deref(), Some("onsite loop"));
    }
}
