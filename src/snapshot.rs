use serde::Serialize;
use tracing::{debug, warn};

use crate::error::TimelineError;
use crate::models::{Application, ApplicationRecord};
use crate::timeline::Timeline;

/// Validated, immutable view of every stored application at load time.
///
/// Records whose status history does not form a valid timeline are left out
/// of `applications` and reported in `skipped`; one bad record never aborts
/// the rest of the batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Snapshot {
    pub applications: Vec<Application>,
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    pub id: i64,
    pub reason: String,
    #[serde(skip)]
    pub error: TimelineError,
}

impl Snapshot {
    pub fn from_records(records: impl IntoIterator<Item = ApplicationRecord>) -> Self {
        let mut snapshot = Snapshot::default();

        for record in records {
            match Timeline::new(record.events) {
                Ok(timeline) => snapshot
                    .applications
                    .push(Application::new(record.id, record.details, timeline)),
                Err(error) => {
                    warn!(application_id = record.id, %error, "excluding application with invalid timeline");
                    snapshot.skipped.push(SkippedRecord {
                        id: record.id,
                        reason: error.to_string(),
                        error,
                    });
                }
            }
        }

        debug!(
            loaded = snapshot.applications.len(),
            skipped = snapshot.skipped.len(),
            "snapshot built"
        );
        snapshot
    }
}
