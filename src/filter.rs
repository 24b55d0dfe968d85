use serde::Serialize;

use crate::models::{Application, ApplicationDetails, LocationType, Status};

/// Predicates narrowing a snapshot before analysis. Absent fields match
/// everything; present ones must all match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSpec {
    pub status: Option<Status>,
    pub location_type: Option<LocationType>,
    /// Case-insensitive substring of company, role or notes.
    pub text: Option<String>,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.location_type.is_none() && self.needle().is_none()
    }

    /// Matching applications, in input order.
    pub fn apply<'a>(&self, apps: &'a [Application]) -> Vec<&'a Application> {
        if self.is_empty() {
            return apps.iter().collect();
        }
        let needle = self.needle();
        apps.iter()
            .filter(|app| self.matches_with(app, needle.as_deref()))
            .collect()
    }

    pub fn matches(&self, app: &Application) -> bool {
        self.matches_with(app, self.needle().as_deref())
    }

    fn matches_with(&self, app: &Application, needle: Option<&str>) -> bool {
        if let Some(status) = self.status {
            if app.current_status() != status {
                return false;
            }
        }
        if let Some(location_type) = self.location_type {
            if app.details.location_type != location_type {
                return false;
            }
        }
        needle.is_none_or(|needle| details_contain(&app.details, needle))
    }

    fn needle(&self) -> Option<String> {
        self.text.as_deref().and_then(search_needle)
    }
}

/// Trimmed, lowercased search term; `None` when only whitespace remains.
pub fn search_needle(text: &str) -> Option<String> {
    Some(text.trim()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

/// Whether company, role or notes contain an already-lowercased needle.
pub fn details_contain(details: &ApplicationDetails, needle: &str) -> bool {
    [&details.company, &details.role, &details.notes]
        .iter()
        .any(|field| field.to_lowercase().contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::app;

    fn sample() -> Vec<Application> {
        let mut apps = vec![
            app(1, "Netflix", "Backend Engineer", LocationType::Remote, &[(Status::Applied, 0)]),
            app(
                2,
                "Stripe",
                "Frontend Developer",
                LocationType::Hybrid,
                &[(Status::Applied, 1), (Status::Interview, 4)],
            ),
            app(3, "Acme", "Data Analyst", LocationType::Remote, &[(Status::Applied, 2)]),
        ];
        apps[2].details.notes = "Referred by a NETFLIX alum".to_string();
        apps
    }

    fn ids(apps: &[&Application]) -> Vec<i64> {
        apps.iter().map(|a| a.id).collect()
    }

    #[test]
    fn empty_spec_is_identity() {
        let apps = sample();
        let spec = FilterSpec::default();
        assert!(spec.is_empty());
        assert_eq!(ids(&spec.apply(&apps)), vec![1, 2, 3]);
    }

    #[test]
    fn blank_text_counts_as_absent() {
        let apps = sample();
        let spec = FilterSpec {
            text: Some("   ".to_string()),
            ..FilterSpec::default()
        };
        assert!(spec.is_empty());
        assert_eq!(spec.apply(&apps).len(), 3);
    }

    #[test]
    fn status_matches_current_status_only() {
        let apps = sample();
        let spec = FilterSpec {
            status: Some(Status::Applied),
            ..FilterSpec::default()
        };
        assert_eq!(ids(&spec.apply(&apps)), vec![1, 3]);
    }

    #[test]
    fn text_searches_company_role_and_notes() {
        let apps = sample();
        let spec = FilterSpec {
            text: Some(" netflix".to_string()),
            ..FilterSpec::default()
        };
        assert_eq!(ids(&spec.apply(&apps)), vec![1, 3]);

        let spec = FilterSpec {
            text: Some("FRONTEND".to_string()),
            ..FilterSpec::default()
        };
        assert_eq!(ids(&spec.apply(&apps)), vec![2]);
    }

    #[test]
    fn all_present_filters_must_match() {
        let apps = sample();
        let spec = FilterSpec {
            status: Some(Status::Applied),
            location_type: Some(LocationType::Remote),
            text: Some("analyst".to_string()),
        };
        assert_eq!(ids(&spec.apply(&apps)), vec![3]);
        assert!(spec.matches(&apps[2]));
        assert!(!spec.matches(&apps[0]));

        let spec = FilterSpec {
            location_type: Some(LocationType::Onsite),
            ..FilterSpec::default()
        };
        assert!(spec.apply(&apps).is_empty());
    }

    #[test]
    fn text_match_folds_non_ascii_case() {
        let mut apps = sample();
        apps[0].details.company = "ÉCOLE Numérique".to_string();
        let spec = FilterSpec {
            text: Some(" école ".to_string()),
            ..FilterSpec::default()
        };
        assert_eq!(ids(&spec.apply(&apps)), vec![1]);
        assert_eq!(search_needle("  "), None);
        assert!(details_contain(&apps[0].details, "numérique"));
    }
}
