use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::AnalyticsConfig;
use crate::error::AnalyticsError;
use crate::models::{Application, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlowEdge {
    pub from: Status,
    pub to: Status,
    pub weight: usize,
}

/// Index-based link, the shape Sankey renderers take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SankeyLink {
    pub source: usize,
    pub target: usize,
    pub value: usize,
}

/// Weighted status-to-status flow across a set of applications.
///
/// Nodes are every status seen in any timeline, plus `Ghosted` when at least
/// one stale application was routed there, in pipeline order. Edges are
/// sorted by `(from, to)` and always carry a weight of at least one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowGraph {
    pub nodes: Vec<Status>,
    pub edges: Vec<FlowEdge>,
    /// Applications routed to `Ghosted`.
    pub ghosted: usize,
}

impl FlowGraph {
    /// Builds the graph as of `as_of`.
    ///
    /// Every application contributes one edge per change between distinct
    /// statuses. One that is still open (current status not terminal) and has
    /// been silent for more than `staleness_days` also contributes a single
    /// `current -> Ghosted` edge.
    pub fn build<'a>(
        apps: impl IntoIterator<Item = &'a Application>,
        as_of: NaiveDateTime,
        config: &AnalyticsConfig,
    ) -> Result<Self, AnalyticsError> {
        config.validate()?;

        let apps: Vec<&Application> = apps.into_iter().collect();
        if let Some(earliest) = apps.iter().map(|app| app.applied_at()).min() {
            if as_of < earliest {
                return Err(AnalyticsError::invalid_argument(
                    "as_of",
                    format!("{} precedes the earliest status event at {}", as_of, earliest),
                ));
            }
        }

        let mut nodes: BTreeSet<Status> = BTreeSet::new();
        let mut weights: BTreeMap<(Status, Status), usize> = BTreeMap::new();
        let mut ghosted = 0;

        for app in &apps {
            nodes.extend(app.timeline.events().iter().map(|event| event.status));
            for transition in app.timeline.transitions() {
                *weights.entry((transition.from, transition.to)).or_insert(0) += 1;
            }

            if is_ghosted(app, as_of, config) {
                *weights.entry((app.current_status(), Status::Ghosted)).or_insert(0) += 1;
                nodes.insert(Status::Ghosted);
                ghosted += 1;
            }
        }

        let edges: Vec<FlowEdge> = weights
            .into_iter()
            .map(|((from, to), weight)| FlowEdge { from, to, weight })
            .collect();

        debug!(
            applications = apps.len(),
            nodes = nodes.len(),
            edges = edges.len(),
            ghosted,
            "flow graph built"
        );

        Ok(Self {
            nodes: nodes.into_iter().collect(),
            edges,
            ghosted,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_labels(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|status| status.label()).collect()
    }

    pub fn links(&self) -> Vec<SankeyLink> {
        self.edges
            .iter()
            .filter_map(|edge| {
                Some(SankeyLink {
                    source: self.node_index(edge.from)?,
                    target: self.node_index(edge.to)?,
                    value: edge.weight,
                })
            })
            .collect()
    }

    pub fn outgoing_weight(&self, status: Status) -> usize {
        self.edges.iter().filter(|e| e.from == status).map(|e| e.weight).sum()
    }

    pub fn incoming_weight(&self, status: Status) -> usize {
        self.edges.iter().filter(|e| e.to == status).map(|e| e.weight).sum()
    }

    pub fn total_weight(&self) -> usize {
        self.edges.iter().map(|e| e.weight).sum()
    }

    /// Flow lines for sankeymatic.com, e.g. `Applied [3] Interview`.
    pub fn to_sankeymatic(&self) -> String {
        self.edges
            .iter()
            .map(|edge| format!("{} [{}] {}", edge.from, edge.weight, edge.to))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn node_index(&self, status: Status) -> Option<usize> {
        self.nodes.iter().position(|node| *node == status)
    }
}

/// Whether an open application has been silent for longer than the
/// configured staleness window. Expects a config that passed
/// [`AnalyticsConfig::validate`].
pub fn is_ghosted(app: &Application, as_of: NaiveDateTime, config: &AnalyticsConfig) -> bool {
    if config.is_terminal(app.current_status()) {
        return false;
    }
    let silent_for = as_of.signed_duration_since(app.last_activity());
    Duration::try_days(config.staleness_days).is_some_and(|limit| silent_for > limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{app, applied, day};
    use crate::models::LocationType;

    fn build(apps: &[Application], as_of: NaiveDateTime) -> FlowGraph {
        FlowGraph::build(apps, as_of, &AnalyticsConfig::default()).expect("graph builds")
    }

    fn edge(from: Status, to: Status, weight: usize) -> FlowEdge {
        FlowEdge { from, to, weight }
    }

    #[test]
    fn lone_stale_application_is_ghosted() {
        let apps = vec![applied(1, "Acme", 0)];
        let graph = build(&apps, day(40));
        assert_eq!(graph.nodes, vec![Status::Applied, Status::Ghosted]);
        assert_eq!(graph.edges, vec![edge(Status::Applied, Status::Ghosted, 1)]);
        assert_eq!(graph.ghosted, 1);
    }

    #[test]
    fn completed_pipeline_is_never_ghosted() {
        let apps = vec![app(
            1,
            "Acme",
            "Engineer",
            LocationType::Remote,
            &[(Status::Applied, 0), (Status::Interview, 5), (Status::Offer, 10)],
        )];
        let graph = build(&apps, day(400));
        assert_eq!(
            graph.edges,
            vec![
                edge(Status::Applied, Status::Interview, 1),
                edge(Status::Interview, Status::Offer, 1),
            ]
        );
        assert_eq!(graph.ghosted, 0);
        assert!(!graph.nodes.contains(&Status::Ghosted));
    }

    #[test]
    fn empty_collection_gives_empty_graph() {
        let apps: Vec<Application> = Vec::new();
        let graph = build(&apps, day(0));
        assert!(graph.is_empty());
        assert!(graph.edges.is_empty());
        assert_eq!(graph.to_sankeymatic(), "");
    }

    #[test]
    fn staleness_threshold_is_exclusive() {
        let apps = vec![applied(1, "Acme", 0)];
        assert_eq!(build(&apps, day(30)).ghosted, 0);
        assert_eq!(build(&apps, day(30) + Duration::seconds(1)).ghosted, 1);
    }

    #[test]
    fn repeated_statuses_do_not_add_weight() {
        let apps = vec![app(
            1,
            "Acme",
            "Engineer",
            LocationType::Remote,
            &[
                (Status::Applied, 0),
                (Status::Applied, 1),
                (Status::RecruiterScreen, 2),
                (Status::RecruiterScreen, 3),
                (Status::Rejected, 4),
            ],
        )];
        let graph = build(&apps, day(5));
        assert_eq!(
            graph.edges,
            vec![
                edge(Status::Applied, Status::RecruiterScreen, 1),
                edge(Status::RecruiterScreen, Status::Rejected, 1),
            ]
        );
        assert!(graph.edges.iter().all(|e| e.from != e.to));
    }

    #[test]
    fn weights_sum_per_pair_and_match_each_applications_contribution() {
        let apps = vec![
            app(
                1,
                "A",
                "Engineer",
                LocationType::Remote,
                &[(Status::Applied, 0), (Status::Interview, 3), (Status::Rejected, 8)],
            ),
            app(
                2,
                "B",
                "Engineer",
                LocationType::Remote,
                &[(Status::Applied, 1), (Status::Interview, 2)],
            ),
            applied(3, "C", 60),
            applied(4, "D", 2),
        ];
        let as_of = day(70);
        let graph = build(&apps, as_of);

        assert_eq!(
            graph.edges,
            vec![
                edge(Status::Applied, Status::Interview, 2),
                edge(Status::Applied, Status::Ghosted, 1),
                edge(Status::Interview, Status::Rejected, 1),
                edge(Status::Interview, Status::Ghosted, 1),
            ]
        );

        // Each application adds (distinct statuses - 1), plus one if ghosted.
        let expected: usize = apps
            .iter()
            .map(|a| {
                let ghost = FlowGraph::build([a], as_of, &AnalyticsConfig::default())
                    .expect("graph builds")
                    .ghosted;
                a.timeline.distinct_statuses().len() - 1 + ghost
            })
            .sum();
        assert_eq!(graph.total_weight(), expected);
        assert_eq!(graph.incoming_weight(Status::Ghosted), graph.ghosted);
        assert_eq!(graph.outgoing_weight(Status::Applied), 3);
    }

    #[test]
    fn nodes_include_statuses_without_edges() {
        let apps = vec![applied(1, "Acme", 0), applied(2, "Globex", 1)];
        let graph = build(&apps, day(2));
        assert_eq!(graph.nodes, vec![Status::Applied]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn as_of_before_all_data_is_rejected() {
        let apps = vec![applied(1, "Acme", 5), applied(2, "Globex", 8)];
        let err = FlowGraph::build(&apps, day(4), &AnalyticsConfig::default()).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidArgument { name: "as_of", .. }));
        // Between the two applications is fine.
        assert!(FlowGraph::build(&apps, day(6), &AnalyticsConfig::default()).is_ok());
    }

    #[test]
    fn custom_terminal_set_and_staleness_are_honoured() {
        let apps = vec![app(
            1,
            "Acme",
            "Engineer",
            LocationType::Remote,
            &[(Status::Applied, 0), (Status::Offer, 2)],
        )];
        let config = AnalyticsConfig {
            staleness_days: 7,
            terminal_statuses: [Status::Rejected, Status::Withdrawn].into_iter().collect(),
            ..AnalyticsConfig::default()
        };
        let graph = FlowGraph::build(&apps, day(10), &config).expect("graph builds");
        assert_eq!(graph.outgoing_weight(Status::Offer), 1);
        assert_eq!(graph.ghosted, 1);

        let bad = AnalyticsConfig {
            staleness_days: 0,
            ..AnalyticsConfig::default()
        };
        assert!(FlowGraph::build(&apps, day(10), &bad).is_err());
    }

    #[test]
    fn links_and_sankeymatic_export_follow_node_order() {
        let apps = vec![
            app(
                1,
                "A",
                "Engineer",
                LocationType::Remote,
                &[(Status::Applied, 0), (Status::Interview, 1)],
            ),
            applied(2, "B", 0),
        ];
        let graph = build(&apps, day(45));
        assert_eq!(graph.node_labels(), vec!["Applied", "Interview", "Ghosted"]);
        assert_eq!(
            graph.links(),
            vec![
                SankeyLink { source: 0, target: 1, value: 1 },
                SankeyLink { source: 0, target: 2, value: 1 },
                SankeyLink { source: 1, target: 2, value: 1 },
            ]
        );
        assert_eq!(
            graph.to_sankeymatic(),
            "Applied [1] Interview\nApplied [1] Ghosted\nInterview [1] Ghosted"
        );
    }

    #[test]
    fn rebuilding_is_byte_identical() {
        let apps = vec![applied(1, "A", 0), applied(2, "B", 3)];
        let first = serde_json::to_string(&build(&apps, day(50))).expect("serialize");
        let second = serde_json::to_string(&build(&apps, day(50))).expect("serialize");
        assert_eq!(first, second);
    }
}
