//! Job application tracking with status-history analytics.
//!
//! Storage hands over raw records, [`snapshot::Snapshot`] validates them into
//! [`models::Application`]s, [`filter::FilterSpec`] narrows the set, and
//! [`analytics::Aggregator`] and [`sankey::FlowGraph`] summarise it. All
//! analytics are pure functions of the snapshot they are given.

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod sankey;
pub mod snapshot;
pub mod telemetry;
pub mod timeline;
pub mod titles;
pub mod tui;

#[cfg(test)]
mod fixtures;
