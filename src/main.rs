use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use apptrack::analytics::{Aggregator, Attribute, BreakdownEntry, SeriesPoint, Summary};
use apptrack::config::{AppConfig, Granularity};
use apptrack::db::{parse_salary, Database};
use apptrack::filter::FilterSpec;
use apptrack::models::{Application, ApplicationDetails, LocationType, Status};
use apptrack::sankey::{self, FlowEdge, FlowGraph, SankeyLink};
use apptrack::snapshot::{SkippedRecord, Snapshot};
use apptrack::{telemetry, titles, tui};

#[derive(Parser)]
#[command(name = "apptrack")]
#[command(about = "Track job applications and see how they move through the pipeline")]
struct Cli {
    /// Database file (defaults to the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Evaluate analytics as of this date (YYYY-MM-DD) instead of now
    #[arg(long, global = true)]
    as_of: Option<String>,

    /// Bucket size for time series (day, week, month)
    #[arg(long, global = true)]
    granularity: Option<Granularity>,

    /// Days of silence before an open application counts as ghosted
    #[arg(long, global = true)]
    staleness_days: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct FilterArgs {
    /// Only applications currently in this status
    #[arg(short, long)]
    status: Option<Status>,

    /// Only applications with this location type (remote, hybrid, onsite)
    #[arg(short, long)]
    location: Option<LocationType>,

    /// Case-insensitive text matched against company, role and notes
    #[arg(short = 'q', long)]
    search: Option<String>,
}

impl FilterArgs {
    fn spec(&self) -> FilterSpec {
        FilterSpec {
            status: self.status,
            location_type: self.location,
            text: self.search.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Log a new application
    Add {
        /// Company name
        company: String,

        /// Role / job title
        role: String,

        /// Location type (remote, hybrid, onsite)
        #[arg(short, long, default_value = "remote")]
        location: LocationType,

        /// City, state or other location detail
        #[arg(long)]
        location_detail: Option<String>,

        /// Salary range, e.g. "120k-150k"
        #[arg(long)]
        salary: Option<String>,

        /// Job posting URL
        #[arg(long)]
        link: Option<String>,

        /// Short description of the role
        #[arg(short, long, default_value = "")]
        description: String,

        /// Private notes
        #[arg(short, long, default_value = "")]
        notes: String,

        /// Initial status
        #[arg(long, default_value = "applied")]
        status: Status,

        /// Date applied (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Next follow-up date (YYYY-MM-DD)
        #[arg(long)]
        follow_up: Option<String>,
    },

    /// List applications
    List {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Show application details and timeline
    Show {
        /// Application ID
        id: i64,
    },

    /// Record a status change
    Status {
        /// Application ID
        id: i64,

        /// New status (applied, screen, interview, offer, rejected, withdrawn)
        status: Status,

        /// Note attached to the status change
        #[arg(short, long)]
        note: Option<String>,

        /// When it happened (YYYY-MM-DD or "YYYY-MM-DD HH:MM", defaults to now)
        #[arg(long)]
        at: Option<String>,
    },

    /// Edit application details
    Edit {
        /// Application ID
        id: i64,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        role: Option<String>,

        #[arg(short, long)]
        location: Option<LocationType>,

        #[arg(long)]
        location_detail: Option<String>,

        /// Salary range, e.g. "120k-150k"; "none" clears it
        #[arg(long)]
        salary: Option<String>,

        #[arg(long)]
        link: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Set or clear the next follow-up date
    FollowUp {
        /// Application ID
        id: i64,

        /// Follow-up date (YYYY-MM-DD)
        date: Option<String>,

        /// Remove the follow-up date
        #[arg(long, conflicts_with = "date")]
        clear: bool,
    },

    /// Delete an application and its timeline
    Delete {
        /// Application ID
        id: i64,
    },

    /// Show headline numbers, a breakdown and the cumulative trend
    Stats {
        #[command(flatten)]
        filter: FilterArgs,

        /// Breakdown attribute (status, location, company, role)
        #[arg(short, long, default_value = "status")]
        by: Attribute,

        /// Window for the "recent applications" count, in days
        #[arg(short, long)]
        window: Option<i64>,

        /// Emit JSON instead of tables
        #[arg(long)]
        json: bool,
    },

    /// Show status-to-status flow (Sankey data)
    Flow {
        #[command(flatten)]
        filter: FilterArgs,

        /// Emit SankeyMATIC flow lines
        #[arg(long, conflicts_with = "json")]
        sankeymatic: bool,

        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List open applications whose follow-up date has arrived
    Followups,

    /// Browse applications interactively
    Browse {
        #[command(flatten)]
        filter: FilterArgs,
    },
}

#[derive(Serialize)]
struct StatsReport<'a> {
    as_of: NaiveDateTime,
    filter: &'a FilterSpec,
    summary: Summary,
    breakdown_by: Attribute,
    breakdown: Vec<BreakdownEntry>,
    granularity: Granularity,
    series: Vec<SeriesPoint>,
    skipped: &'a [SkippedRecord],
}

#[derive(Serialize)]
struct FlowReport<'a> {
    as_of: NaiveDateTime,
    staleness_days: i64,
    labels: Vec<&'static str>,
    edges: &'a [FlowEdge],
    links: Vec<SankeyLink>,
    ghosted: usize,
    skipped: &'a [SkippedRecord],
}

/// Applies global flags on top of the environment config and re-validates it.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) -> Result<()> {
    if let Some(granularity) = cli.granularity {
        config.analytics.granularity = granularity;
    }
    if let Some(days) = cli.staleness_days {
        config.analytics.staleness_days = days;
    }
    config
        .analytics
        .validate()
        .context("invalid --staleness-days")?;
    Ok(())
}

/// Loads a validated snapshot, narrowing at storage when a search term is given.
fn load_snapshot(db: &Database, filter: &FilterSpec) -> Result<Snapshot> {
    let records = match filter.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => db.search(text)?,
        _ => db.list_records()?,
    };
    let snapshot = Snapshot::from_records(records);
    if !snapshot.skipped.is_empty() {
        eprintln!(
            "warning: skipped {} application(s) with an invalid timeline: {}",
            snapshot.skipped.len(),
            snapshot
                .skipped
                .iter()
                .map(|s| format!("#{}", s.id))
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(snapshot)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    apply_overrides(&mut config, &cli)?;
    let as_of = match cli.as_of.as_deref() {
        Some(raw) => parse_as_of(raw)?,
        None => Local::now().naive_local(),
    };
    debug!(%as_of, granularity = %config.analytics.granularity, "configuration resolved");

    let db = Database::open(cli.db.as_deref().or(config.db_path.as_deref()))?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Add {
            company,
            role,
            location,
            location_detail,
            salary,
            link,
            description,
            notes,
            status,
            date,
            follow_up,
        } => {
            db.ensure_initialized()?;
            let mut details = ApplicationDetails::new(company, role, location);
            details.location_detail = location_detail;
            details.salary = match salary.as_deref() {
                Some(raw) => Some(parse_salary(raw).ok_or_else(|| anyhow!("Could not read salary '{}'", raw))?),
                None => None,
            };
            details.link = link;
            details.description = description;
            details.notes = notes;
            details.follow_up = follow_up.as_deref().map(parse_date).transpose()?;

            let at = match date.as_deref() {
                Some(raw) => parse_timestamp(raw)?,
                None => Local::now().naive_local(),
            };
            let id = db.create_application(&details, status, at, None)?;
            println!("Added application #{} ({} at {})", id, details.role, details.company);
        }

        Commands::List { filter } => {
            db.ensure_initialized()?;
            let spec = filter.spec();
            let snapshot = load_snapshot(&db, &spec)?;
            let apps = spec.apply(&snapshot.applications);
            if apps.is_empty() {
                println!("No applications found.");
            } else {
                println!(
                    "{:<6} {:<17} {:<22} {:<28} {:<8} {:<11} {:>12}",
                    "ID", "STATUS", "COMPANY", "ROLE", "LOCATION", "APPLIED", "SALARY"
                );
                println!("{}", "-".repeat(109));
                for app in apps {
                    let salary = app.details.salary.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<6} {:<17} {:<22} {:<28} {:<8} {:<11} {:>12}",
                        app.id,
                        status_cell(app, as_of, &config),
                        truncate(&app.details.company, 20),
                        truncate(&app.details.role, 26),
                        app.details.location_type,
                        app.applied_at().format("%Y-%m-%d"),
                        salary
                    );
                }
            }
        }

        Commands::Show { id } => {
            db.ensure_initialized()?;
            match db.get_application(id)? {
                Some(record) => {
                    let details = &record.details;
                    println!("Application #{}", record.id);
                    println!("Company: {}", details.company);
                    println!("Role: {} ({})", details.role, titles::normalize_role(&details.role));
                    match &details.location_detail {
                        Some(place) => println!("Location: {} ({})", details.location_type, place),
                        None => println!("Location: {}", details.location_type),
                    }
                    if let Some(salary) = &details.salary {
                        println!("Salary: {}", salary);
                    }
                    if let Some(link) = &details.link {
                        println!("URL: {}", link);
                    }
                    if let Some(date) = details.follow_up {
                        println!("Follow up: {}", date);
                    }
                    println!("Created: {}", record.created_at);
                    println!("Updated: {}", record.updated_at);

                    println!("\n--- Timeline ---");
                    for event in &record.events {
                        match &event.note {
                            Some(note) => println!("{}  {:<17} {}", event.at.format("%Y-%m-%d %H:%M"), event.status, note),
                            None => println!("{}  {}", event.at.format("%Y-%m-%d %H:%M"), event.status),
                        }
                    }
                    if !details.description.is_empty() {
                        println!("\n--- Description ---\n{}", details.description);
                    }
                    if !details.notes.is_empty() {
                        println!("\n--- Notes ---\n{}", details.notes);
                    }
                }
                None => {
                    println!("Application #{} not found.", id);
                }
            }
        }

        Commands::Status { id, status, note, at } => {
            db.ensure_initialized()?;
            let at = match at.as_deref() {
                Some(raw) => parse_timestamp(raw)?,
                None => Local::now().naive_local(),
            };
            db.append_status(id, status, at, note.as_deref())?;
            println!("Application #{} is now '{}'.", id, status);
        }

        Commands::Edit {
            id,
            company,
            role,
            location,
            location_detail,
            salary,
            link,
            description,
            notes,
        } => {
            db.ensure_initialized()?;
            let record = db
                .get_application(id)?
                .ok_or_else(|| anyhow!("Application #{} not found", id))?;
            let mut details = record.details;
            if let Some(company) = company {
                details.company = company;
            }
            if let Some(role) = role {
                details.role = role;
            }
            if let Some(location) = location {
                details.location_type = location;
            }
            if location_detail.is_some() {
                details.location_detail = location_detail;
            }
            if let Some(raw) = salary {
                details.salary = if raw.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(parse_salary(&raw).ok_or_else(|| anyhow!("Could not read salary '{}'", raw))?)
                };
            }
            if link.is_some() {
                details.link = link;
            }
            if let Some(description) = description {
                details.description = description;
            }
            if let Some(notes) = notes {
                details.notes = notes;
            }
            db.update_details(id, &details)?;
            println!("Updated application #{}.", id);
        }

        Commands::FollowUp { id, date, clear } => {
            db.ensure_initialized()?;
            let date = match (date, clear) {
                (_, true) => None,
                (Some(raw), false) => Some(parse_date(&raw)?),
                (None, false) => bail!("Give a follow-up date or --clear"),
            };
            db.set_follow_up(id, date)?;
            match date {
                Some(date) => println!("Follow up on #{} by {}.", id, date),
                None => println!("Cleared follow-up for #{}.", id),
            }
        }

        Commands::Delete { id } => {
            db.ensure_initialized()?;
            if db.delete_application(id)? {
                println!("Deleted application #{}.", id);
            } else {
                println!("Application #{} not found.", id);
            }
        }

        Commands::Stats { filter, by, window, json } => {
            db.ensure_initialized()?;
            let spec = filter.spec();
            let snapshot = load_snapshot(&db, &spec)?;
            let agg = Aggregator::new(spec.apply(&snapshot.applications));

            let window = window.unwrap_or(config.recent_window_days);
            let granularity = config.analytics.granularity;
            let report = StatsReport {
                as_of,
                filter: &spec,
                summary: agg.summary(window, as_of)?,
                breakdown_by: by,
                breakdown: agg.breakdown_by(by),
                granularity,
                series: agg.cumulative_series(granularity),
                skipped: &snapshot.skipped,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_stats(&report);
            }
        }

        Commands::Flow { filter, sankeymatic, json } => {
            db.ensure_initialized()?;
            let spec = filter.spec();
            let snapshot = load_snapshot(&db, &spec)?;
            let graph = FlowGraph::build(spec.apply(&snapshot.applications), as_of, &config.analytics)?;

            if sankeymatic {
                println!("{}", graph.to_sankeymatic());
            } else if json {
                let report = FlowReport {
                    as_of,
                    staleness_days: config.analytics.staleness_days,
                    labels: graph.node_labels(),
                    edges: &graph.edges,
                    links: graph.links(),
                    ghosted: graph.ghosted,
                    skipped: &snapshot.skipped,
                };
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if graph.edges.is_empty() {
                println!("No status changes to show yet.");
            } else {
                println!("{:<17} {:<17} {:>6}", "FROM", "TO", "COUNT");
                println!("{}", "-".repeat(42));
                for edge in &graph.edges {
                    println!("{:<17} {:<17} {:>6}", edge.from, edge.to, edge.weight);
                }
                if graph.ghosted > 0 {
                    println!(
                        "\n{} application(s) silent for more than {} days counted as ghosted.",
                        graph.ghosted, config.analytics.staleness_days
                    );
                }
            }
        }

        Commands::Followups => {
            db.ensure_initialized()?;
            let snapshot = load_snapshot(&db, &FilterSpec::default())?;
            let agg = Aggregator::new(&snapshot.applications);
            let due = agg.follow_ups_due(as_of.date(), &config.analytics);
            if due.is_empty() {
                println!("No follow-ups due.");
            } else {
                println!("{:<6} {:<11} {:<17} {:<22} {:<28}", "ID", "DUE", "STATUS", "COMPANY", "ROLE");
                println!("{}", "-".repeat(86));
                for app in due {
                    println!(
                        "{:<6} {:<11} {:<17} {:<22} {:<28}",
                        app.id,
                        app.details.follow_up.map(|d| d.to_string()).unwrap_or_default(),
                        app.current_status(),
                        truncate(&app.details.company, 20),
                        truncate(&app.details.role, 26)
                    );
                }
            }
        }

        Commands::Browse { filter } => {
            db.ensure_initialized()?;
            let spec = filter.spec();
            let snapshot = load_snapshot(&db, &spec)?;
            let apps: Vec<Application> = spec.apply(&snapshot.applications).into_iter().cloned().collect();
            tui::run_browse(&db, apps, as_of, config.analytics.clone())?;
        }
    }

    Ok(())
}

fn print_stats(report: &StatsReport) {
    let summary = &report.summary;
    println!("Total applications:        {}", summary.total);
    println!("Unique companies:          {}", summary.unique_companies);
    println!("Applied in last {:>3} days:  {}", summary.window_days, summary.recent);

    println!("\nBy {}:", report.breakdown_by);
    if report.breakdown.is_empty() {
        println!("  (none)");
    }
    for entry in &report.breakdown {
        println!("  {:<30} {:>5}", truncate(&entry.value, 28), entry.count);
    }

    println!("\nCumulative applications ({}):", report.granularity);
    if report.series.is_empty() {
        println!("  (none)");
    }
    let peak = report.series.last().map(|p| p.cumulative).unwrap_or(0).max(1);
    for point in &report.series {
        let bar = "#".repeat(point.cumulative * 40 / peak);
        println!("  {}  {:>5}  {}", point.bucket_start, point.cumulative, bar);
    }
}

fn status_cell(app: &Application, as_of: NaiveDateTime, config: &AppConfig) -> String {
    if sankey::is_ghosted(app, as_of, &config.analytics) {
        format!("{} (stale)", app.current_status())
    } else {
        app.current_status().to_string()
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))
}

/// Event time: a full timestamp, or a bare date meaning the start of that day.
fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(at) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(at);
        }
    }
    Ok(parse_date(raw)?.and_time(NaiveTime::MIN))
}

/// Reference time: a bare date covers the whole of that day.
fn parse_as_of(raw: &str) -> Result<NaiveDateTime> {
    if raw.trim().len() > 10 {
        return parse_timestamp(raw);
    }
    let date = parse_date(raw)?;
    date.and_hms_opt(23, 59, 59)
        .ok_or_else(|| anyhow!("Invalid --as-of date '{}'", raw))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max.saturating_sub(3)).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_of_date_covers_the_whole_day() {
        let as_of = parse_as_of("2025-03-01").expect("parses");
        assert_eq!(as_of.to_string(), "2025-03-01 23:59:59");
        let exact = parse_as_of("2025-03-01 08:30").expect("parses");
        assert_eq!(exact.to_string(), "2025-03-01 08:30:00");
    }

    #[test]
    fn event_dates_start_at_midnight() {
        assert_eq!(parse_timestamp("2025-03-01").expect("parses").to_string(), "2025-03-01 00:00:00");
        assert!(parse_timestamp("March 1st").is_err());
    }

    #[test]
    fn staleness_flag_must_be_positive() {
        let defaults = AppConfig::from_lookup(|_| None).expect("defaults load");

        let cli = Cli::try_parse_from(["apptrack", "--staleness-days", "0", "list"]).expect("valid arguments");
        let mut config = defaults.clone();
        assert!(apply_overrides(&mut config, &cli).is_err());

        let cli = Cli::try_parse_from(["apptrack", "--staleness-days=-5", "list"]).expect("valid arguments");
        let mut config = defaults.clone();
        assert!(apply_overrides(&mut config, &cli).is_err());

        let cli = Cli::try_parse_from(["apptrack", "--staleness-days", "14", "list"]).expect("valid arguments");
        let mut config = defaults;
        apply_overrides(&mut config, &cli).expect("positive staleness accepted");
        assert_eq!(config.analytics.staleness_days, 14);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("Zürich Versicherungs-Gesellschaft", 10), "Zürich ...");
        assert_eq!(truncate("Acme", 10), "Acme");
    }

    #[test]
    fn cli_parses_filters_and_globals() {
        let cli = Cli::try_parse_from([
            "apptrack",
            "--as-of",
            "2025-05-01",
            "--granularity",
            "week",
            "stats",
            "--status",
            "recruiter-screen",
            "--location",
            "remote",
            "--by",
            "company",
        ])
        .expect("valid arguments");
        assert_eq!(cli.granularity, Some(Granularity::Week));
        match cli.command {
            Commands::Stats { filter, by, .. } => {
                assert_eq!(filter.status, Some(Status::RecruiterScreen));
                assert_eq!(filter.location, Some(LocationType::Remote));
                assert_eq!(by, Attribute::Company);
            }
            _ => panic!("expected stats command"),
        }
    }
}
