use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::filter::{details_contain, search_needle};
use crate::models::{ApplicationDetails, ApplicationRecord, SalaryRange, Status, StatusEvent};

const APP_COLUMNS: &str = "id, company, role, location_type, location_detail, salary_min, salary_max,
                           link_url, description, notes, follow_up_date, created_at, updated_at";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        debug!(path = %path.display(), "database opened");
        Ok(Self { conn, path })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "apptrack") {
            Ok(proj_dirs.data_dir().join("apptrack.db"))
        } else {
            Ok(PathBuf::from("apptrack.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company TEXT NOT NULL,
                role TEXT NOT NULL,
                location_type TEXT NOT NULL CHECK (location_type IN ('Remote', 'Hybrid', 'Onsite')),
                location_detail TEXT,
                salary_min INTEGER,
                salary_max INTEGER,
                link_url TEXT,
                description TEXT NOT NULL DEFAULT '',
                notes TEXT NOT NULL DEFAULT '',
                follow_up_date TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS status_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                note TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_events_application ON status_events(application_id);
            CREATE INDEX IF NOT EXISTS idx_applications_company ON applications(company);
            "#,
        )?;
        info!(path = %self.path.display(), "schema ready");
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='applications'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!("Database not initialized. Run 'apptrack init' first."));
        }
        Ok(())
    }

    // --- Application operations ---

    /// Inserts the application together with its initial status event.
    pub fn create_application(
        &self,
        details: &ApplicationDetails,
        initial: Status,
        at: NaiveDateTime,
        note: Option<&str>,
    ) -> Result<i64> {
        reject_synthetic(initial)?;
        if details.company.trim().is_empty() || details.role.trim().is_empty() {
            bail!("Company and role are required");
        }
        let salary = details.salary.unwrap_or_default();

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO applications (company, role, location_type, location_detail, salary_min,
                                       salary_max, link_url, description, notes, follow_up_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                details.company.trim(),
                details.role.trim(),
                details.location_type.label(),
                details.location_detail,
                salary.min,
                salary.max,
                details.link,
                details.description,
                details.notes,
                details.follow_up,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO status_events (application_id, status, occurred_at, note) VALUES (?1, ?2, ?3, ?4)",
            params![id, initial.label(), at, note],
        )?;
        tx.commit()?;

        info!(application_id = id, status = %initial, "application created");
        Ok(id)
    }

    pub fn get_application(&self, id: i64) -> Result<Option<ApplicationRecord>> {
        let sql = format!("SELECT {} FROM applications WHERE id = ?1", APP_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, [id], Self::row_to_record)
            .optional()?;

        match row {
            Some(mut record) => {
                record.events = self.events_for(id)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Every stored application with its events in insertion order.
    pub fn list_records(&self) -> Result<Vec<ApplicationRecord>> {
        let sql = format!("SELECT {} FROM applications ORDER BY id", APP_COLUMNS);
        self.records_where(&sql, [])
    }

    /// Storage-side pre-filter: case-insensitive substring of company, role
    /// or notes. Matching runs in Rust since SQLite's `lower()` only folds
    /// ASCII.
    pub fn search(&self, text: &str) -> Result<Vec<ApplicationRecord>> {
        let records = self.list_records()?;
        let Some(needle) = search_needle(text) else {
            return Ok(records);
        };
        Ok(records
            .into_iter()
            .filter(|record| details_contain(&record.details, &needle))
            .collect())
    }

    /// Logs a status change. Events are append-only and may not be backdated
    /// before the application's latest event.
    pub fn append_status(&self, id: i64, status: Status, at: NaiveDateTime, note: Option<&str>) -> Result<()> {
        reject_synthetic(status)?;

        let last: Option<NaiveDateTime> = self
            .conn
            .query_row(
                "SELECT MAX(occurred_at) FROM status_events WHERE application_id = ?1",
                [id],
                |row| row.get(0),
            )
            .with_context(|| format!("Failed to read timeline of application #{}", id))?;
        let Some(last) = last else {
            bail!("Application #{} not found", id);
        };
        if at < last {
            bail!(
                "Status change at {} would precede the latest event at {}",
                at.format("%Y-%m-%d %H:%M"),
                last.format("%Y-%m-%d %H:%M")
            );
        }

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO status_events (application_id, status, occurred_at, note) VALUES (?1, ?2, ?3, ?4)",
            params![id, status.label(), at, note],
        )?;
        tx.execute(
            "UPDATE applications SET updated_at = datetime('now') WHERE id = ?1",
            [id],
        )?;
        tx.commit()?;

        info!(application_id = id, %status, "status appended");
        Ok(())
    }

    pub fn update_details(&self, id: i64, details: &ApplicationDetails) -> Result<()> {
        let salary = details.salary.unwrap_or_default();
        let changed = self.conn.execute(
            "UPDATE applications
             SET company = ?1, role = ?2, location_type = ?3, location_detail = ?4,
                 salary_min = ?5, salary_max = ?6, link_url = ?7, description = ?8,
                 notes = ?9, follow_up_date = ?10, updated_at = datetime('now')
             WHERE id = ?11",
            params![
                details.company.trim(),
                details.role.trim(),
                details.location_type.label(),
                details.location_detail,
                salary.min,
                salary.max,
                details.link,
                details.description,
                details.notes,
                details.follow_up,
                id,
            ],
        )?;
        if changed == 0 {
            bail!("Application #{} not found", id);
        }
        Ok(())
    }

    pub fn set_follow_up(&self, id: i64, date: Option<NaiveDate>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE applications SET follow_up_date = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![date, id],
        )?;
        if changed == 0 {
            bail!("Application #{} not found", id);
        }
        Ok(())
    }

    /// Returns whether anything was deleted.
    pub fn delete_application(&self, id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM status_events WHERE application_id = ?1", [id])?;
        let removed = tx.execute("DELETE FROM applications WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn records_where<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<ApplicationRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut records = stmt
            .query_map(params, Self::row_to_record)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list applications")?;

        let mut events = self.all_events()?;
        for record in &mut records {
            record.events = events.remove(&record.id).unwrap_or_default();
        }
        Ok(records)
    }

    fn events_for(&self, id: i64) -> Result<Vec<StatusEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT status, occurred_at, note FROM status_events WHERE application_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([id], |row| {
            Ok(StatusEvent {
                status: parse_column(row, 0)?,
                at: row.get(1)?,
                note: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read timeline of application #{}", id))
    }

    fn all_events(&self) -> Result<HashMap<i64, Vec<StatusEvent>>> {
        let mut stmt = self.conn.prepare(
            "SELECT application_id, status, occurred_at, note FROM status_events ORDER BY application_id, id",
        )?;
        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let event = StatusEvent {
                status: parse_column(row, 1)?,
                at: row.get(2)?,
                note: row.get(3)?,
            };
            Ok((id, event))
        })?;

        let mut grouped: HashMap<i64, Vec<StatusEvent>> = HashMap::new();
        for row in rows {
            let (id, event) = row.context("Failed to read status events")?;
            grouped.entry(id).or_default().push(event);
        }
        Ok(grouped)
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ApplicationRecord> {
        let salary_min: Option<i64> = row.get(5)?;
        let salary_max: Option<i64> = row.get(6)?;
        let salary = SalaryRange::new(salary_min, salary_max);

        Ok(ApplicationRecord {
            id: row.get(0)?,
            details: ApplicationDetails {
                company: row.get(1)?,
                role: row.get(2)?,
                location_type: parse_column(row, 3)?,
                location_detail: row.get(4)?,
                salary: (!salary.is_empty()).then_some(salary),
                link: row.get(7)?,
                description: row.get(8)?,
                notes: row.get(9)?,
                follow_up: row.get(10)?,
            },
            events: Vec::new(),
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

fn reject_synthetic(status: Status) -> Result<()> {
    if status.is_synthetic() {
        bail!("'{}' is inferred from inactivity and cannot be set directly", status);
    }
    Ok(())
}

fn parse_column<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|msg| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
    })
}

// --- Helper functions for parsing user input ---

static SALARY_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(k)?").expect("static pattern"));

/// Parses salary text like `120k-150k`, `$95,000`, `150k+` or `up to 90k`.
/// Bare numbers under 1000 are read as thousands.
pub fn parse_salary(input: &str) -> Option<SalaryRange> {
    let lower = input.trim().to_lowercase();
    let values: Vec<i64> = SALARY_NUMBER
        .captures_iter(&lower)
        .filter_map(|caps| {
            let digits: String = caps[1].chars().filter(|c| *c != ',').collect();
            let num = digits.parse::<f64>().ok()?;
            let value = if caps.get(2).is_some() || num < 1000.0 {
                num * 1000.0
            } else {
                num
            };
            Some(value.round() as i64)
        })
        .take(2)
        .collect();

    match values.as_slice() {
        [] => None,
        [only] if lower.starts_with('<') || lower.starts_with("up to") => {
            Some(SalaryRange::new(None, Some(*only)))
        }
        [only] => Some(SalaryRange::new(Some(*only), None)),
        [min, max, ..] => Some(SalaryRange::new(Some(*min), Some(*max))),
    }
}
