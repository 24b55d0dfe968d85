use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;
use tracing::warn;

use crate::config::AnalyticsConfig;
use crate::db::Database;
use crate::models::{Application, Status};
use crate::sankey::is_ghosted;
use crate::timeline::Timeline;

struct AppState {
    apps: Vec<Application>,
    selected: usize,
    scroll_offset: u16,
    message: Option<String>,
    as_of: NaiveDateTime,
    config: AnalyticsConfig,
}

impl AppState {
    fn new(apps: Vec<Application>, as_of: NaiveDateTime, config: AnalyticsConfig) -> Self {
        Self {
            apps,
            selected: 0,
            scroll_offset: 0,
            message: None,
            as_of,
            config,
        }
    }

    fn current_app(&self) -> Option<&Application> {
        self.apps.get(self.selected)
    }

    fn next(&mut self) {
        if !self.apps.is_empty() && self.selected < self.apps.len() - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }

    fn is_stale(&self, app: &Application) -> bool {
        is_ghosted(app, self.as_of, &self.config)
    }

    /// Logs `status` for the selected application and reloads its timeline.
    fn advance(&mut self, db: &Database, status: Status) {
        let Some(id) = self.current_app().map(|app| app.id) else { return };
        let now = Local::now().naive_local();

        self.message = match db.append_status(id, status, now, None) {
            Ok(()) => match reload(db, id) {
                Ok(Some(timeline)) => {
                    if let Some(app) = self.apps.get_mut(self.selected) {
                        app.timeline = timeline;
                    }
                    Some(format!("#{} -> {}", id, status))
                }
                Ok(None) => Some(format!("#{} disappeared from storage", id)),
                Err(e) => Some(format!("reload failed: {}", e)),
            },
            Err(e) => {
                warn!(application_id = id, error = %e, "status change rejected");
                Some(e.to_string())
            }
        };
    }
}

fn reload(db: &Database, id: i64) -> Result<Option<Timeline>> {
    match db.get_application(id)? {
        Some(record) => Ok(Some(Timeline::new(record.events)?)),
        None => Ok(None),
    }
}

pub fn run_browse(
    db: &Database,
    apps: Vec<Application>,
    as_of: NaiveDateTime,
    config: AnalyticsConfig,
) -> Result<()> {
    if apps.is_empty() {
        println!("No applications found.");
        return Ok(());
    }

    let mut state = AppState::new(apps, as_of, config);

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, db);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    db: &Database,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        terminal.draw(|frame| draw(frame, state, &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let prev_selected = state.selected;
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Char('s') => state.advance(db, Status::RecruiterScreen),
                KeyCode::Char('i') => state.advance(db, Status::Interview),
                KeyCode::Char('o') => state.advance(db, Status::Offer),
                KeyCode::Char('x') => state.advance(db, Status::Rejected),
                KeyCode::Char('w') => state.advance(db, Status::Withdrawn),
                _ => {}
            }
            if state.selected != prev_selected {
                list_state.select(Some(state.selected));
                state.message = None;
            }
        }
    }
    Ok(())
}

fn status_icon(status: Status) -> &'static str {
    match status {
        Status::Applied => " ",
        Status::RecruiterScreen => "*",
        Status::Interview => "+",
        Status::Offer => "$",
        Status::Rejected => "x",
        Status::Withdrawn => "-",
        Status::Ghosted => "?",
    }
}

fn status_style(status: Status) -> Style {
    match status {
        Status::Applied => Style::default().fg(Color::Cyan),
        Status::RecruiterScreen => Style::default().fg(Color::Yellow),
        Status::Interview => Style::default().fg(Color::Magenta),
        Status::Offer => Style::default().fg(Color::Green),
        Status::Rejected => Style::default().fg(Color::Red),
        Status::Withdrawn | Status::Ghosted => Style::default().fg(Color::DarkGray),
    }
}

fn draw(frame: &mut Frame, state: &AppState, list_state: &mut ListState) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(frame.area());

    // Left panel: application list
    let items: Vec<ListItem> = state
        .apps
        .iter()
        .map(|app| {
            let icon = if state.is_stale(app) { "~" } else { status_icon(app.current_status()) };
            let role = if app.details.role.chars().count() > 30 {
                format!("{}...", app.details.role.chars().take(27).collect::<String>())
            } else {
                app.details.role.clone()
            };
            ListItem::new(format!("{} #{:<4} {} | {}", icon, app.id, role, app.details.company))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Applications ({}) ", state.apps.len())),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: application detail
    let detail = build_detail(state);
    let detail_widget = Paragraph::new(detail)
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));

    frame.render_widget(detail_widget, chunks[1]);

    // Footer help
    let help_area = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(frame.area());

    let footer = match &state.message {
        Some(msg) => format!(" {}", msg),
        None => " j/k:navigate  J/K:scroll  s:screen i:interview o:offer x:rejected w:withdrawn  q:quit"
            .to_string(),
    };
    let help = Paragraph::new(footer).style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, help_area[1]);
}

fn build_detail<'a>(state: &'a AppState) -> Text<'a> {
    let Some(app) = state.current_app() else {
        return Text::raw("No application selected");
    };
    let details = &app.details;

    let mut lines: Vec<Line> = Vec::new();

    // Header
    lines.push(Line::from(Span::styled(
        &details.role,
        Style::default().add_modifier(Modifier::BOLD),
    )));
    lines.push(Line::from(format!("at {}", details.company)));

    let current = app.current_status();
    let mut status_line = vec![Span::styled(format!("Status: {}", current), status_style(current))];
    if state.is_stale(app) {
        status_line.push(Span::styled(
            format!("  (no activity for {}+ days)", state.config.staleness_days),
            Style::default().fg(Color::DarkGray),
        ));
    }
    lines.push(Line::from(status_line));

    match &details.location_detail {
        Some(place) => lines.push(Line::from(format!("Location: {} ({})", details.location_type, place))),
        None => lines.push(Line::from(format!("Location: {}", details.location_type))),
    }
    if let Some(salary) = &details.salary {
        lines.push(Line::from(format!("Salary: {}", salary)));
    }
    if let Some(link) = &details.link {
        lines.push(Line::from(format!("URL: {}", link)));
    }
    if let Some(date) = details.follow_up {
        lines.push(Line::from(format!("Follow up: {}", date)));
    }

    lines.push(Line::from(""));

    // Timeline
    lines.push(Line::from(Span::styled(
        "TIMELINE",
        Style::default().add_modifier(Modifier::BOLD),
    )));
    for event in app.timeline.events() {
        let mut spans = vec![
            Span::styled(
                format!("  {}  ", event.at.format("%Y-%m-%d %H:%M")),
                Style::default().fg(Color::DarkGray),
            ),
            Span::styled(event.status.label(), status_style(event.status)),
        ];
        if let Some(note) = &event.note {
            spans.push(Span::raw(format!(" - {}", note)));
        }
        lines.push(Line::from(spans));
    }
    lines.push(Line::from(""));

    for (heading, body) in [("DESCRIPTION", &details.description), ("NOTES", &details.notes)] {
        if body.trim().is_empty() {
            continue;
        }
        lines.push(Line::from(Span::styled(
            heading,
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(body, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
        lines.push(Line::from(""));
    }

    Text::from(lines)
}
