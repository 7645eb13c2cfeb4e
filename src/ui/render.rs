//! Rendering of controller state and cache snapshots

use crate::cache::{CacheEntry, CacheSnapshot};
use crate::core::PipelineStatus;
use crate::ui::controller::{Controller, PendingTrigger, View};
use crate::ui::keymap;
use chrono::{DateTime, Utc};
use ratatui::backend::TestBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use ratatui::{Frame, Terminal};

/// Draw one frame
pub fn render(frame: &mut Frame, controller: &Controller, snapshot: &CacheSnapshot, now: DateTime<Utc>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    draw_header(frame, chunks[0], snapshot);

    match controller.base_view() {
        View::Detail { pipeline } => draw_detail(frame, chunks[1], controller, snapshot, pipeline, now),
        View::ConfirmTrigger { pipeline } => {
            draw_detail(frame, chunks[1], controller, snapshot, pipeline, now);
            draw_confirm(frame, chunks[1], pipeline);
        }
        _ => draw_list(frame, chunks[1], controller, snapshot, now),
    }

    if let View::Error { message } = controller.view() {
        draw_error(frame, chunks[1], message);
    }

    draw_footer(frame, chunks[2], controller);
}

/// Render one frame into a plain string, one line per terminal row
pub fn render_to_string(
    controller: &Controller,
    snapshot: &CacheSnapshot,
    now: DateTime<Utc>,
    width: u16,
    height: u16,
) -> std::io::Result<String> {
    let mut terminal = Terminal::new(TestBackend::new(width, height))?;
    terminal.draw(|frame| render(frame, controller, snapshot, now))?;

    let buffer = terminal.backend().buffer();
    let lines: Vec<String> = buffer
        .content
        .chunks(usize::from(buffer.area.width.max(1)))
        .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
        .map(|line| line.trim_end().to_string())
        .collect();
    Ok(lines.join("\n"))
}

pub fn status_color(status: PipelineStatus) -> Color {
    match status {
        PipelineStatus::Succeeded => Color::Green,
        PipelineStatus::Failed => Color::Red,
        PipelineStatus::InProgress => Color::Yellow,
        PipelineStatus::Stopped => Color::Gray,
        PipelineStatus::Unknown => Color::DarkGray,
    }
}

/// Compact age such as `42s`, `3m` or `2h`
pub fn format_age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - since).num_seconds().max(0);
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m", secs / 60),
        _ => format!("{}h", secs / 3600),
    }
}

fn status_span(status: PipelineStatus) -> Span<'static> {
    Span::styled(status.label(), Style::default().fg(status_color(status)))
}

fn draw_header(frame: &mut Frame, area: Rect, snapshot: &CacheSnapshot) {
    let stale = snapshot.entries().iter().filter(|e| e.is_stale()).count();
    let mut spans = vec![
        Span::styled(
            " AWS CodePipeline ",
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!("{} pipelines", snapshot.len())),
    ];
    if stale > 0 {
        spans.push(Span::styled(
            format!("  {} stale", stale),
            Style::default().fg(Color::Yellow),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_footer(frame: &mut Frame, area: Rect, controller: &Controller) {
    let mut spans = vec![Span::styled(
        format!(" {}", keymap::hints(controller.view())),
        Style::default().fg(Color::DarkGray),
    )];
    if let Some(status) = controller.status() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(status.to_string(), Style::default().fg(Color::Cyan)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_list(
    frame: &mut Frame,
    area: Rect,
    controller: &Controller,
    snapshot: &CacheSnapshot,
    now: DateTime<Utc>,
) {
    let block = Block::default().borders(Borders::ALL).title(" Pipelines ");

    if snapshot.is_empty() {
        let empty = Paragraph::new("Loading pipelines...")
            .style(Style::default().fg(Color::DarkGray))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let rows = snapshot.entries().iter().map(|entry| {
        let status = match &entry.pipeline {
            Some(_) => status_span(entry.status()),
            None => Span::styled("loading", Style::default().fg(Color::DarkGray)),
        };
        let age = entry
            .fetched_at
            .map(|at| format_age(at, now))
            .unwrap_or_else(|| "-".to_string());
        Row::new(vec![
            Cell::from(entry.name.clone()),
            Cell::from(status),
            Cell::from(age),
            Cell::from(stale_marker(entry)),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(45),
            Constraint::Length(12),
            Constraint::Length(8),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["NAME", "STATUS", "AGE", ""])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(block)
    .row_highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .highlight_symbol("> ");

    let mut state = TableState::default().with_selected(Some(controller.selected().min(snapshot.len() - 1)));
    frame.render_stateful_widget(table, area, &mut state);
}

fn stale_marker(entry: &CacheEntry) -> Span<'static> {
    match &entry.error {
        Some(error) => Span::styled(
            format!("stale ({:?})", error.kind),
            Style::default().fg(Color::Yellow),
        ),
        None => Span::raw(""),
    }
}

fn draw_detail(
    frame: &mut Frame,
    area: Rect,
    controller: &Controller,
    snapshot: &CacheSnapshot,
    pipeline: &str,
    now: DateTime<Utc>,
) {
    let Some(entry) = snapshot.get(pipeline) else {
        let gone = Paragraph::new(format!("{} is no longer listed", pipeline))
            .block(Block::default().borders(Borders::ALL).title(format!(" {} ", pipeline)));
        frame.render_widget(gone, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Percentage(45),
            Constraint::Min(3),
        ])
        .split(area);

    draw_summary(frame, chunks[0], controller, entry, now);
    draw_stages(frame, chunks[1], entry);
    draw_executions(frame, chunks[2], entry);
}

fn draw_summary(
    frame: &mut Frame,
    area: Rect,
    controller: &Controller,
    entry: &CacheEntry,
    now: DateTime<Utc>,
) {
    let refreshed = entry
        .fetched_at
        .map(|at| format!("refreshed {} ago", format_age(at, now)))
        .unwrap_or_else(|| "not refreshed yet".to_string());

    let mut lines = vec![Line::from(vec![
        Span::raw("Status: "),
        status_span(entry.status()),
        Span::styled(format!("  {}", refreshed), Style::default().fg(Color::DarkGray)),
    ])];

    let mut second = Vec::new();
    if let Some(error) = &entry.error {
        second.push(Span::styled(
            format!("stale: {} ", error.message),
            Style::default().fg(Color::Yellow),
        ));
    }
    match controller.pending_trigger(&entry.name) {
        Some(PendingTrigger::InFlight) => second.push(Span::styled(
            "Trigger in flight...",
            Style::default().fg(Color::Cyan),
        )),
        Some(PendingTrigger::Started(id)) => second.push(Span::styled(
            format!("Pending execution {}", id),
            Style::default().fg(Color::Cyan),
        )),
        None => {}
    }
    if !second.is_empty() {
        lines.push(Line::from(second));
    }

    let summary = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title(format!(" {} ", entry.name)));
    frame.render_widget(summary, area);
}

fn draw_stages(frame: &mut Frame, area: Rect, entry: &CacheEntry) {
    let stages = entry
        .pipeline
        .as_ref()
        .map(|p| p.stages.as_slice())
        .unwrap_or_default();

    let rows = stages.iter().map(|stage| {
        Row::new(vec![
            Cell::from(stage.name.clone()),
            Cell::from(status_span(stage.status)),
            Cell::from(stage.current_action.clone().unwrap_or_default()),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Length(12),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["STAGE", "STATUS", "ACTION"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title(" Stages "));
    frame.render_widget(table, area);
}

fn draw_executions(frame: &mut Frame, area: Rect, entry: &CacheEntry) {
    let rows = entry.executions.iter().map(|execution| {
        let started = execution
            .started_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        Row::new(vec![
            Cell::from(execution.id.clone()),
            Cell::from(status_span(execution.status)),
            Cell::from(execution.trigger.label()),
            Cell::from(started),
        ])
    });

    let table = Table::new(
        rows,
        [
            Constraint::Min(20),
            Constraint::Length(12),
            Constraint::Length(10),
            Constraint::Length(20),
        ],
    )
    .header(
        Row::new(vec!["EXECUTION", "STATUS", "TRIGGER", "STARTED"])
            .style(Style::default().add_modifier(Modifier::BOLD)),
    )
    .block(Block::default().borders(Borders::ALL).title(" Recent executions "));
    frame.render_widget(table, area);
}

fn draw_confirm(frame: &mut Frame, area: Rect, pipeline: &str) {
    let popup = centered(area, 50, 5);
    let prompt = Paragraph::new(vec![
        Line::from(format!("Start a new execution of {}?", pipeline)),
        Line::from(Span::styled("y/Enter confirm, n/Esc cancel", Style::default().fg(Color::DarkGray))),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Confirm trigger ")
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(Clear, popup);
    frame.render_widget(prompt, popup);
}

fn draw_error(frame: &mut Frame, area: Rect, message: &str) {
    let popup = centered(area, 70, 6);
    let banner = Paragraph::new(message.to_string())
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Red))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Error ")
                .border_style(Style::default().fg(Color::Red)),
        );
    frame.render_widget(Clear, popup);
    frame.render_widget(banner, popup);
}

/// Rectangle of `width` percent and `height` rows centred in `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = (u32::from(area.width) * u32::from(width.min(100)) / 100) as u16;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
