use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use hornetwatch_core::{HourlyBucket, Pipeline, Species, StatsSnapshot};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{BarChart, Block, Borders, Paragraph};
use ratatui::Terminal;
use tracing::debug;

use crate::source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    Quit,
    TogglePause,
    Refresh,
    Ignore,
}

fn key_action(key: KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::Ignore;
    }
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => KeyAction::Quit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
        KeyCode::Char('p') | KeyCode::Char(' ') => KeyAction::TogglePause,
        KeyCode::Char('r') => KeyAction::Refresh,
        _ => KeyAction::Ignore,
    }
}

struct ViewerState {
    latest: Option<StatsSnapshot>,
    input_status: String,
    paused: bool,
}

impl ViewerState {
    fn new() -> Self {
        Self {
            latest: None,
            input_status: "reading".to_string(),
            paused: false,
        }
    }
}

/// Raw mode and the alternate screen, undone on drop even if drawing fails.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

pub async fn run_viewer(pipeline: Arc<Pipeline>, input: String, interval: Duration) -> Result<()> {
    let mut guard = TerminalGuard::enter()?;
    let mut state = ViewerState::new();
    let mut next_refresh = Instant::now();
    let mut ingest = Some(source::spawn_ingest(input, Arc::clone(&pipeline)));

    let outcome = async {
        loop {
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    match key_action(key) {
                        KeyAction::Quit => break,
                        KeyAction::TogglePause => state.paused = !state.paused,
                        KeyAction::Refresh => state.latest = Some(pipeline.read_snapshot()),
                        KeyAction::Ignore => {}
                    }
                }
            }

            if ingest.as_ref().is_some_and(|h| h.is_finished()) {
                if let Some(handle) = ingest.take() {
                    state.input_status = match handle.await {
                        Ok(Ok(summary)) => format!(
                            "done: {} accepted, {} rejected, {} malformed",
                            summary.accepted, summary.rejected, summary.malformed
                        ),
                        Ok(Err(err)) => format!("error: {err}"),
                        Err(err) => format!("ingest task failed: {err}"),
                    };
                    next_refresh = Instant::now();
                }
            }

            if !state.paused && Instant::now() >= next_refresh {
                state.latest = Some(pipeline.read_snapshot());
                next_refresh = Instant::now() + interval;
            }

            guard.terminal.draw(|frame| draw_ui(frame.size(), frame, &state))?;
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Some(handle) = ingest {
        debug!("viewer closed before input was exhausted");
        handle.abort();
    }

    outcome
}

fn draw_ui(area: Rect, frame: &mut ratatui::Frame<'_>, state: &ViewerState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5),
            Constraint::Percentage(50),
            Constraint::Min(0),
        ])
        .split(area);

    frame.render_widget(render_header(state), rows[0]);

    let Some(snapshot) = &state.latest else {
        return;
    };

    let charts = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);
    render_hourly_chart(frame, charts[0], &snapshot.hourly_buckets, Species::AsianHornet);
    render_hourly_chart(frame, charts[1], &snapshot.hourly_buckets, Species::EuropeanHornet);

    frame.render_widget(render_log(snapshot), rows[2]);
}

fn render_header(state: &ViewerState) -> Paragraph<'static> {
    let mut lines = Vec::new();
    if let Some(snapshot) = &state.latest {
        let totals = format!(
            "total={} velutina={} crabro={} rate={:.1}/h avg_conf={} rejected={}",
            snapshot.totals.total,
            snapshot.totals.velutina,
            snapshot.totals.crabro,
            snapshot.detection_rate,
            snapshot
                .confidence_avg
                .map(|c| format!("{:.1}%", c * 100.0))
                .unwrap_or_else(|| "n/a".to_string()),
            snapshot.rejected,
        );
        let alerts = &snapshot.alert_stats;
        let delivery = snapshot
            .delivery
            .as_ref()
            .map(|d| format!("delivered={} failed={} dropped={}", d.delivered, d.failed, d.dropped))
            .unwrap_or_else(|| "alerts disabled".to_string());
        lines.push(Line::from(vec![
            Span::styled("Hornet Watch  ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::raw(totals),
        ]));
        lines.push(Line::from(format!(
            "alerts sent={} cost={:.2} suppressed(invalid={} cooldown={})  {delivery}",
            alerts.sent, alerts.cost, alerts.suppressed_invalid, alerts.suppressed_cooldown
        )));
        lines.push(Line::from(format!(
            "frames {}/{}  input {}  {}",
            snapshot.frames.cached,
            snapshot.frames.capacity,
            state.input_status,
            if state.paused { "[paused] 'p' resume, 'q' quit" } else { "'p' pause, 'r' refresh, 'q' quit" }
        )));
    } else {
        lines.push(Line::from("Waiting for the first snapshot..."));
    }

    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"))
}

fn render_hourly_chart(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    buckets: &[HourlyBucket],
    species: Species,
) {
    let labels: Vec<String> = buckets.iter().map(|b| format!("{:02}", b.hour_of_day)).collect();
    let data: Vec<(&str, u64)> = buckets
        .iter()
        .zip(labels.iter())
        .map(|(bucket, label)| {
            let count = match species {
                Species::AsianHornet => bucket.velutina_count,
                Species::EuropeanHornet => bucket.crabro_count,
            };
            (label.as_str(), count)
        })
        .collect();

    let color = match species {
        Species::AsianHornet => Color::Red,
        Species::EuropeanHornet => Color::Yellow,
    };
    let title = format!("{} / hour (last 24h)", species.label());

    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .bar_width(2)
        .bar_gap(1)
        .bar_style(Style::default().fg(color))
        .value_style(Style::default().fg(Color::Black).bg(color))
        .data(data.as_slice());

    frame.render_widget(chart, area);
}

fn render_log(snapshot: &StatsSnapshot) -> Paragraph<'static> {
    let lines: Vec<Line> = if snapshot.recent_log.is_empty() {
        vec![Line::from("No detections yet")]
    } else {
        snapshot
            .recent_log
            .iter()
            .map(|entry| {
                let color = match entry.species {
                    Species::AsianHornet => Color::Red,
                    Species::EuropeanHornet => Color::Yellow,
                };
                let frame = match (&entry.frame_id, entry.frame_cached) {
                    (Some(id), true) => format!("frame={id}"),
                    (Some(id), false) => format!("frame={id} (evicted)"),
                    (None, _) => String::new(),
                };
                Line::from(vec![
                    Span::raw(format!("{}  ", entry.timestamp.format("%Y-%m-%d %H:%M:%S"))),
                    Span::styled(format!("{:<16}", entry.species.label()), Style::default().fg(color)),
                    Span::raw(format!("{:>6.1}%  {frame}", entry.confidence * 100.0)),
                ])
            })
            .collect()
    };

    Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Recent detections"))
}
