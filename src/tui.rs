use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};

use crate::app::{Progress, ProgressEvent, ProgressSink, ProgressSinkKind};
use crate::error::PdbbindError;

const EVENTS_MAX: usize = 8;
const LOGS_MAX: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Resolve,
    Download,
    Extract,
    Verify,
    Done,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Resolve => "Resolve",
            Phase::Download => "Download",
            Phase::Extract => "Extract",
            Phase::Verify => "Verify",
            Phase::Done => "Done",
        }
    }
}

#[derive(Debug)]
struct AppState {
    status: String,
    phase: Phase,
    progress: Option<Progress>,
    last_elapsed: Option<Duration>,
    events: VecDeque<String>,
    logs: VecDeque<String>,
    started: Instant,
}

pub struct Tui {
    kind: ProgressSinkKind,
    title: String,
    state: Arc<Mutex<AppState>>,
}

struct TuiProgress {
    state: Arc<Mutex<AppState>>,
}

impl ProgressSink for TuiProgress {
    fn event(&self, event: ProgressEvent) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if let Some(progress) = event.progress {
            state.progress = Some(progress);
            return;
        }
        let message = event.message.trim().to_string();
        if let Some((phase, payload)) = parse_phase(&message) {
            state.phase = phase;
            state.status = payload.to_string();
            state.progress = None;
        }
        if event.elapsed.is_some() {
            state.last_elapsed = event.elapsed;
        }
        let elapsed = state.started.elapsed().as_secs();
        push_bounded(&mut state.events, message.clone(), EVENTS_MAX);
        push_bounded(&mut state.logs, format!("[{elapsed:>5}s] {message}"), LOGS_MAX);
    }
}

impl Tui {
    pub fn new(kind: ProgressSinkKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.into(),
            state: Arc::new(Mutex::new(AppState {
                status: "starting".to_string(),
                phase: Phase::Resolve,
                progress: None,
                last_elapsed: None,
                events: VecDeque::new(),
                logs: VecDeque::new(),
                started: Instant::now(),
            })),
        }
    }

    /// Run `f` on a worker thread while drawing its progress. `q` or Esc
    /// leaves the dashboard; the worker is not cancelled.
    pub fn run<F, R>(&mut self, f: F) -> miette::Result<R>
    where
        F: FnOnce(&dyn ProgressSink) -> Result<R, PdbbindError> + Send + 'static,
        R: Send + 'static,
    {
        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let sink = TuiProgress {
            state: self.state.clone(),
        };
        let handle = thread::spawn(move || tx.send(f(&sink)));

        let mut tick = 0usize;
        let outcome = loop {
            if let Ok(state) = self.state.lock() {
                terminal
                    .draw(|frame| draw_ui(frame, self, &state, tick))
                    .into_diagnostic()?;
            }

            if let Ok(result) = rx.try_recv() {
                handle.join().ok();
                break Some(result);
            }

            if event::poll(Duration::from_millis(120)).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if key.kind == KeyEventKind::Press
                        && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                    {
                        break None;
                    }
                }
            }
            tick = tick.wrapping_add(1);
        };

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;

        match outcome {
            Some(result) => result.map_err(miette::Report::new),
            None => Err(miette::Report::msg("aborted")),
        }
    }

    pub fn print_log(&self) {
        if let Ok(state) = self.state.lock() {
            for line in &state.logs {
                eprintln!("{line}");
            }
        }
    }
}

fn draw_ui(frame: &mut ratatui::Frame, tui: &Tui, state: &AppState, tick: usize) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Min(3),
        ])
        .split(frame.area());

    frame.render_widget(draw_header(tui, tick), chunks[0]);
    frame.render_widget(draw_status(state), chunks[1]);
    frame.render_widget(draw_gauge(state), chunks[2]);
    frame.render_widget(draw_events(state), chunks[3]);
}

fn draw_header(tui: &Tui, tick: usize) -> Paragraph<'static> {
    let hb = if tick % 2 == 0 { "*" } else { " " };
    let op_label = match tui.kind {
        ProgressSinkKind::Prepare => "Prepare",
        ProgressSinkKind::Verify => "Verify",
    };
    Paragraph::new(vec![Line::from(vec![
        Span::styled(
            "PDBBIND",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Op: "),
        Span::styled(op_label, Style::default().fg(Color::Cyan)),
        Span::raw(format!("   {}   ", tui.title)),
        Span::styled(hb, Style::default().fg(Color::Green)),
    ])])
    .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_status(state: &AppState) -> Paragraph<'static> {
    let phase_color = if state.phase == Phase::Done {
        Color::Green
    } else {
        Color::Cyan
    };
    let last = state
        .last_elapsed
        .map(|elapsed| format!("{:.1}s", elapsed.as_secs_f64()))
        .unwrap_or_else(|| "--".to_string());
    Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Phase: ", Style::default().fg(Color::Gray)),
            Span::styled(state.phase.label(), Style::default().fg(phase_color)),
            Span::styled("   Elapsed: ", Style::default().fg(Color::Gray)),
            Span::raw(format!("{}s", state.started.elapsed().as_secs())),
            Span::styled("   Last download: ", Style::default().fg(Color::Gray)),
            Span::raw(last),
        ]),
        Line::from(state.status.clone()),
    ])
    .wrap(Wrap { trim: true })
}

fn draw_gauge(state: &AppState) -> Gauge<'static> {
    let block = Block::default().borders(Borders::ALL).title("Progress");
    let (ratio, label) = match (state.phase, state.progress) {
        (Phase::Download, Some(Progress { done, total: Some(total) })) if total > 0 => (
            (done as f64 / total as f64).clamp(0.0, 1.0),
            format!("{} / {}", bytes_to_human(done), bytes_to_human(total)),
        ),
        (Phase::Download, Some(Progress { done, total: None })) => {
            (0.0, format!("{} received", bytes_to_human(done)))
        }
        (_, Some(Progress { done, total: Some(total) })) if total > 0 => (
            (done as f64 / total as f64).clamp(0.0, 1.0),
            format!("{done} / {total}"),
        ),
        (_, Some(Progress { done, total: None })) => (0.0, format!("{done} members")),
        (Phase::Done, None) => (1.0, "complete".to_string()),
        _ => (0.0, String::new()),
    };
    Gauge::default()
        .block(block)
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio)
        .label(label)
}

fn draw_events(state: &AppState) -> Paragraph<'static> {
    let lines = state
        .events
        .iter()
        .map(|event| Line::from(format!("- {event}")))
        .collect::<Vec<_>>();
    Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Recent events (q to leave)"),
        )
        .wrap(Wrap { trim: true })
}

fn parse_phase(message: &str) -> Option<(Phase, &str)> {
    let rest = message.strip_prefix("phase=")?;
    let (label, payload) = rest.split_once(';').unwrap_or((rest, ""));
    let phase = match label.trim() {
        "Resolve" => Phase::Resolve,
        "Download" => Phase::Download,
        "Extract" => Phase::Extract,
        "Verify" => Phase::Verify,
        "Done" => Phase::Done,
        _ => return None,
    };
    Some((phase, payload.trim()))
}

fn push_bounded(buffer: &mut VecDeque<String>, item: String, max: usize) {
    buffer.push_back(item);
    while buffer.len() > max {
        buffer.pop_front();
    }
}

fn bytes_to_human(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let value = bytes as f64;
    if value >= GB {
        format!("{:.1} GB", value / GB)
    } else if value >= MB {
        format!("{:.1} MB", value / MB)
    } else if value >= KB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_messages() {
        assert_eq!(
            parse_phase("phase=Download; downloading x"),
            Some((Phase::Download, "downloading x"))
        );
        assert_eq!(parse_phase("phase=Done"), Some((Phase::Done, "")));
        assert_eq!(parse_phase("download.progress"), None);
    }

    #[test]
    fn progress_events_do_not_flood_the_event_list() {
        let tui = Tui::new(ProgressSinkKind::Prepare, "2016:casf");
        let sink = TuiProgress {
            state: tui.state.clone(),
        };
        sink.event(ProgressEvent::phase("phase=Download; downloading"));
        for done in 0..100 {
            sink.event(ProgressEvent::progress(
                "download.progress",
                Progress {
                    done,
                    total: Some(100),
                },
            ));
        }
        let state = tui.state.lock().unwrap();
        assert_eq!(state.phase, Phase::Download);
        assert_eq!(state.events.len(), 1);
        assert_eq!(
            state.progress,
            Some(Progress {
                done: 99,
                total: Some(100)
            })
        );
    }

    #[test]
    fn human_sizes() {
        assert_eq!(bytes_to_human(512), "512 B");
        assert_eq!(bytes_to_human(3 * 1024 * 1024), "3.0 MB");
    }
}
