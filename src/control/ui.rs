use std::error::Error;
use std::io::stdout;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEvent};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Gauge, List, ListItem, Paragraph, Row, Table, Wrap};

use crate::control::session::{DemoSession, SessionStatus};
use crate::pop_log;

const TICK_RATE: Duration = Duration::from_millis(100);
const EVENT_LINES: usize = 8;

#[derive(Default)]
struct AppState {
    status: Option<SessionStatus>,
    events: Vec<String>,
    message: Option<String>,
    last_update: Option<Instant>,
}

/// Run the console against a running demo session until `q` is pressed.
pub fn run(session: &DemoSession) -> Result<(), Box<dyn Error>> {
    setup_terminal()?;

    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let (event_tx, event_rx) = unbounded();
    std::thread::spawn(move || {
        loop {
            while let Some(line) = pop_log() {
                if event_tx.send(line).is_err() {
                    return;
                }
            }
            std::thread::sleep(TICK_RATE);
        }
    });

    let mut app = AppState::default();
    let mut next_poll = Instant::now();

    let result = loop {
        if Instant::now() >= next_poll {
            app.status = session.status();
            app.last_update = Some(Instant::now());
            next_poll = Instant::now() + TICK_RATE;
        }
        drain_events(&event_rx, &mut app.events);

        terminal.draw(|frame| draw(frame, &app))?;

        if event::poll(Duration::from_millis(10))? {
            if let CEvent::Key(key) = event::read()? {
                if handle_key(&mut app, session, key) {
                    break Ok(());
                }
            }
        }
    };

    restore_terminal()?;
    result
}

fn setup_terminal() -> Result<(), Box<dyn Error>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    Ok(())
}

fn restore_terminal() -> Result<(), Box<dyn Error>> {
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    Ok(())
}

fn drain_events(rx: &Receiver<String>, events: &mut Vec<String>) {
    while let Ok(line) = rx.try_recv() {
        events.push(line);
    }
    if events.len() > EVENT_LINES {
        events.drain(..events.len() - EVENT_LINES);
    }
}

fn handle_key(app: &mut AppState, session: &DemoSession, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('p') => {
            let paused = session.toggle_pause();
            app.message = Some(if paused { "Consumer paused" } else { "Consumer resumed" }.into());
        }
        KeyCode::Char('+') | KeyCode::Char('-') => {
            let Some(current) = app.status.as_ref().map(|s| s.device.buffer_size) else {
                return false;
            };
            let target = if key.code == KeyCode::Char('+') {
                current.saturating_mul(2)
            } else {
                current / 2
            };
            if let Some(frames) = session.resize(target) {
                app.message = Some(format!("Buffer size set to {frames} frames"));
            }
        }
        _ => {}
    }
    false
}

fn draw(frame: &mut ratatui::Frame<'_>, app: &AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(EVENT_LINES as u16 + 2),
            Constraint::Length(4),
        ])
        .split(frame.size());

    draw_header(frame, chunks[0], app);
    draw_fill(frame, chunks[1], app);
    draw_queue(frame, chunks[2], app);
    draw_events(frame, chunks[3], app);
    draw_footer(frame, chunks[4], app);
}

fn draw_header(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let block = Block::default()
        .title("PCM Device Console")
        .borders(Borders::ALL);

    let content = if let Some(status) = &app.status {
        let device = &status.device;
        Paragraph::new(format!(
            "{:?}    {} x{} @ {} Hz    Clock: {:.3} s{}",
            device.state,
            device.format,
            device.channels,
            device.rate,
            status.clock.as_secs_f64(),
            if status.paused { "    [consumer paused]" } else { "" },
        ))
    } else {
        Paragraph::new(Line::from(vec![Span::styled(
            "No active device",
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )]))
    };

    frame.render_widget(content.block(block), area);
}

fn draw_fill(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let (ratio, label) = match &app.status {
        Some(status) if status.device.buffer_size > 0 => {
            let device = &status.device;
            let ratio = (device.latency_frames as f64 / device.buffer_size as f64).min(1.0);
            (
                ratio,
                format!("{} / {} frames", device.latency_frames, device.buffer_size),
            )
        }
        _ => (0.0, String::from("-")),
    };
    let gauge = Gauge::default()
        .block(Block::default().title("Queue fill").borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio)
        .label(label);
    frame.render_widget(gauge, area);
}

fn draw_queue(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let block = Block::default().title("Queue").borders(Borders::ALL);

    let Some(status) = &app.status else {
        frame.render_widget(Paragraph::new("").block(block), area);
        return;
    };
    let device = &status.device;
    let entries = [
        ("Capacity", format!("{} frames", device.buffer_size)),
        (
            "Periods",
            format!("{} x {} frames", device.periods, device.period_size),
        ),
        ("Queued buffers", device.queued_buffers.to_string()),
        (
            "Processed buffers",
            device.processed_buffers.to_string(),
        ),
        (
            "Latency",
            format!("{} frames ({:.2} ms)", device.latency_frames, device.latency_ms),
        ),
        ("Available", format!("{} frames", device.available_frames)),
        ("Consumer RMS", format!("{:.3}", status.rms)),
        ("Frames mixed", status.frames_mixed.to_string()),
    ];

    let header = Row::new(vec![Cell::from("Metric"), Cell::from("Value")]).style(
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    );
    let rows = entries
        .into_iter()
        .map(|(name, value)| Row::new(vec![Cell::from(name), Cell::from(value)]));
    let table = Table::new(rows, [Constraint::Length(20), Constraint::Min(20)])
        .header(header)
        .block(block)
        .column_spacing(2);
    frame.render_widget(table, area);
}

fn draw_events(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let items: Vec<ListItem> = app
        .events
        .iter()
        .map(|line| ListItem::new(line.as_str()))
        .collect();
    let list = List::new(items).block(Block::default().title("Events").borders(Borders::ALL));
    frame.render_widget(list, area);
}

fn draw_footer(frame: &mut ratatui::Frame<'_>, area: ratatui::prelude::Rect, app: &AppState) {
    let info = "p: Pause consumer  •  +/-: Resize buffer  •  q: Quit";
    let mut lines = vec![Line::from(info)];
    if let Some(message) = &app.message {
        lines.push(Line::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Green),
        )));
    } else if let Some(updated) = app.last_update {
        lines.push(Line::from(Span::styled(
            format!("Last update {:.1}s ago", updated.elapsed().as_secs_f32()),
            Style::default().fg(Color::DarkGray),
        )));
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}
