//! Terminal dashboard for one guild's player

use crate::activity::{Activity, LogLevel};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use flake_core::api::{RepeatMode, SessionQueue};
use flake_core::session::{CoreError, SyncSession};
use flake_core::{format_time, PlayerView};
use parking_lot::RwLock;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, List, ListItem, Paragraph},
    Frame, Terminal,
};
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

/// Seek step for the arrow keys
const SEEK_STEP_MS: i64 = 10_000;

/// Volume step for +/-
const VOLUME_STEP: i16 = 5;

/// Dashboard state for scrolling etc.
#[derive(Default)]
struct DashboardState {
    /// Log scroll position (0 = most recent at bottom)
    log_scroll: usize,
    /// Selected entry among the upcoming tracks
    queue_cursor: usize,
}

/// Run the dashboard until the user quits
pub async fn run(session: Arc<SyncSession>, activity: Arc<RwLock<Activity>>) -> Result<(), Box<dyn std::error::Error>> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = DashboardState::default();
    let tick_rate = Duration::from_millis(100);
    let mut should_quit = false;

    while !should_quit {
        let view = session.view();
        let queue = session.queue();
        let guild_label = guild_label(&session);

        // Draw
        terminal.draw(|f| draw(f, &view, &queue, &guild_label, &activity, &state))?;

        // Handle input without blocking the runtime
        let key = tokio::task::block_in_place(|| -> std::io::Result<Option<KeyEvent>> {
            if event::poll(tick_rate)? {
                if let Event::Key(key) = event::read()? {
                    return Ok(Some(key));
                }
            }
            Ok(None)
        })?;

        let Some(key) = key else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        let upcoming = queue.upcoming().len();
        let result = match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                should_quit = true;
                Ok(())
            }
            KeyCode::Char('c') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                should_quit = true;
                Ok(())
            }
            KeyCode::Char(' ') => session.toggle_pause(),
            KeyCode::Char('n') => session.skip(),
            KeyCode::Char('p') => session.previous(),
            KeyCode::Char('s') => session.toggle_shuffle().map(|_| ()),
            KeyCode::Char('r') => session.cycle_repeat().map(|_| ()),
            KeyCode::Char('m') => session.toggle_mute().map(|_| ()),
            KeyCode::Char('f') => session.cycle_filter().map(|filter| {
                activity.write().log(LogLevel::Info, format!("Filter: {}", filter.label()));
            }),
            KeyCode::Char('+') | KeyCode::Char('=') => session.adjust_volume(VOLUME_STEP).map(|_| ()),
            KeyCode::Char('-') => session.adjust_volume(-VOLUME_STEP).map(|_| ()),
            KeyCode::Left => session.seek_by(-SEEK_STEP_MS),
            KeyCode::Right => session.seek_by(SEEK_STEP_MS),
            KeyCode::Char(c @ '0'..='9') => session.seek_percent(f64::from(c as u8 - b'0') * 10.0),
            KeyCode::Char('g') => {
                if let Some(id) = session.select_next_guild() {
                    state.queue_cursor = 0;
                    activity.write().log(LogLevel::Info, format!("Switched to guild {}", id));
                }
                Ok(())
            }
            // Queue cursor
            KeyCode::Char(']') => {
                state.queue_cursor = (state.queue_cursor + 1).min(upcoming.saturating_sub(1));
                Ok(())
            }
            KeyCode::Char('[') => {
                state.queue_cursor = state.queue_cursor.saturating_sub(1);
                Ok(())
            }
            KeyCode::Char('x') => match queue_index(&queue, state.queue_cursor) {
                Some(index) => session.remove(index),
                None => Ok(()),
            },
            KeyCode::Enter => match queue_index(&queue, state.queue_cursor) {
                Some(index) => session.play_next(index),
                None => Ok(()),
            },
            // Scroll log
            KeyCode::Up | KeyCode::Char('k') => {
                let log_count = activity.read().logs.len();
                state.log_scroll = (state.log_scroll + 1).min(log_count.saturating_sub(1));
                Ok(())
            }
            KeyCode::Down | KeyCode::Char('j') => {
                state.log_scroll = state.log_scroll.saturating_sub(1);
                Ok(())
            }
            _ => Ok(()),
        };

        if let Err(e) = result {
            let level = match e {
                CoreError::NoGuildSelected | CoreError::NothingPlaying => LogLevel::Warning,
                _ => LogLevel::Error,
            };
            activity.write().log(level, e.to_string());
        }
    }

    // Cleanup
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}

fn guild_label(session: &SyncSession) -> String {
    let Some(id) = session.guild_id() else {
        return "none".to_string();
    };
    session
        .guilds()
        .into_iter()
        .find(|g| g.guild_id == id)
        .map(|g| g.label)
        .unwrap_or(id)
}

/// Control index of the `cursor`-th upcoming track.
///
/// The bot's `remove` and `playNext` count from the first track after the
/// current one, the same list the up-next panel shows.
fn queue_index(queue: &SessionQueue, cursor: usize) -> Option<usize> {
    (cursor < queue.upcoming().len()).then_some(cursor)
}

/// Draw the dashboard
fn draw(
    f: &mut Frame,
    view: &PlayerView,
    queue: &SessionQueue,
    guild: &str,
    activity: &Arc<RwLock<Activity>>,
    state: &DashboardState,
) {
    let a = activity.read();

    // Main layout
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Length(6), // Now playing
            Constraint::Length(3), // Controls
            Constraint::Min(8),    // Queue + log
            Constraint::Length(1), // Footer
        ])
        .split(f.area());

    draw_header(f, chunks[0], guild, &a);
    draw_now_playing(f, chunks[1], view);
    draw_controls(f, chunks[2], view);

    let lower = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(chunks[3]);
    draw_queue(f, lower[0], queue, state);
    draw_logs(f, lower[1], &a, state);

    draw_footer(f, chunks[4]);
}

fn draw_header(f: &mut Frame, area: Rect, guild: &str, a: &Activity) {
    let (push_text, push_style) = if a.push_connected {
        ("LIVE", Style::default().fg(Color::Green))
    } else {
        ("POLLING", Style::default().fg(Color::Yellow))
    };

    let mut spans = vec![
        Span::styled("Flake Music", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw("  │  Guild: "),
        Span::styled(guild.to_string(), Style::default().fg(Color::Cyan)),
        Span::raw(format!(" ({} active)", a.guild_count)),
        Span::raw("  │  Updates: "),
        Span::styled(push_text, push_style),
        Span::raw("  │  Uptime: "),
        Span::styled(a.uptime(), Style::default().fg(Color::Cyan)),
    ];

    if let Some(message) = a.banner() {
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(
            message.to_string(),
            Style::default().fg(Color::White).bg(Color::Red),
        ));
    }

    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title(" Dashboard "));

    f.render_widget(header, area);
}

fn draw_now_playing(f: &mut Frame, area: Rect, view: &PlayerView) {
    let block = Block::default().borders(Borders::ALL).title(" Now Playing ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let Some(track) = &view.track else {
        let idle = if view.is_connected {
            "Nothing playing"
        } else {
            "Not connected to a voice channel"
        };
        f.render_widget(
            Paragraph::new(Span::styled(idle, Style::default().fg(Color::DarkGray))),
            rows[0],
        );
        return;
    };

    f.render_widget(
        Paragraph::new(Span::styled(
            track.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        rows[0],
    );
    f.render_widget(
        Paragraph::new(Span::styled(
            track.author.clone().unwrap_or_default(),
            Style::default().fg(Color::Gray),
        )),
        rows[1],
    );

    let duration = if view.duration_ms > 0 {
        format_time(view.duration_ms)
    } else {
        "LIVE".to_string()
    };
    let gauge = Gauge::default()
        .gauge_style(Style::default().fg(Color::Magenta).bg(Color::Black))
        .ratio(view.progress())
        .label(format!("{} / {}", format_time(view.position_ms), duration));
    f.render_widget(gauge, rows[2]);

    let (status, status_style) = if view.is_paused {
        ("PAUSED", Style::default().fg(Color::Yellow))
    } else {
        ("PLAYING", Style::default().fg(Color::Green))
    };
    let mut spans = vec![Span::styled(status, status_style)];
    if view.seek_pending {
        spans.push(Span::styled("  seeking…", Style::default().fg(Color::Cyan)));
    }
    if view.dragging {
        spans.push(Span::styled("  dragging", Style::default().fg(Color::Cyan)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), rows[3]);
}

fn draw_controls(f: &mut Frame, area: Rect, view: &PlayerView) {
    let c = &view.controls;
    let on_off = |enabled: bool| {
        if enabled {
            Span::styled("on", Style::default().fg(Color::Green))
        } else {
            Span::styled("off", Style::default().fg(Color::DarkGray))
        }
    };
    let repeat = match c.repeat_mode {
        RepeatMode::Off => Span::styled("off", Style::default().fg(Color::DarkGray)),
        RepeatMode::All => Span::styled("all", Style::default().fg(Color::Green)),
        RepeatMode::One => Span::styled("one", Style::default().fg(Color::Green)),
    };
    let volume = if c.muted {
        Span::styled("muted", Style::default().fg(Color::Red))
    } else {
        Span::styled(format!("{}%", c.volume), Style::default().fg(Color::Cyan))
    };

    let line = Line::from(vec![
        Span::raw("Shuffle: "),
        on_off(c.shuffle_enabled),
        Span::raw("  │  Repeat: "),
        repeat,
        Span::raw("  │  Volume: "),
        volume,
        Span::raw("  │  Filter: "),
        Span::styled(c.filter.label(), Style::default().fg(Color::Magenta)),
    ]);

    let controls = Paragraph::new(line).block(Block::default().borders(Borders::ALL).title(" Controls "));
    f.render_widget(controls, area);
}

fn draw_queue(f: &mut Frame, area: Rect, queue: &SessionQueue, state: &DashboardState) {
    let upcoming = queue.upcoming();
    let items: Vec<ListItem> = upcoming
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let style = if i == state.queue_cursor {
                Style::default().fg(Color::Black).bg(Color::Cyan)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::styled(format!("{:>2}. ", i + 1), Style::default().fg(Color::DarkGray)),
                Span::styled(track.display_name(), style),
                Span::styled(
                    format!("  {}", format_time(track.duration_ms)),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(" Up Next ({}) ", upcoming.len())),
    );
    f.render_widget(list, area);
}

fn draw_logs(f: &mut Frame, area: Rect, a: &Activity, state: &DashboardState) {
    let visible_height = area.height.saturating_sub(2) as usize;

    let log_items: Vec<ListItem> = a
        .logs
        .iter()
        .rev()
        .skip(state.log_scroll)
        .take(visible_height)
        .map(|entry| {
            let level_style = match entry.level {
                LogLevel::Info => Style::default().fg(Color::Blue),
                LogLevel::Warning => Style::default().fg(Color::Yellow),
                LogLevel::Error => Style::default().fg(Color::Red),
                LogLevel::Track => Style::default().fg(Color::Magenta),
                LogLevel::Push => Style::default().fg(Color::Green),
            };

            let time = entry.timestamp.format("%H:%M:%S").to_string();

            ListItem::new(Line::from(vec![
                Span::styled(format!("{} ", time), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("[{}] ", entry.level.as_str()), level_style),
                Span::raw(entry.message.clone()),
            ]))
        })
        .collect();

    let logs = List::new(log_items).block(Block::default().borders(Borders::ALL).title(" Activity "));
    f.render_widget(logs, area);
}

fn draw_footer(f: &mut Frame, area: Rect) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Black).bg(Color::White));

    let footer = Paragraph::new(Line::from(vec![
        key(" SPACE "),
        Span::raw(" Play/Pause "),
        key(" N/P "),
        Span::raw(" Skip/Prev "),
        key(" ←→ "),
        Span::raw(" Seek "),
        key(" 0-9 "),
        Span::raw(" Jump "),
        key(" S/R "),
        Span::raw(" Shuffle/Repeat "),
        key(" M +- "),
        Span::raw(" Volume "),
        key(" F "),
        Span::raw(" Filter "),
        key(" [ ] X ⏎ "),
        Span::raw(" Queue "),
        key(" G "),
        Span::raw(" Guild "),
        key(" Q "),
        Span::raw(" Quit"),
    ]));

    f.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use flake_core::Track;

    fn queue(len: usize, current: Option<usize>) -> SessionQueue {
        SessionQueue {
            tracks: (0..len)
                .map(|i| Track {
                    title: format!("t{}", i),
                    ..Default::default()
                })
                .collect(),
            current_index: current,
        }
    }

    #[test]
    fn test_queue_index_counts_upcoming_tracks_only() {
        // 'c' is playing; 'd' is the first track up next
        let q = queue(5, Some(2));
        assert_eq!(q.upcoming()[0].title, "t3");
        assert_eq!(queue_index(&q, 0), Some(0));
        assert_eq!(queue_index(&q, 1), Some(1));
        assert_eq!(queue_index(&q, 2), None);
    }

    #[test]
    fn test_queue_index_without_current() {
        let q = queue(2, None);
        assert_eq!(queue_index(&q, 1), Some(1));
        assert_eq!(queue_index(&q, 2), None);
    }
}
