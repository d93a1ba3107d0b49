//! TUI views and rendering
//!
//! All rendering logic is contained here. Views draw the UI from
//! `SessionState` but never modify it.

use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tracing::trace;

use crate::plan::Step;
use crate::session::{Screen, SessionState, StepStatus};

mod colors {
    use ratatui::style::Color;

    pub const HEADER: Color = Color::Rgb(0, 255, 255); // Cyan
    pub const KEYBIND: Color = Color::Rgb(0, 255, 255); // Cyan
    pub const PENDING: Color = Color::Rgb(255, 215, 0); // Gold
    pub const COMPLETE: Color = Color::Rgb(50, 205, 50); // Lime green
    pub const FAILED: Color = Color::Rgb(220, 20, 60); // Crimson
    pub const COMMAND: Color = Color::Rgb(100, 149, 237); // Cornflower blue
    pub const DIM: Color = Color::DarkGray;
}

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Lines of captured output shown under a finished step
const OUTPUT_PREVIEW_LINES: usize = 6;

fn status_color(status: &StepStatus) -> Color {
    match status {
        StepStatus::Executed { .. } | StepStatus::Written { .. } => colors::COMPLETE,
        StepStatus::Acknowledged => Color::Gray,
        StepStatus::Skipped => colors::DIM,
        StepStatus::Failed { .. } => colors::FAILED,
    }
}

fn status_icon(status: &StepStatus) -> &'static str {
    match status {
        StepStatus::Executed { .. } | StepStatus::Written { .. } => "✓",
        StepStatus::Acknowledged => "·",
        StepStatus::Skipped => "⊘",
        StepStatus::Failed { .. } => "✗",
    }
}

/// Main render function
pub fn render(state: &SessionState, ticks: u64, frame: &mut Frame) {
    trace!(screen = ?state.screen, "render: called");
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Main content
            Constraint::Length(3), // Footer
        ])
        .split(frame.area());

    render_header(state, frame, chunks[0]);

    match state.screen {
        Screen::Menu => render_menu(state, frame, chunks[1]),
        Screen::Query => render_prompt(state, "What do you want to do?", frame, chunks[1]),
        Screen::Mode => render_mode(state, frame, chunks[1]),
        Screen::AwaitingPlan => render_awaiting(state, ticks, frame, chunks[1]),
        Screen::Steps | Screen::Executing | Screen::Done => render_steps(state, frame, chunks[1]),
        Screen::History => render_history(state, frame, chunks[1]),
    }

    render_footer(state, frame, chunks[2]);
}

fn render_header(state: &SessionState, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(" gofigure", Style::default().fg(colors::HEADER).add_modifier(Modifier::BOLD)),
        Span::raw(" │ "),
        Span::raw(state.screen.display_name()),
    ];
    if let Some(mode) = state.active_mode
        && state.screen != Screen::Mode
    {
        spans.push(Span::raw(" │ "));
        spans.push(Span::styled(mode.as_str(), Style::default().fg(colors::PENDING)));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(header, area);
}

fn render_menu(state: &SessionState, frame: &mut Frame, area: Rect) {
    let mut lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  1 ", Style::default().fg(colors::KEYBIND)),
            Span::raw("query    ask for a plan"),
        ]),
        Line::from(vec![
            Span::styled("  2 ", Style::default().fg(colors::KEYBIND)),
            Span::raw("history  past queries and their plans"),
        ]),
        Line::from(""),
    ];
    lines.push(input_line("Select: ", &state.input));

    let menu = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Menu "));
    frame.render_widget(menu, area);
}

fn render_prompt(state: &SessionState, title: &str, frame: &mut Frame, area: Rect) {
    let lines = vec![Line::from(""), input_line("> ", &state.input)];
    let prompt = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(format!(" {} ", title)));
    frame.render_widget(prompt, area);
}

fn render_mode(state: &SessionState, frame: &mut Frame, area: Rect) {
    let query = state.active_query.as_ref().map(|q| q.as_str()).unwrap_or_default();
    let lines = vec![
        Line::from(vec![Span::styled("  Query: ", Style::default().fg(colors::DIM)), Span::raw(query)]),
        Line::from(""),
        Line::from(vec![
            Span::styled("  1 ", Style::default().fg(colors::KEYBIND)),
            Span::raw("execute        run approved commands now"),
        ]),
        Line::from(vec![
            Span::styled("  2 ", Style::default().fg(colors::KEYBIND)),
            Span::raw("write-to-file  append approved commands to a file"),
        ]),
        Line::from(""),
        input_line("Mode: ", &state.input),
    ];
    let mode = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Mode "));
    frame.render_widget(mode, area);
}

fn render_awaiting(state: &SessionState, ticks: u64, frame: &mut Frame, area: Rect) {
    let spinner = SPINNER[(ticks / 4) as usize % SPINNER.len()];
    let text = format!("{} {}...", spinner, state.thinking_word);
    let block = Block::default().borders(Borders::ALL);
    let inner = block.inner(area).inner(Margin {
        horizontal: 2,
        vertical: 2,
    });
    frame.render_widget(block, area);
    let body = Paragraph::new(text)
        .style(Style::default().fg(colors::PENDING))
        .alignment(Alignment::Center);
    frame.render_widget(body, inner);
}

fn render_steps(state: &SessionState, frame: &mut Frame, area: Rect) {
    let Some(plan) = state.active_plan.as_ref() else {
        render_empty_message(frame, area, "No plan");
        return;
    };
    let current = state.current_step().map(|s| s.number);

    let mut lines = Vec::new();
    if let Some(query) = state.active_query.as_ref() {
        lines.push(Line::from(vec![
            Span::styled("Query: ", Style::default().fg(colors::DIM)),
            Span::raw(query.as_str()),
        ]));
        lines.push(Line::from(""));
    }

    // Line range of the step under confirmation
    let mut focus = None;
    for step in plan.steps() {
        let is_current = current == Some(step.number);
        let block = step_lines(state, step, is_current);
        if is_current {
            focus = Some((lines.len(), lines.len() + block.len()));
        }
        lines.extend(block);
    }

    if state.screen == Screen::Done {
        let done = state.count_records(|s| matches!(s, StepStatus::Executed { .. } | StepStatus::Written { .. }));
        let failed = state.count_records(|s| matches!(s, StepStatus::Failed { .. }));
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("Finished: {} dispatched, {} failed, {} total", done, failed, plan.len()),
            Style::default().add_modifier(Modifier::BOLD),
        )));
    }

    let title = if state.screen == Screen::Done { " Done " } else { " Steps " };
    let block = Block::default().borders(Borders::ALL).title(title);
    let scroll = steps_scroll(&lines, focus, block.inner(area));
    let steps = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(block)
        .scroll((scroll, 0));
    frame.render_widget(steps, area);
}

/// First visible row for the steps list
///
/// The focused step is always fully visible (its top wins if it is taller
/// than the viewport), with as many earlier lines above it as fit. Without a
/// focus the list is pinned to the bottom so the summary shows.
fn steps_scroll(lines: &[Line], focus: Option<(usize, usize)>, inner: Rect) -> u16 {
    let width = inner.width as usize;
    let height = inner.height as usize;
    let max_scroll = visual_rows(lines, width).saturating_sub(height);

    let scroll = match focus {
        Some((start, end)) => {
            let top = visual_rows(&lines[..start], width);
            let bottom = visual_rows(&lines[..end], width);
            top.min(bottom.saturating_sub(height))
        }
        None => max_scroll,
    };
    u16::try_from(scroll.min(max_scroll)).unwrap_or(u16::MAX)
}

/// Rows taken by `lines` once wrapped to `width`
fn visual_rows(lines: &[Line], width: usize) -> usize {
    lines
        .iter()
        .map(|line| {
            let line_width = line.width();
            if width == 0 || line_width == 0 {
                1
            } else {
                line_width.div_ceil(width)
            }
        })
        .sum()
}

fn step_lines<'a>(state: &'a SessionState, step: &'a Step, is_current: bool) -> Vec<Line<'a>> {
    let record = state.record_for(step.number);
    let (marker, style) = match (record, is_current) {
        (Some(r), _) => (status_icon(&r.status), Style::default().fg(status_color(&r.status))),
        (None, true) => ("▶", Style::default().fg(colors::PENDING).add_modifier(Modifier::BOLD)),
        (None, false) => (" ", Style::default()),
    };

    let mut lines = vec![Line::from(vec![
        Span::styled(format!("{} ", marker), style),
        Span::styled(format!("Step {}: ", step.number), style),
        Span::raw(step.description.as_str()),
    ])];
    if !step.rationale.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("    {}", step.rationale),
            Style::default().fg(colors::DIM),
        )));
    }
    if let Some(command) = step.runnable_command() {
        lines.push(Line::from(Span::styled(
            format!("    $ {}", command),
            Style::default().fg(colors::COMMAND),
        )));
    }

    if let Some(record) = record {
        let (note, output) = match &record.status {
            StepStatus::Executed { output } => (None, output.as_str()),
            StepStatus::Written { .. } => (Some("written to file".to_string()), ""),
            StepStatus::Failed { message, output } => (Some(message.clone()), output.as_str()),
            StepStatus::Acknowledged | StepStatus::Skipped => (Some(record.status.label().to_string()), ""),
        };
        if let Some(note) = note {
            lines.push(Line::from(Span::styled(
                format!("    [{}]", note),
                Style::default().fg(status_color(&record.status)),
            )));
        }
        for line in output.lines().take(OUTPUT_PREVIEW_LINES) {
            lines.push(Line::from(Span::styled(format!("    │ {}", line), Style::default().fg(colors::DIM))));
        }
    } else if is_current && state.screen == Screen::Executing {
        lines.push(Line::from(Span::styled("    running...", Style::default().fg(colors::PENDING))));
    }

    lines
}

fn render_history(state: &SessionState, frame: &mut Frame, area: Rect) {
    let history = Paragraph::new(state.history_view.as_str())
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(" History "));
    frame.render_widget(history, area);
}

fn render_footer(state: &SessionState, frame: &mut Frame, area: Rect) {
    let content = if let Some(error) = state.last_error.as_ref() {
        Line::from(Span::styled(format!(" Error: {}", error), Style::default().fg(colors::FAILED)))
    } else {
        let keybinds: &[(&str, &str)] = match state.screen {
            Screen::Menu => &[("[Enter]", "Select")],
            Screen::Query | Screen::Mode => &[("[Enter]", "Submit"), ("[Esc]", "Back")],
            Screen::AwaitingPlan => &[("[Esc]", "Cancel")],
            Screen::Steps => &[("[y]", "Run"), ("[n]", "Skip"), ("[Esc]", "Cancel")],
            Screen::Executing => &[],
            Screen::Done => &[("[Enter]", "New query"), ("[Esc]", "Menu")],
            Screen::History => &[("[Esc]", "Back")],
        };

        let mut spans = vec![Span::raw(" ")];
        for (key, action) in keybinds.iter().chain([("[Ctrl+C]", "Quit")].iter()) {
            spans.push(Span::styled(
                *key,
                Style::default().fg(colors::KEYBIND).add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::raw(format!(" {} ", action)));
        }
        Line::from(spans)
    };

    let footer = Paragraph::new(content).block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, area);
}

fn input_line<'a>(label: &'a str, input: &'a str) -> Line<'a> {
    Line::from(vec![
        Span::styled(format!("  {}", label), Style::default().fg(colors::KEYBIND)),
        Span::raw(input),
        Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
    ])
}

fn render_empty_message(frame: &mut Frame, area: Rect, message: &str) {
    let inner = area.inner(Margin {
        horizontal: 2,
        vertical: 2,
    });
    let empty = Paragraph::new(message)
        .style(Style::default().fg(colors::DIM))
        .alignment(Alignment::Center);
    frame.render_widget(empty, inner);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Plan;
    use crate::session::StepRecord;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn draw(state: &SessionState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 24)).unwrap();
        terminal.draw(|frame| render(state, 0, frame)).unwrap();
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_menu_renders_choices() {
        let screen = draw(&SessionState::new());
        assert!(screen.contains("gofigure"));
        assert!(screen.contains("query"));
        assert!(screen.contains("history"));
    }

    #[test]
    fn test_error_replaces_keybinds() {
        let mut state = SessionState::new();
        state.screen = Screen::Query;
        state.set_error("empty query");
        let screen = draw(&state);
        assert!(screen.contains("Error: empty query"));
        assert!(!screen.contains("Submit"));
    }

    #[test]
    fn test_steps_show_command_and_status() {
        let mut state = SessionState::new();
        state.screen = Screen::Steps;
        state.active_plan = Some(
            Plan::new(vec![
                Step::new(1, "make file", "", Some("touch a.txt")),
                Step::new(2, "list files", "", Some("ls")),
            ])
            .unwrap(),
        );
        state.records.push(StepRecord {
            number: 1,
            status: StepStatus::Skipped,
        });
        state.cursor = 1;

        let screen = draw(&state);
        assert!(screen.contains("Step 1: make file"));
        assert!(screen.contains("$ touch a.txt"));
        assert!(screen.contains("[skipped]"));
        assert!(screen.contains("Step 2: list files"));
    }

    fn executed_plan(count: u32, finished: u32) -> SessionState {
        let steps = (1..=count)
            .map(|n| {
                let command = format!("rm -rf dir{}", n);
                Step::new(n, format!("clean up dir{}", n), "frees space", Some(command.as_str()))
            })
            .collect();
        let mut state = SessionState::new();
        state.screen = Screen::Steps;
        state.active_query = Some(crate::plan::Query::new("clean everything").unwrap());
        state.active_plan = Some(Plan::new(steps).unwrap());
        for n in 1..=finished {
            state.records.push(StepRecord {
                number: n,
                status: StepStatus::Executed {
                    output: "a\nb\nc".to_string(),
                },
            });
        }
        state.cursor = finished as usize;
        state
    }

    #[test]
    fn test_current_step_stays_visible_in_long_plan() {
        let state = executed_plan(6, 5);
        assert_eq!(state.current_step().unwrap().number, 6);

        let screen = draw(&state);
        assert!(screen.contains("Step 6: clean up dir6"), "screen:\n{}", screen);
        assert!(screen.contains("$ rm -rf dir6"), "screen:\n{}", screen);
        assert!(screen.contains("[y] Run"));
    }

    #[test]
    fn test_current_step_in_middle_keeps_following_hidden_steps_below() {
        let state = executed_plan(6, 3);
        let screen = draw(&state);
        assert!(screen.contains("$ rm -rf dir4"), "screen:\n{}", screen);
    }

    #[test]
    fn test_done_summary_visible_after_long_plan() {
        let mut state = executed_plan(6, 6);
        state.screen = Screen::Done;
        let screen = draw(&state);
        assert!(screen.contains("Finished: 6 dispatched, 0 failed, 6 total"), "screen:\n{}", screen);
    }

    #[test]
    fn test_awaiting_shows_thinking_word() {
        let mut state = SessionState::new();
        state.screen = Screen::AwaitingPlan;
        state.thinking_word = "Pondering";
        assert!(draw(&state).contains("Pondering..."));
    }
}
