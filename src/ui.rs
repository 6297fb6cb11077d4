//! Terminal UI rendering for the casewatch TUI.
//!
//! Minimal chrome: whitespace and position carry the structure, selection is
//! shown with the REVERSED modifier so it adapts to the terminal theme.
//!
//! This module renders from RenderState (immutable snapshot) - it never
//! mutates application state.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use crate::render::{CaseView, RenderState, VariablesView};
use crate::tea::{InputKind, Mode, Notification, NotificationLevel};
use crate::util::truncate;

// Color tokens
const COLOR_TEXT_DIMMED: Color = Color::Gray;
const COLOR_TEXT_MUTED: Color = Color::DarkGray;
const COLOR_SEPARATOR: Color = Color::White;

// Task status colors (terminal palette)
const COLOR_TASK_SUCCESS: Color = Color::Green;
const COLOR_TASK_FAILURE: Color = Color::Red;
const COLOR_TASK_ACTIVE: Color = Color::Yellow;

// Column widths for the case table
const ID_WIDTH: usize = 6;
const TASK_WIDTH: usize = 9;
const CREATED_WIDTH: usize = 16;
const RES_WIDTH: usize = 14;
const COMPSET_WIDTH: usize = 14;
const MARKER_WIDTH: usize = 2;
const SPACING: usize = 2;

const FIXED_WIDTH: usize = MARKER_WIDTH
    + ID_WIDTH
    + TASK_WIDTH * 2
    + CREATED_WIDTH
    + RES_WIDTH
    + COMPSET_WIDTH
    + SPACING * 6;

// -----------------------------------------------------------------------------
// Context-sensitive keymap system
// -----------------------------------------------------------------------------

/// Context for determining which keybindings to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeymapContext {
    List {
        selected_case: Option<SelectedCaseContext>,
    },
    Variables,
    TextInput,
    DeleteConfirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectedCaseContext {
    pub can_run: bool,
    pub can_download: bool,
}

impl KeymapContext {
    pub fn from_render_state(state: &RenderState) -> Self {
        match state.mode {
            Mode::Input(InputKind::Confirm) => KeymapContext::DeleteConfirm,
            Mode::Input(_) => KeymapContext::TextInput,
            Mode::Variables(_) => KeymapContext::Variables,
            Mode::List => KeymapContext::List {
                selected_case: state.cases.get(state.selected).map(|c| SelectedCaseContext {
                    can_run: c.can_run,
                    can_download: c.can_download && !c.downloading,
                }),
            },
        }
    }
}

struct Keybinding(&'static str, &'static str);

/// A group of related keybindings (separated by │).
struct KeybindingGroup(Vec<Keybinding>);

fn keybindings_for_context(ctx: KeymapContext) -> Vec<KeybindingGroup> {
    match ctx {
        KeymapContext::List { selected_case } => {
            let mut case_actions = Vec::new();
            if let Some(ctx) = selected_case {
                if ctx.can_run {
                    case_actions.push(Keybinding("r", "run"));
                }
                if ctx.can_download {
                    case_actions.push(Keybinding("D", "download"));
                }
                case_actions.push(Keybinding("v", "variables"));
                case_actions.push(Keybinding("e", "rename"));
                case_actions.push(Keybinding("d", "delete"));
            }

            vec![
                KeybindingGroup(vec![Keybinding("j/k", "move")]),
                KeybindingGroup(case_actions),
                KeybindingGroup(vec![
                    Keybinding("n", "new"),
                    Keybinding("s", "site"),
                    Keybinding("g", "reload"),
                ]),
                KeybindingGroup(vec![Keybinding("q", "quit")]),
            ]
        }
        KeymapContext::Variables => vec![KeybindingGroup(vec![Keybinding("Esc", "close")])],
        KeymapContext::TextInput => vec![KeybindingGroup(vec![
            Keybinding("Enter", "submit"),
            Keybinding("Esc", "cancel"),
        ])],
        KeymapContext::DeleteConfirm => vec![KeybindingGroup(vec![
            Keybinding("Enter", "delete"),
            Keybinding("Esc", "cancel"),
        ])],
    }
}

/// Main render function - entry point for all UI drawing.
pub fn draw(frame: &mut Frame, state: &RenderState) {
    render_main_layout(frame, state);

    if let Some(ref variables) = state.variables {
        let case = state.cases.iter().find(|c| c.id == variables.case_id);
        render_variables(frame, variables, case, frame.area());
    }

    if let Some(ref notification) = state.notification {
        render_notification(frame, notification, frame.area());
    }
}

/// Title line + separator + case table + status bar.
fn render_main_layout(frame: &mut Frame, state: &RenderState) {
    let area = frame.area();

    if area.height < 4 {
        render_table(frame, state, area);
        return;
    }

    let chunks = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(1),
    ])
    .split(area);

    render_title(frame, state, chunks[0]);
    render_separator(frame, chunks[1]);
    render_table(frame, state, chunks[2]);
    render_statusbar(frame, state, chunks[3]);
}

fn render_title(frame: &mut Frame, state: &RenderState, area: Rect) {
    let mut spans = vec![Span::styled("site ", Style::default().fg(COLOR_TEXT_MUTED))];
    match state.site {
        Some(ref site) => spans.push(Span::styled(
            site.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        None => spans.push(Span::styled("none", Style::default().fg(COLOR_TEXT_DIMMED))),
    }

    let watching = state.cases.iter().filter(|c| c.watching).count();
    if watching > 0 {
        spans.push(Span::styled(
            format!("  {} watching", watching),
            Style::default().fg(COLOR_TASK_ACTIVE),
        ));
    }
    if state.loading {
        spans.push(Span::styled("  loading…", Style::default().fg(COLOR_TEXT_DIMMED)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_separator(frame: &mut Frame, area: Rect) {
    let solid = "─".repeat(area.width as usize);
    let line = Line::from(Span::styled(solid, Style::default().fg(COLOR_SEPARATOR)));
    frame.render_widget(Paragraph::new(line), area);
}

/// Bottom line: the input prompt in input mode, otherwise the keymap.
fn render_statusbar(frame: &mut Frame, state: &RenderState, area: Rect) {
    let line = match state.mode {
        Mode::Input(kind) => render_input_line(state, kind),
        _ => render_keymap_line(state),
    };
    frame.render_widget(Paragraph::new(line), area);
}

/// "?" alone when collapsed, "? │ <keymap>" when expanded. While collapsed
/// the task errors of the selected case follow the "?".
fn render_keymap_line(state: &RenderState) -> Line<'static> {
    let ctx = KeymapContext::from_render_state(state);
    let groups = keybindings_for_context(ctx);

    let key_style = Style::default().fg(COLOR_TEXT_DIMMED);
    let desc_style = Style::default().fg(COLOR_TEXT_MUTED);
    let sep_style = Style::default().fg(COLOR_TEXT_MUTED);

    let help_style = if state.show_keymap {
        Style::default()
    } else {
        Style::default().fg(COLOR_TEXT_MUTED)
    };
    let mut spans: Vec<Span> = vec![Span::styled("?", help_style)];

    if !state.show_keymap && state.mode == Mode::List {
        if let Some(case) = state.cases.get(state.selected) {
            for span in task_error_spans(case) {
                spans.push(Span::raw("  "));
                spans.push(span);
            }
        }
    }

    if state.show_keymap {
        for group in groups.iter().filter(|g| !g.0.is_empty()) {
            spans.push(Span::styled(" │ ", sep_style));
            for (key_idx, keybinding) in group.0.iter().enumerate() {
                if key_idx > 0 {
                    spans.push(Span::styled(" • ", sep_style));
                }
                spans.push(Span::styled(keybinding.0, key_style));
                spans.push(Span::styled(format!(" {}", keybinding.1), desc_style));
            }
        }
    }

    Line::from(spans)
}

fn render_input_line(state: &RenderState, kind: InputKind) -> Line<'static> {
    let hint_style = Style::default().fg(COLOR_TEXT_MUTED);
    let label_style = Style::default().fg(Color::Reset);
    let input_style = Style::default().fg(Color::White);
    let cursor_style = Style::default()
        .fg(Color::White)
        .add_modifier(Modifier::SLOW_BLINK);

    let mut spans = vec![
        Span::styled("Enter ", hint_style),
        Span::styled("• ", hint_style),
        Span::styled("Esc  ", hint_style),
    ];

    if matches!(kind, InputKind::Confirm) {
        let target = state
            .cases
            .get(state.selected)
            .map(|c| format!("{} case {} ({})", kind.label(), c.id, c.name))
            .unwrap_or_else(|| kind.label().to_string());
        spans.push(Span::styled(target, label_style));
    } else {
        spans.push(Span::styled(format!("{}: ", kind.label()), label_style));
        spans.push(Span::styled(state.input_buffer.clone(), input_style));
        spans.push(Span::styled("_", cursor_style));
    }

    Line::from(spans)
}

/// Case table with scrolloff navigation: the selection stays centered.
fn render_table(frame: &mut Frame, state: &RenderState, area: Rect) {
    if state.cases.is_empty() {
        let hint = match (&state.site, state.loading) {
            (None, _) => "No site selected. Press 's' to pick one.",
            (Some(_), true) => "Loading cases…",
            (Some(_), false) => "No cases. Press 'n' to create one.",
        };
        let msg = Line::from(Span::styled(hint, Style::default().fg(COLOR_TEXT_DIMMED)));
        frame.render_widget(Paragraph::new(msg), area);
        return;
    }

    let header_height = 1;
    let content_height = area.height.saturating_sub(header_height as u16) as usize;

    let center = content_height / 2;
    let start = state.selected.saturating_sub(center);
    let end = (start + content_height).min(state.cases.len());
    let start = end.saturating_sub(content_height);

    let mut lines: Vec<Line> = Vec::with_capacity(content_height + header_height);
    lines.push(render_header_row(area.width));
    lines.extend(
        state
            .cases
            .iter()
            .enumerate()
            .skip(start)
            .take(content_height)
            .map(|(idx, case)| render_case_row(case, idx == state.selected, area.width)),
    );

    frame.render_widget(Paragraph::new(lines), area);
}

fn pad(s: &str, width: usize) -> String {
    format!("{:<width$}", truncate(s, width), width = width)
}

fn render_header_row(width: u16) -> Line<'static> {
    let header_style = Style::default()
        .fg(COLOR_TEXT_DIMMED)
        .add_modifier(Modifier::BOLD);
    let spacing = " ".repeat(SPACING);

    if (width as usize) < FIXED_WIDTH / 2 {
        return Line::from(Span::styled("CASE", header_style));
    }

    let name_width = (width as usize).saturating_sub(FIXED_WIDTH).max(4);
    let columns = [
        pad("ID", ID_WIDTH),
        pad("NAME", name_width),
        pad("CREATE", TASK_WIDTH),
        pad("RUN", TASK_WIDTH),
        pad("CREATED", CREATED_WIDTH),
        pad("RES", RES_WIDTH),
        pad("COMPSET", COMPSET_WIDTH),
    ];

    let mut spans = vec![Span::styled(" ".repeat(MARKER_WIDTH), header_style)];
    for (idx, column) in columns.into_iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled(spacing.clone(), header_style));
        }
        spans.push(Span::styled(column, header_style));
    }
    Line::from(spans)
}

fn task_color(label: &str) -> Color {
    match label {
        "SUCCESS" => COLOR_TASK_SUCCESS,
        "FAILURE" | "REVOKED" => COLOR_TASK_FAILURE,
        "PENDING" | "STARTED" => COLOR_TASK_ACTIVE,
        _ => COLOR_TEXT_DIMMED,
    }
}

/// `create failed: <error>` and `run failed: <error>` for the tasks that
/// report one.
fn task_error_spans(case: &CaseView) -> Vec<Span<'static>> {
    let style = Style::default().fg(COLOR_TASK_FAILURE);
    [("create", &case.create_error), ("run", &case.run_error)]
        .into_iter()
        .filter_map(|(task, error)| {
            error
                .as_deref()
                .filter(|e| !e.trim().is_empty())
                .map(|e| Span::styled(format!("{} failed: {}", task, e.trim()), style))
        })
        .collect()
}

/// Leading marker: `↓` while downloading, `●` while a poller watches the case.
fn row_marker(case: &CaseView) -> &'static str {
    if case.downloading {
        "↓ "
    } else if case.watching {
        "● "
    } else {
        "  "
    }
}

/// Columns: marker | ID | NAME (flex) | CREATE | RUN | CREATED | RES | COMPSET
fn render_case_row(case: &CaseView, is_selected: bool, width: u16) -> Line<'static> {
    if (width as usize) < FIXED_WIDTH / 2 {
        let style = if is_selected {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        let label = format!("{} {}", case.id, case.name);
        return Line::from(Span::styled(truncate(&label, width as usize), style));
    }

    let name_width = (width as usize).saturating_sub(FIXED_WIDTH).max(4);
    let spacing = " ".repeat(SPACING);

    let (marker_style, primary_style, secondary_style, create_style, run_style) = if is_selected {
        let selected = Style::default().add_modifier(Modifier::REVERSED);
        (selected, selected, selected, selected, selected)
    } else {
        (
            Style::default().fg(COLOR_TASK_ACTIVE),
            Style::default(),
            Style::default().fg(COLOR_TEXT_DIMMED),
            Style::default().fg(task_color(&case.create)),
            Style::default().fg(task_color(&case.run)),
        )
    };

    Line::from(vec![
        Span::styled(row_marker(case), marker_style),
        Span::styled(pad(&case.id.to_string(), ID_WIDTH), secondary_style),
        Span::styled(spacing.clone(), primary_style),
        Span::styled(pad(&case.name, name_width), primary_style),
        Span::styled(spacing.clone(), primary_style),
        Span::styled(pad(&case.create, TASK_WIDTH), create_style),
        Span::styled(spacing.clone(), primary_style),
        Span::styled(pad(&case.run, TASK_WIDTH), run_style),
        Span::styled(spacing.clone(), primary_style),
        Span::styled(pad(&case.created, CREATED_WIDTH), secondary_style),
        Span::styled(spacing.clone(), primary_style),
        Span::styled(pad(&case.res, RES_WIDTH), secondary_style),
        Span::styled(spacing, primary_style),
        Span::styled(pad(&case.compset, COMPSET_WIDTH), secondary_style),
    ])
}

/// Centered rect of at most `width` x `height` inside `area`.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn render_variables(frame: &mut Frame, view: &VariablesView, case: Option<&CaseView>, area: Rect) {
    let label_width = view
        .rows
        .iter()
        .map(|r| r.label.chars().count())
        .max()
        .unwrap_or(0)
        .min(32);

    let mut lines = vec![
        Line::from(vec![
            Span::styled(
                format!("Case {} ", view.case_id),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::styled(view.name.clone(), Style::default().fg(COLOR_TEXT_DIMMED)),
        ]),
    ];
    let errors = case.map(task_error_spans).unwrap_or_default();
    lines.extend(errors.into_iter().map(Line::from));
    lines.push(Line::from(""));

    if view.rows.is_empty() {
        lines.push(Line::from(Span::styled(
            "No variables",
            Style::default().fg(COLOR_TEXT_MUTED),
        )));
    }
    for row in &view.rows {
        lines.push(Line::from(vec![
            Span::styled(pad(&row.label, label_width), Style::default().fg(COLOR_TEXT_DIMMED)),
            Span::raw("  "),
            Span::raw(row.value.clone()),
        ]));
    }

    let content_width = lines.iter().map(Line::width).max().unwrap_or(0) as u16;
    let popup = centered(area, content_width + 4, lines.len() as u16 + 2);

    frame.render_widget(Clear, popup);
    let inner = Rect {
        x: popup.x + 2,
        y: popup.y + 1,
        width: popup.width.saturating_sub(4),
        height: popup.height.saturating_sub(2),
    };
    frame.render_widget(Paragraph::new(lines), inner);
}

/// Single-line notification on the bottom line of the screen.
fn render_notification(frame: &mut Frame, notification: &Notification, area: Rect) {
    let notification_area = Rect {
        x: area.x,
        y: area.y + area.height.saturating_sub(1),
        width: area.width,
        height: 1,
    };

    frame.render_widget(Clear, notification_area);

    let line = match notification.level {
        NotificationLevel::Error => Line::from(vec![
            Span::styled(
                "Error: ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                notification.message.clone(),
                Style::default().fg(Color::Red),
            ),
        ]),
        NotificationLevel::Info => Line::from(Span::styled(
            notification.message.clone(),
            Style::default().fg(Color::Green),
        )),
    };

    frame.render_widget(Paragraph::new(line), notification_area);
}
