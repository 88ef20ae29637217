//! Shared UI components (status bar, keybinds pane, notice).
//!
use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use std::collections::{BTreeMap, BTreeSet};

use crate::app::keymap::{KeyAction, Keymap};
use crate::app::{AppState, InputMode};
use crate::modal::Notice;

/// Render the bottom status bar with mode, counts and the last status message.
pub fn render_status_bar(f: &mut Frame, area: Rect, app: &AppState) {
    let mode = match app.input_mode() {
        InputMode::Normal => "NORMAL",
        InputMode::Search => "SEARCH",
        InputMode::Modal => "MODAL",
    };
    let filter = if app.applied_query.is_empty() {
        String::new()
    } else {
        format!("  filter:\"{}\"", app.applied_query)
    };
    let msg = format!(
        "mode: {mode}  users:{}  groups:{}  locations:{}  devices:{}  rows/page:{}{filter}  {}",
        app.users.len(),
        app.groups.len(),
        app.locations.len(),
        app.devices.len(),
        app.rows_per_page,
        app.status,
    );
    let p = Paragraph::new(msg).style(Style::default().fg(app.theme.status_fg).bg(app.theme.status_bg));
    f.render_widget(p, area);
}

fn key_label(mods: KeyModifiers, code: KeyCode) -> String {
    match code {
        KeyCode::BackTab => "Shift+Tab".to_string(),
        _ => Keymap::format_key(mods, code),
    }
}

fn action_label(action: KeyAction) -> Option<(&'static str, &'static str)> {
    use KeyAction::*;
    let entry = match action {
        Quit => ("General", "Quit"),
        StartSearch => ("General", "Search"),
        Reload => ("General", "Reload"),
        SwitchTab => ("General", "Next tab"),
        PrevTab => ("General", "Previous tab"),
        ToggleKeybindsPane => ("General", "Toggle keybindings"),
        New => ("Records", "New"),
        EnterAction => ("Records", "Edit"),
        DeleteSelection => ("Records", "Delete user"),
        EditMembers => ("Records", "Edit members"),
        AddDevice => ("Records", "Add device"),
        MoveUp => ("Navigation", "Move up"),
        MoveDown => ("Navigation", "Move down"),
        MoveLeftPage | PageUp => ("Navigation", "Page up"),
        MoveRightPage | PageDown => ("Navigation", "Page down"),
        Ignore => return None,
    };
    Some(entry)
}

/// Render the right-side keybinds viewer with grouped sections.
pub fn render_keybinds_panel(f: &mut Frame, area: Rect, app: &AppState) {
    let block = Block::default()
        .title("Keybindings")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.border));
    let inner = block.inner(area);

    let mut sections: BTreeMap<&'static str, BTreeMap<&'static str, BTreeSet<String>>> = BTreeMap::new();
    for ((mods, code), action) in app.keymap.all_bindings() {
        if let Some((section, label)) = action_label(action) {
            sections.entry(section).or_default().entry(label).or_default().insert(key_label(mods, code));
        }
    }
    let dialog: [(&str, &str); 5] = [
        ("Next / previous field", "Tab, Shift+Tab"),
        ("Submit", "Enter, Ctrl+s"),
        ("Toggle / cycle", "Space, Left, Right"),
        ("Selected only", "Tab (members)"),
        ("Close", "Esc"),
    ];

    let max_label = sections
        .values()
        .flat_map(|s| s.keys().map(|k| k.len()))
        .chain(dialog.iter().map(|(k, _)| k.len()))
        .max()
        .unwrap_or(0);
    let sep = " │ ";
    let col1_w = max_label.min((inner.width as usize).saturating_sub(sep.len() + 8));
    let row = |label: &str, value: String| -> Line<'static> {
        let lbl: String = label.chars().take(col1_w).collect();
        Line::from(vec![
            Span::raw(format!("  {lbl:>col1_w$}{sep}")),
            Span::styled(value, Style::default().add_modifier(Modifier::ITALIC)),
        ])
    };

    let mut lines: Vec<Line> = Vec::new();
    for (section, entries) in &sections {
        lines.push(Line::from(Span::styled(format!("{section}:"), Style::default().add_modifier(Modifier::BOLD))));
        for (label, keys) in entries {
            lines.push(row(label, keys.iter().cloned().collect::<Vec<_>>().join(", ")));
        }
        lines.push(Line::raw(""));
    }
    lines.push(Line::from(Span::styled("Dialogs:", Style::default().add_modifier(Modifier::BOLD))));
    for (label, value) in dialog {
        lines.push(row(label, value.to_string()));
    }

    let p = Paragraph::new(lines).wrap(Wrap { trim: false });
    f.render_widget(block, area);
    f.render_widget(p, inner);
}

/// Compute a rectangle centered within `area` with a maximum size.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

pub fn render_notice(f: &mut Frame, area: Rect, app: &AppState, notice: &Notice, style: Style) {
    let max_w = area.width.saturating_sub(6).max(30);
    let min_w = 50u16.min(max_w);
    let approx_lines = (notice.message.len() as u16 / (min_w.saturating_sub(4).max(10))).max(1);
    let max_h = area.height.saturating_sub(6).max(5);
    let height = (approx_lines + 5).min(max_h).max(6);
    let rect = centered_rect(min_w, height, area);
    let lines = vec![
        Line::styled(notice.message.clone(), Style::default().fg(app.theme.error)),
        Line::raw(""),
        Line::styled("Enter/Esc: close", Style::default().fg(app.theme.muted)),
    ];
    let p = Paragraph::new(lines).wrap(Wrap { trim: false }).style(style).block(
        Block::default()
            .title(notice.title.clone())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(app.theme.error)),
    );
    f.render_widget(Clear, rect);
    f.render_widget(p, rect);
}
