//! Rendering of form and membership dialogs.
//!
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap};

use crate::app::AppState;
use crate::app::forms::{FormView, MEMBERS_FIELD, MembersView};
use crate::form::{FieldKind, FieldSpec, FieldValue, FormSession};
use crate::selection::EMPTY_MESSAGE;
use crate::ui::components::centered_rect;

fn field_text(spec: &FieldSpec, value: Option<&FieldValue>, path_input: &str, focused: bool) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match (&spec.kind, value) {
        (FieldKind::Input { secret: true }, v) => "*".repeat(v.as_str().chars().count()),
        (FieldKind::Select { .. } | FieldKind::Radio { .. }, v) => format!("< {} >", spec.choice_label(v)),
        (FieldKind::Checkbox, v) => String::from(if v.as_flag() { "[x]" } else { "[ ]" }),
        (FieldKind::Toggle, v) => String::from(if v.as_flag() { "(on)" } else { "(off)" }),
        (FieldKind::Upload, FieldValue::File(Some(upload))) if !focused || path_input.is_empty() => {
            format!("{} ({} bytes)", upload.name, upload.contents.len())
        }
        (FieldKind::Upload, _) => format!("path: {path_input}"),
        (FieldKind::Textarea, v) => v.as_str().replace('\n', " ⏎ "),
        (_, v) => v.as_str().to_string(),
    }
}

fn error_lines<'a>(app: &AppState, session: &'a FormSession) -> Vec<Line<'a>> {
    let mut lines = Vec::new();
    if let Some(failure) = session.failure() {
        lines.push(Line::styled(failure, Style::default().fg(app.theme.error)));
    }
    if session.is_submitting() {
        lines.push(Line::styled("Submitting...", Style::default().fg(app.theme.muted)));
    }
    lines
}

pub fn render_form(f: &mut Frame, area: Rect, app: &AppState, view: &FormView, style: Style) {
    let mut lines: Vec<Line> = Vec::new();
    if let Some(intro) = &view.intro {
        lines.push(Line::styled(intro.clone(), Style::default().fg(app.theme.text)));
        lines.push(Line::raw(""));
    }
    let label_w = view.fields.iter().map(|s| s.label.chars().count()).max().unwrap_or(0);
    for (idx, spec) in view.fields.iter().enumerate() {
        let focused = idx == view.cursor;
        let marker = if focused { "▶ " } else { "  " };
        let text = field_text(spec, view.session.value(spec.name), &view.path_input, focused);
        let label_style = if focused {
            Style::default().fg(app.theme.highlight_fg).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(app.theme.text)
        };
        lines.push(Line::from(vec![
            Span::raw(marker),
            Span::styled(format!("{:<label_w$}", spec.label), label_style),
            Span::raw("  "),
            Span::styled(text, Style::default().fg(app.theme.text)),
        ]));
        if let Some(err) = view.session.visible_error(spec.name) {
            lines.push(Line::styled(
                format!("    {err}"),
                Style::default().fg(app.theme.error).add_modifier(Modifier::ITALIC),
            ));
        }
    }
    lines.push(Line::raw(""));
    lines.extend(error_lines(app, &view.session));
    lines.push(Line::styled(
        format!("Enter: {}  Tab: next field  Esc: cancel", view.submit_label),
        Style::default().fg(app.theme.muted),
    ));

    let width = area.width.saturating_sub(10).clamp(40, 80);
    let height = (lines.len() as u16 + 2).min(area.height.saturating_sub(2)).max(6);
    let rect = centered_rect(width, height, area);
    let p = Paragraph::new(lines).wrap(Wrap { trim: false }).style(style).block(
        Block::default()
            .title(view.title.clone())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(app.theme.border)),
    );
    f.render_widget(Clear, rect);
    f.render_widget(p, rect);
}

pub fn render_members(f: &mut Frame, area: Rect, app: &AppState, view: &MembersView, style: Style) {
    let width = area.width.saturating_sub(10).clamp(40, 70);
    let height = area.height.saturating_sub(6).clamp(10, 24);
    let rect = centered_rect(width, height, area);
    f.render_widget(Clear, rect);

    let block = Block::default()
        .title(format!("Members of {}", view.group))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.border));
    let inner = block.inner(rect);
    f.render_widget(block, rect);

    let selection = view.selection();
    let scope = if view.section.selected_only() { "selected" } else { "all" };
    let header = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("Search: ", Style::default().fg(app.theme.muted)),
            Span::styled(view.section.query().to_string(), Style::default().fg(app.theme.text)),
        ]),
        Line::styled(
            format!("{} selected, showing {scope}", selection.len()),
            Style::default().fg(app.theme.muted),
        ),
    ])
    .style(style);
    let header_rect = Rect { height: 2u16.min(inner.height), ..inner };
    f.render_widget(header, header_rect);

    let mut footer: Vec<Line> = error_lines(app, &view.session);
    if let Some(err) = view.session.visible_error(MEMBERS_FIELD) {
        footer.insert(0, Line::styled(err, Style::default().fg(app.theme.error)));
    }
    footer.push(Line::styled(
        "Space: toggle  Tab: selected only  Enter: save  Esc: cancel",
        Style::default().fg(app.theme.muted),
    ));
    let footer_h = (footer.len() as u16).min(inner.height.saturating_sub(header_rect.height));
    let footer_rect = Rect { y: inner.y + inner.height - footer_h, height: footer_h, ..inner };
    f.render_widget(Paragraph::new(footer).style(style), footer_rect);

    let list_rect = Rect {
        y: inner.y + header_rect.height,
        height: inner.height.saturating_sub(header_rect.height + footer_h),
        ..inner
    };
    if view.section.is_empty(&selection) {
        let p = Paragraph::new(EMPTY_MESSAGE).style(style.fg(app.theme.muted));
        f.render_widget(p, list_rect);
        return;
    }
    let visible = view.section.visible(&selection);
    let capacity = (list_rect.height as usize).max(1);
    let cursor = view.section.cursor();
    let start = cursor.saturating_sub(capacity - 1).min(visible.len());
    let end = (start + capacity).min(visible.len());
    let items: Vec<ListItem> = visible[start..end]
        .iter()
        .enumerate()
        .map(|(i, option)| {
            let marker = if start + i == cursor { "▶ " } else { "  " };
            let check = if selection.contains(&option.id) { "[x] " } else { "[ ] " };
            let item_style = if start + i == cursor {
                Style::default().fg(app.theme.highlight_fg).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(app.theme.text)
            };
            ListItem::new(format!("{marker}{check}{}", option.label)).style(item_style)
        })
        .collect();
    f.render_widget(List::new(items).style(style), list_rect);
}
