pub mod components;
pub mod dialogs;
pub mod pages;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use crate::app::{ActiveTab, AppState, Dialog, InputMode};
use crate::modal::ModalPhase;

pub fn render(f: &mut Frame, app: &mut AppState) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(5), Constraint::Length(1)])
        .split(f.area());

    let mut spans: Vec<Span> = Vec::new();
    for tab in ActiveTab::ALL {
        let label = format!(" {} ", tab.title());
        if tab == app.active_tab {
            spans.push(Span::styled(
                format!("[{}]", label.trim()),
                Style::default().fg(app.theme.highlight_fg).add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::raw(label));
        }
        spans.push(Span::raw(" "));
    }
    let prompt = match app.input_mode() {
        InputMode::Search => format!("  Search: {}_", app.search_query),
        _ if !app.applied_query.is_empty() => format!("  Filter: {}", app.applied_query),
        _ => String::new(),
    };
    spans.push(Span::raw(prompt));
    let header = Paragraph::new(Line::from(spans))
        .block(
            Block::default()
                .title("wgadm")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(app.theme.border)),
        )
        .style(Style::default().fg(app.theme.header_fg).bg(app.theme.header_bg));
    f.render_widget(header, root[0]);

    if app.show_keybinds {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(root[1]);
        pages::render_page(f, body[0], app);
        components::render_keybinds_panel(f, body[1], app);
    } else {
        pages::render_page(f, root[1], app);
    }

    components::render_status_bar(f, root[2], app);

    let app: &AppState = app;
    let area = f.area();
    for name in &app.stack {
        let Some(dialog) = app.dialogs.get(name) else {
            continue;
        };
        let style = match app.modals.phase(*name) {
            ModalPhase::Closing => Style::default().add_modifier(Modifier::DIM),
            _ => Style::default(),
        };
        match dialog {
            Dialog::Form(view) => dialogs::render_form(f, area, app, view, style),
            Dialog::Members(view) => dialogs::render_members(f, area, app, view, style),
            Dialog::Notice(notice) => components::render_notice(f, area, app, notice, style),
        }
    }
}
