use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table};

use crate::app::{ActiveTab, AppState};

/// The page of `len` rows that contains `selected`.
fn page_bounds(selected: usize, rows_per_page: usize, len: usize) -> (usize, usize) {
    let per = rows_per_page.max(1);
    let start = ((selected / per) * per).min(len);
    (start, (start + per).min(len))
}

fn table<'a>(
    app: &AppState,
    title: String,
    header: Vec<&'a str>,
    widths: Vec<Constraint>,
    rows: Vec<Vec<String>>,
    start: usize,
) -> Table<'a> {
    let selected = app.selected_index();
    let rows = rows.into_iter().enumerate().map(|(i, cells)| {
        let style = if start + i == selected {
            Style::default().fg(app.theme.highlight_fg).bg(app.theme.highlight_bg).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(app.theme.text)
        };
        Row::new(cells.into_iter().map(Cell::from)).style(style)
    });
    let header = Row::new(header).style(Style::default().fg(app.theme.title).add_modifier(Modifier::BOLD));
    Table::new(rows, widths)
        .header(header)
        .block(Block::default().title(title).borders(Borders::ALL).border_style(Style::default().fg(app.theme.border)))
        .column_spacing(1)
}

/// Render the table for the active tab, updating `rows_per_page` from the area.
pub fn render_page(f: &mut Frame, area: Rect, app: &mut AppState) {
    let body_height = area.height.saturating_sub(3) as usize;
    if body_height > 0 {
        app.rows_per_page = body_height;
    }
    let len = app.row_count();
    let (start, end) = page_bounds(app.selected_index(), app.rows_per_page, len);
    let pages = len.div_ceil(app.rows_per_page.max(1)).max(1);
    let page = start / app.rows_per_page.max(1) + 1;
    let title = format!("{} ({page}/{pages})", app.active_tab.title());

    if len == 0 {
        let empty = if app.applied_query.is_empty() { "Nothing here yet. Press n to create one." } else { "No results" };
        let p = Paragraph::new(empty).style(Style::default().fg(app.theme.muted)).block(
            Block::default().title(title).borders(Borders::ALL).border_style(Style::default().fg(app.theme.border)),
        );
        f.render_widget(p, area);
        return;
    }

    let widget = match app.active_tab {
        ActiveTab::Users => {
            let rows = app.users[start..end]
                .iter()
                .map(|u| {
                    vec![
                        u.username.clone(),
                        u.full_name(),
                        u.email.clone(),
                        u.phone.clone().unwrap_or_default(),
                        if u.is_active { "active" } else { "disabled" }.to_string(),
                    ]
                })
                .collect();
            let widths = vec![
                Constraint::Length(18),
                Constraint::Percentage(30),
                Constraint::Percentage(30),
                Constraint::Length(16),
                Constraint::Length(9),
            ];
            table(app, title, vec!["USERNAME", "NAME", "EMAIL", "PHONE", "STATUS"], widths, rows, start)
        }
        ActiveTab::Groups => {
            let rows = app.groups[start..end]
                .iter()
                .map(|g| {
                    vec![
                        g.name.clone(),
                        if g.is_admin { "yes" } else { "" }.to_string(),
                        g.members.len().to_string(),
                        g.members.join(", "),
                    ]
                })
                .collect();
            let widths = vec![
                Constraint::Length(20),
                Constraint::Length(6),
                Constraint::Length(8),
                Constraint::Percentage(100),
            ];
            table(app, title, vec!["GROUP", "ADMIN", "MEMBERS", "USERS"], widths, rows, start)
        }
        ActiveTab::Locations => {
            let rows = app.locations[start..end]
                .iter()
                .map(|l| {
                    vec![
                        l.name.clone(),
                        format!("{}:{}", l.endpoint, l.port),
                        l.network.clone(),
                        l.location_mfa_mode.as_str().to_string(),
                        l.service_location_mode.as_str().to_string(),
                    ]
                })
                .collect();
            let widths = vec![
                Constraint::Length(20),
                Constraint::Percentage(35),
                Constraint::Length(20),
                Constraint::Length(10),
                Constraint::Length(12),
            ];
            table(app, title, vec!["LOCATION", "ENDPOINT", "NETWORK", "MFA", "SERVICE"], widths, rows, start)
        }
        ActiveTab::Devices => {
            let location_name = |id: u64| {
                app.locations_all.iter().find(|l| l.id == id).map_or_else(|| id.to_string(), |l| l.name.clone())
            };
            let rows = app.devices[start..end]
                .iter()
                .map(|d| vec![d.name.clone(), d.username.clone(), location_name(d.location_id), d.wireguard_ip.clone()])
                .collect();
            let widths = vec![
                Constraint::Length(20),
                Constraint::Length(18),
                Constraint::Length(20),
                Constraint::Percentage(100),
            ];
            table(app, title, vec!["DEVICE", "USER", "LOCATION", "IP"], widths, rows, start)
        }
    };
    f.render_widget(widget, area);
}

#[cfg(test)]
mod tests {
    use super::page_bounds;

    #[test]
    fn page_contains_selection() {
        assert_eq!(page_bounds(0, 10, 25), (0, 10));
        assert_eq!(page_bounds(12, 10, 25), (10, 20));
        assert_eq!(page_bounds(24, 10, 25), (20, 25));
        assert_eq!(page_bounds(0, 0, 0), (0, 0));
    }
}
