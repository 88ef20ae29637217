use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::Backend;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::app::forms::DialogKey;
use crate::app::keymap::KeyAction;
use crate::app::{ActiveTab, AppState, Dialog, InputMode, PAGE_SEARCH};
use crate::form::SubmitAttempt;
use crate::modal::{DeviceSeed, kinds};
use crate::search::apply_search;
use crate::ui;

/// Draw, read one key if any, then advance background work. Returns when
/// the user quits.
pub fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut AppState) -> Result<()> {
    loop {
        terminal.draw(|f| ui::render(f, app))?;
        app.mark_drawn();

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key, Instant::now());
                }
            }
        }
        app.tick(Instant::now());

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Route one key press according to the current input mode.
pub fn handle_key(app: &mut AppState, key: KeyEvent, now: Instant) {
    match app.input_mode() {
        InputMode::Modal => handle_dialog_key(app, key, now),
        InputMode::Search => handle_search_key(app, key, now),
        InputMode::Normal => handle_page_key(app, key),
    }
}

fn handle_dialog_key(app: &mut AppState, key: KeyEvent, now: Instant) {
    let Some(name) = app.active_dialog() else {
        return;
    };
    let outcome = match app.dialogs.get_mut(&name) {
        Some(Dialog::Form(view)) => view.handle_key(key),
        Some(Dialog::Members(view)) => view.handle_key(key, now),
        Some(Dialog::Notice(_)) => match key.code {
            KeyCode::Esc | KeyCode::Enter => DialogKey::Close,
            _ => DialogKey::Ignored,
        },
        None => return,
    };
    match outcome {
        DialogKey::Handled | DialogKey::Ignored => {}
        DialogKey::Close => {
            app.registry.close(name);
        }
        DialogKey::Submit => {
            let attempt = app.dialogs.get_mut(&name).and_then(|d| d.session_mut()).map(|s| s.handle_submit());
            match attempt {
                Some(SubmitAttempt::Invalid) => app.status = "Fix the highlighted fields".to_string(),
                Some(SubmitAttempt::Busy) => app.status = "Still submitting".to_string(),
                Some(SubmitAttempt::Dispatched) => app.status = "Submitting...".to_string(),
                None => {}
            }
            debug!(modal = name.as_str(), ?attempt, "submit requested");
        }
        DialogKey::Failed(message) => app.notify_failure(message),
    }
}

fn handle_search_key(app: &mut AppState, key: KeyEvent, now: Instant) {
    match key.code {
        KeyCode::Esc => {
            app.search_query.clear();
            app.search_debounce.cancel();
            app.applied_query.clear();
            apply_search(app);
            app.focus().blur();
        }
        KeyCode::Enter => {
            app.search_debounce.cancel();
            app.applied_query = app.search_query.clone();
            apply_search(app);
            app.focus().blur();
        }
        KeyCode::Backspace => {
            app.search_query.pop();
            app.search_debounce.push(app.search_query.clone(), now);
        }
        KeyCode::Char(c) => {
            app.search_query.push(c);
            app.search_debounce.push(app.search_query.clone(), now);
        }
        _ => {}
    }
}

fn clear_search(app: &mut AppState) {
    if app.search_query.is_empty() && app.applied_query.is_empty() {
        return;
    }
    app.search_query.clear();
    app.applied_query.clear();
    app.search_debounce.cancel();
    apply_search(app);
}

fn device_seed(app: &AppState) -> DeviceSeed {
    match app.active_tab {
        ActiveTab::Users => DeviceSeed { username: app.selected_user().map(|u| u.username.clone()), location_id: None },
        ActiveTab::Locations => DeviceSeed { username: None, location_id: app.selected_location().map(|l| l.id) },
        ActiveTab::Groups | ActiveTab::Devices => DeviceSeed::default(),
    }
}

fn handle_page_key(app: &mut AppState, key: KeyEvent) {
    let Some(action) = app.keymap.resolve(&key) else {
        return;
    };
    let tab = app.active_tab.index();
    let rows = app.row_count();
    let page = app.rows_per_page.max(1);
    match action {
        KeyAction::Quit => app.should_quit = true,
        KeyAction::StartSearch => app.focus().focus(PAGE_SEARCH),
        KeyAction::New => match app.active_tab {
            ActiveTab::Users => {
                app.registry.open_empty::<kinds::AddUser>();
            }
            ActiveTab::Groups => {
                app.registry.open_empty::<kinds::AddGroup>();
            }
            ActiveTab::Locations => {
                app.registry.open::<kinds::EditLocation>(None);
            }
            ActiveTab::Devices => {
                app.registry.open::<kinds::AddDevice>(DeviceSeed::default());
            }
        },
        KeyAction::EnterAction => match app.active_tab {
            ActiveTab::Users => {
                if let Some(user) = app.selected_user().cloned() {
                    app.registry.open::<kinds::EditUser>(user);
                }
            }
            ActiveTab::Groups => {
                if let Some(group) = app.selected_group().cloned() {
                    app.registry.open::<kinds::EditGroupMembers>(group);
                }
            }
            ActiveTab::Locations => {
                if let Some(location) = app.selected_location().cloned() {
                    app.registry.open::<kinds::EditLocation>(Some(location));
                }
            }
            ActiveTab::Devices => {}
        },
        KeyAction::DeleteSelection => {
            if app.active_tab == ActiveTab::Users {
                if let Some(user) = app.selected_user().cloned() {
                    app.registry.open::<kinds::DeleteUser>(user);
                }
            }
        }
        KeyAction::EditMembers => {
            if app.active_tab == ActiveTab::Groups {
                if let Some(group) = app.selected_group().cloned() {
                    app.registry.open::<kinds::EditGroupMembers>(group);
                }
            }
        }
        KeyAction::AddDevice => {
            let seed = device_seed(app);
            app.registry.open::<kinds::AddDevice>(seed);
        }
        KeyAction::Reload => {
            app.reload();
            app.status = "Reloaded".to_string();
        }
        KeyAction::SwitchTab => {
            app.active_tab = app.active_tab.next();
            clear_search(app);
        }
        KeyAction::PrevTab => {
            app.active_tab = app.active_tab.prev();
            clear_search(app);
        }
        KeyAction::ToggleKeybindsPane => app.show_keybinds = !app.show_keybinds,
        KeyAction::MoveUp => app.selected[tab] = app.selected[tab].saturating_sub(1),
        KeyAction::MoveDown => {
            if app.selected[tab] + 1 < rows {
                app.selected[tab] += 1;
            }
        }
        KeyAction::PageUp | KeyAction::MoveLeftPage => {
            app.selected[tab] = app.selected[tab].saturating_sub(page);
        }
        KeyAction::PageDown | KeyAction::MoveRightPage => {
            app.selected[tab] = (app.selected[tab] + page).min(rows.saturating_sub(1));
        }
        KeyAction::Ignore => {}
    }
    // Opens land in the hosts synchronously; build their dialogs now so the
    // next key reaches them.
    app.sync_modals();
}
