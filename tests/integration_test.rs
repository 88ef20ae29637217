// Integration tests for wgadm

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::sync::Arc;
use std::time::{Duration, Instant};
use ratatui::Terminal;
use ratatui::backend::TestBackend;
use wgadm::api::memory::Store;
use wgadm::api::{AdminApi, MemoryApi, User};
use wgadm::app::update::handle_key;
use wgadm::app::{ActiveTab, AppState, Dialog, InputMode};
use wgadm::form::FieldValue;
use wgadm::modal::{ModalName, ModalPhase, kinds};

/// Base64 of 32 zero bytes.
const ZERO_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

fn app() -> AppState {
    AppState::with_api(Arc::new(MemoryApi::default()))
}

fn press(app: &mut AppState, code: KeyCode) {
    handle_key(app, KeyEvent::new(code, KeyModifiers::NONE), Instant::now());
}

fn type_str(app: &mut AppState, s: &str) {
    for c in s.chars() {
        press(app, KeyCode::Char(c));
    }
}

/// Tick until the submission of `name` has resolved.
fn settle(app: &mut AppState, name: ModalName) {
    for _ in 0..400 {
        app.tick(Instant::now());
        let busy = app.dialogs.get(&name).and_then(Dialog::session).is_some_and(|s| s.is_submitting());
        if !busy {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("submission of {name} did not resolve");
}

/// Draw-and-tick once so closing dialogs are released.
fn frame(app: &mut AppState) {
    app.mark_drawn();
    app.tick(Instant::now());
}

// 1) Creating a group closes the dialog only after its closing frame
#[test]
fn add_group_submits_and_closes_after_transition() {
    let mut app = app();
    app.active_tab = ActiveTab::Groups;
    press(&mut app, KeyCode::Char('n'));
    assert_eq!(app.input_mode(), InputMode::Modal);
    assert_eq!(app.active_dialog(), Some(ModalName::AddGroup));

    type_str(&mut app, "ops");
    press(&mut app, KeyCode::Enter);
    settle(&mut app, ModalName::AddGroup);

    // Success closed the modal; it stays mounted until drawn once.
    assert_eq!(app.modals.phase(ModalName::AddGroup), ModalPhase::Closing);
    assert!(app.dialogs.contains_key(&ModalName::AddGroup));
    assert_eq!(app.input_mode(), InputMode::Normal);
    assert!(app.groups.iter().any(|g| g.name == "ops"));

    frame(&mut app);
    assert_eq!(app.modals.phase(ModalName::AddGroup), ModalPhase::Closed);
    assert!(app.dialogs.is_empty());
    assert!(app.stack.is_empty());
}

// 2) A server conflict lands on the named field and keeps the form open
#[test]
fn server_conflict_is_shown_on_field() {
    let mut app = app();
    app.active_tab = ActiveTab::Groups;
    press(&mut app, KeyCode::Char('n'));
    type_str(&mut app, "staff");
    press(&mut app, KeyCode::Enter);
    settle(&mut app, ModalName::AddGroup);

    assert_eq!(app.active_dialog(), Some(ModalName::AddGroup));
    let Some(Dialog::Form(view)) = app.dialogs.get(&ModalName::AddGroup) else {
        panic!("add group dialog missing");
    };
    assert_eq!(view.session.visible_error("name"), Some("group 'staff' already exists"));

    // Editing the field clears the server error.
    press(&mut app, KeyCode::Backspace);
    let Some(Dialog::Form(view)) = app.dialogs.get(&ModalName::AddGroup) else {
        panic!("add group dialog missing");
    };
    assert_eq!(view.session.visible_error("name"), None);
}

// 3) Client-side validation blocks the request
#[test]
fn invalid_form_is_not_dispatched() {
    let mut app = app();
    app.active_tab = ActiveTab::Groups;
    press(&mut app, KeyCode::Char('n'));
    press(&mut app, KeyCode::Enter);
    let Some(Dialog::Form(view)) = app.dialogs.get(&ModalName::AddGroup) else {
        panic!("add group dialog missing");
    };
    assert!(!view.session.is_submitting());
    assert_eq!(view.session.submit_count(), 1);
    assert!(view.session.visible_error("name").is_some());
    assert_eq!(app.groups.len(), 2);
}

// 4) Failures without a field open a notice above the form
#[test]
fn unmapped_failure_opens_notice() {
    let mut app = app();
    let ghost = User {
        username: "ghost".into(),
        first_name: "Casper".into(),
        last_name: String::new(),
        email: "ghost@example.com".into(),
        phone: None,
        is_active: true,
    };
    app.registry.open::<kinds::DeleteUser>(ghost);
    app.sync_modals();
    press(&mut app, KeyCode::Enter);
    settle(&mut app, ModalName::DeleteUser);

    assert_eq!(app.active_dialog(), Some(ModalName::Notice));
    let Some(Dialog::Notice(notice)) = app.dialogs.get(&ModalName::Notice) else {
        panic!("notice missing");
    };
    assert!(notice.message.contains("ghost"));

    press(&mut app, KeyCode::Esc);
    frame(&mut app);
    assert!(!app.dialogs.contains_key(&ModalName::Notice));
    assert_eq!(app.active_dialog(), Some(ModalName::DeleteUser));
}

// 5) Membership dialog toggles through the selection and saves
#[test]
fn members_dialog_saves_selection() {
    let mut app = app();
    app.active_tab = ActiveTab::Groups;
    app.selected[ActiveTab::Groups.index()] = 1;
    assert_eq!(app.selected_group().map(|g| g.name.as_str()), Some("staff"));
    press(&mut app, KeyCode::Char('m'));
    assert_eq!(app.active_dialog(), Some(ModalName::EditGroupMembers));

    // Options sort by label, so the cursor starts on Alice; drop her and add admin.
    press(&mut app, KeyCode::Char(' '));
    press(&mut app, KeyCode::Down);
    press(&mut app, KeyCode::Down);
    press(&mut app, KeyCode::Char(' '));
    press(&mut app, KeyCode::Enter);
    settle(&mut app, ModalName::EditGroupMembers);

    let staff = app.groups.iter().find(|g| g.name == "staff").map(|g| g.members.clone());
    assert_eq!(staff, Some(vec!["admin".to_string(), "bob".to_string()]));
}

// 6) Page search applies after the debounce and Esc clears it
#[test]
fn page_search_is_debounced() {
    let mut app = app();
    let start = Instant::now();
    press(&mut app, KeyCode::Char('/'));
    assert_eq!(app.input_mode(), InputMode::Search);
    for c in "ali".chars() {
        handle_key(&mut app, KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE), start);
    }
    app.tick(start);
    assert_eq!(app.users.len(), 3);

    app.tick(start + Duration::from_millis(250));
    assert_eq!(app.users.len(), 1);
    assert_eq!(app.users[0].username, "alice");

    press(&mut app, KeyCode::Esc);
    assert_eq!(app.input_mode(), InputMode::Normal);
    assert_eq!(app.users.len(), 3);
}

// 7) Opening a modal takes focus away from the page search
#[test]
fn opening_modal_clears_search_focus() {
    let mut app = app();
    press(&mut app, KeyCode::Char('/'));
    assert_eq!(app.input_mode(), InputMode::Search);
    app.registry.open_empty::<kinds::AddUser>();
    app.sync_modals();
    assert_eq!(app.input_mode(), InputMode::Modal);
    press(&mut app, KeyCode::Esc);
    frame(&mut app);
    assert_eq!(app.input_mode(), InputMode::Normal);
}

// 8) Devices get the next free address of their location
#[test]
fn add_device_from_location_tab() {
    let api = Arc::new(MemoryApi::default());
    let mut app = AppState::with_api(api.clone());
    app.active_tab = ActiveTab::Locations;
    press(&mut app, KeyCode::Char('d'));
    let Some(Dialog::Form(view)) = app.dialogs.get_mut(&ModalName::AddDevice) else {
        panic!("device dialog missing");
    };
    assert_eq!(view.session.values().get("location_id").map(|v| v.as_str()), Some("1"));
    assert_eq!(view.session.values().get("wireguard_ip").map(|v| v.as_str()), Some("10.10.0.2"));

    view.session.input("name", FieldValue::text("phone"));
    view.session.input("wireguard_pubkey", FieldValue::text(ZERO_KEY));
    handle_key(&mut app, KeyEvent::new(KeyCode::Char('s'), KeyModifiers::CONTROL), Instant::now());
    settle(&mut app, ModalName::AddDevice);

    let devices = api.list_devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].wireguard_ip, "10.10.0.2");
    assert_eq!(devices[0].username, "admin");
}

// 9) A membership rejection is shown inside the members dialog
#[test]
fn member_rejection_is_shown_in_dialog() {
    let mut store = Store::demo();
    store.groups[1].members.push("ghost".into());
    let mut app = AppState::with_api(Arc::new(MemoryApi::new(store)));
    app.active_tab = ActiveTab::Groups;
    app.selected[ActiveTab::Groups.index()] = 1;
    press(&mut app, KeyCode::Char('m'));
    press(&mut app, KeyCode::Enter);
    settle(&mut app, ModalName::EditGroupMembers);

    assert_eq!(app.active_dialog(), Some(ModalName::EditGroupMembers));
    let Some(Dialog::Members(view)) = app.dialogs.get(&ModalName::EditGroupMembers) else {
        panic!("members dialog missing");
    };
    assert_eq!(view.session.visible_error("members"), Some("unknown user 'ghost'"));
    assert_eq!(app.status, "unknown user 'ghost'");

    let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
    terminal.draw(|f| wgadm::ui::render(f, &mut app)).unwrap();
    let screen: String = terminal.backend().buffer().content().iter().map(|c| c.symbol()).collect();
    assert!(screen.contains("unknown user 'ghost'"));
}
