//! Application state types and entry glue.
//!
//! `AppState` owns the modal registry, one mounted host per catalogue entry,
//! the dialogs those hosts are currently showing, and the page data. The
//! event loop lives in [`update`] and is re-exported as `run`.
//!
pub mod config;
pub mod forms;
pub mod keymap;
pub mod update;

use parking_lot::Mutex;
use ratatui::style::Color;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{AdminApi, ApiResult, Device, Group, Location, User};
use crate::form::{FormSession, SubmitOutcome};
use crate::modal::{
    FocusTracker, HostControl, Modal, ModalHost, ModalName, ModalPhase, ModalRegistry, Notice, kinds,
};
use crate::selection::Debouncer;
use config::ConsoleConfig;
use forms::{FormView, MembersView};
use keymap::Keymap;

/// Focus id of the page search input.
pub const PAGE_SEARCH: &str = "page-search";

/// Top-level active tab in the UI.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ActiveTab {
    Users,
    Groups,
    Locations,
    Devices,
}

impl ActiveTab {
    pub const ALL: [ActiveTab; 4] = [Self::Users, Self::Groups, Self::Locations, Self::Devices];

    pub fn title(self) -> &'static str {
        match self {
            Self::Users => "Users",
            Self::Groups => "Groups",
            Self::Locations => "Locations",
            Self::Devices => "Devices",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Users => 0,
            Self::Groups => 1,
            Self::Locations => 2,
            Self::Devices => 3,
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Who receives keystrokes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
    Modal,
}

/// Color palette for theming the TUI.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Theme {
    pub text: Color,
    pub muted: Color,
    pub title: Color,
    pub border: Color,
    pub header_bg: Color,
    pub header_fg: Color,
    pub status_bg: Color,
    pub status_fg: Color,
    pub highlight_fg: Color,
    pub highlight_bg: Color,
    pub error: Color,
}

impl Theme {
    /// Catppuccin Mocha theme defaults.
    pub fn mocha() -> Self {
        // Palette reference: https://github.com/catppuccin/catppuccin
        Self {
            text: Color::Rgb(0xcd, 0xd6, 0xf4),         // text
            muted: Color::Rgb(0x7f, 0x84, 0x9c),        // overlay1
            title: Color::Rgb(0xcb, 0xa6, 0xf7),        // mauve
            border: Color::Rgb(0x58, 0x5b, 0x70),       // surface2
            header_bg: Color::Rgb(0x31, 0x32, 0x44),    // surface0
            header_fg: Color::Rgb(0xb4, 0xbe, 0xfe),    // lavender
            status_bg: Color::Rgb(0x45, 0x47, 0x5a),    // surface1
            status_fg: Color::Rgb(0xcd, 0xd6, 0xf4),    // text
            highlight_fg: Color::Rgb(0xf9, 0xe2, 0xaf), // yellow
            highlight_bg: Color::Rgb(0x45, 0x47, 0x5a), // surface1
            error: Color::Rgb(0xf3, 0x8b, 0xa8),        // red
        }
    }

    /// Load theme from a key=value file. Unknown or missing keys fall back to `mocha`.
    pub fn from_file(path: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        let mut theme = Self::mocha();

        for raw_line in contents.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else {
                continue;
            };
            let Some(color) = Self::parse_color(val) else {
                debug!(key = key.trim(), "unparsable theme color ignored");
                continue;
            };
            match key.trim() {
                "text" => theme.text = color,
                "muted" => theme.muted = color,
                "title" => theme.title = color,
                "border" => theme.border = color,
                "header_bg" => theme.header_bg = color,
                "header_fg" => theme.header_fg = color,
                "status_bg" => theme.status_bg = color,
                "status_fg" => theme.status_fg = color,
                "highlight_fg" => theme.highlight_fg = color,
                "highlight_bg" => theme.highlight_bg = color,
                "error" => theme.error = color,
                _ => {}
            }
        }

        Some(theme)
    }

    /// Parse a color from hex ("#RRGGBB" or "RRGGBB") or "reset".
    fn parse_color(s: &str) -> Option<Color> {
        let lower = s.trim().to_ascii_lowercase();
        if lower == "reset" {
            return Some(Color::Reset);
        }
        let hex = lower.strip_prefix('#').unwrap_or(lower.as_str());
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Color::Rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn write_file(&self, path: &Path) -> std::io::Result<()> {
        use std::fmt::Write as _;
        let mut buf = String::new();
        buf.push_str("# wgadm theme configuration\n");
        buf.push_str("# Colors: hex as #RRGGBB or RRGGBB, or 'reset'\n\n");

        fn color_to_str(c: Color) -> String {
            match c {
                Color::Rgb(r, g, b) => format!("#{:02X}{:02X}{:02X}", r, g, b),
                Color::Reset => "reset".to_string(),
                Color::Black => "#000000".to_string(),
                Color::White => "#FFFFFF".to_string(),
                Color::Gray => "#B3B3B3".to_string(),
                Color::DarkGray => "#4D4D4D".to_string(),
                // Named colors are not produced by `mocha`; emit a neutral value
                _ => "reset".to_string(),
            }
        }

        let mut kv = |k: &str, v: Color| {
            let _ = writeln!(&mut buf, "{} = {}", k, color_to_str(v));
        };
        kv("text", self.text);
        kv("muted", self.muted);
        kv("title", self.title);
        kv("border", self.border);
        kv("header_bg", self.header_bg);
        kv("header_fg", self.header_fg);
        kv("status_bg", self.status_bg);
        kv("status_fg", self.status_fg);
        kv("highlight_fg", self.highlight_fg);
        kv("highlight_bg", self.highlight_bg);
        kv("error", self.error);

        std::fs::write(path, buf)
    }

    /// Load `path`, or write the default theme there when it does not exist yet.
    pub fn load_or_init(path: &Path) -> Self {
        if path.exists() {
            return Self::from_file(path).unwrap_or_else(Self::mocha);
        }
        let t = Self::mocha();
        if let Err(e) = t.write_file(path) {
            warn!(path = %path.display(), error = %e, "cannot write default theme");
        }
        t
    }
}

/// What a mounted modal is currently showing.
pub enum Dialog {
    Form(FormView),
    Members(MembersView),
    Notice(Notice),
}

impl Dialog {
    pub fn session_mut(&mut self) -> Option<&mut FormSession> {
        match self {
            Dialog::Form(view) => Some(&mut view.session),
            Dialog::Members(view) => Some(&mut view.session),
            Dialog::Notice(_) => None,
        }
    }

    pub fn session(&self) -> Option<&FormSession> {
        match self {
            Dialog::Form(view) => Some(&view.session),
            Dialog::Members(view) => Some(&view.session),
            Dialog::Notice(_) => None,
        }
    }
}

type Finished = Arc<Mutex<Vec<ModalName>>>;

fn mount<M: Modal>(registry: &ModalRegistry, finished: &Finished) -> ModalHost<M>
where
    M::Payload: Clone,
{
    let sink = Arc::clone(finished);
    ModalHost::<M>::mount(registry).with_after_close(move |_| sink.lock().push(M::NAME))
}

/// One host per catalogue entry, mounted for the lifetime of the app.
pub struct Modals {
    pub add_user: ModalHost<kinds::AddUser>,
    pub edit_user: ModalHost<kinds::EditUser>,
    pub delete_user: ModalHost<kinds::DeleteUser>,
    pub add_group: ModalHost<kinds::AddGroup>,
    pub edit_group_members: ModalHost<kinds::EditGroupMembers>,
    pub edit_location: ModalHost<kinds::EditLocation>,
    pub add_device: ModalHost<kinds::AddDevice>,
    pub notice: ModalHost<kinds::Notice>,
}

impl Modals {
    fn mount(registry: &ModalRegistry, finished: &Finished) -> Self {
        Self {
            add_user: mount(registry, finished),
            edit_user: mount(registry, finished),
            delete_user: mount(registry, finished),
            add_group: mount(registry, finished),
            edit_group_members: mount(registry, finished),
            edit_location: mount(registry, finished),
            add_device: mount(registry, finished),
            notice: mount(registry, finished),
        }
    }

    fn controls(&self) -> [&dyn HostControl; 8] {
        [
            &self.add_user,
            &self.edit_user,
            &self.delete_user,
            &self.add_group,
            &self.edit_group_members,
            &self.edit_location,
            &self.add_device,
            &self.notice,
        ]
    }

    fn controls_mut(&mut self) -> [&mut dyn HostControl; 8] {
        [
            &mut self.add_user,
            &mut self.edit_user,
            &mut self.delete_user,
            &mut self.add_group,
            &mut self.edit_group_members,
            &mut self.edit_location,
            &mut self.add_device,
            &mut self.notice,
        ]
    }

    pub fn phase(&self, name: ModalName) -> ModalPhase {
        self.controls()
            .into_iter()
            .find(|c| c.name() == name)
            .map_or(ModalPhase::Closed, |c| c.phase())
    }

    fn finish(&mut self, name: ModalName) -> bool {
        self.controls_mut()
            .into_iter()
            .find(|c| c.name() == name)
            .is_some_and(|c| c.finish_transition())
    }
}

pub struct AppState {
    pub started_at: Instant,
    pub api: Arc<dyn AdminApi>,
    pub registry: ModalRegistry,
    pub modals: Modals,
    finished: Finished,
    pub dialogs: BTreeMap<ModalName, Dialog>,
    /// Dialog names in the order they were opened; the last one has the keyboard.
    pub stack: Vec<ModalName>,
    closing_drawn: BTreeSet<ModalName>,
    pub users_all: Vec<User>,
    pub users: Vec<User>,
    pub groups_all: Vec<Group>,
    pub groups: Vec<Group>,
    pub locations_all: Vec<Location>,
    pub locations: Vec<Location>,
    pub devices_all: Vec<Device>,
    pub devices: Vec<Device>,
    pub active_tab: ActiveTab,
    pub selected: [usize; 4],
    pub rows_per_page: usize,
    /// Page search as typed.
    pub search_query: String,
    /// Page search currently applied to the tables.
    pub applied_query: String,
    pub search_debounce: Debouncer<String>,
    pub theme: Theme,
    pub keymap: Keymap,
    pub config: ConsoleConfig,
    pub show_keybinds: bool,
    pub status: String,
    pub should_quit: bool,
}

impl AppState {
    pub fn new(api: Arc<dyn AdminApi>, config: ConsoleConfig, theme: Theme, keymap: Keymap) -> Self {
        let focus = FocusTracker::new();
        let registry = ModalRegistry::new(focus);
        let finished: Finished = Arc::default();
        let modals = Modals::mount(&registry, &finished);
        let mut app = Self {
            started_at: Instant::now(),
            api,
            registry,
            modals,
            finished,
            dialogs: BTreeMap::new(),
            stack: Vec::new(),
            closing_drawn: BTreeSet::new(),
            users_all: Vec::new(),
            users: Vec::new(),
            groups_all: Vec::new(),
            groups: Vec::new(),
            locations_all: Vec::new(),
            locations: Vec::new(),
            devices_all: Vec::new(),
            devices: Vec::new(),
            active_tab: ActiveTab::Users,
            selected: [0; 4],
            rows_per_page: config.rows_per_page,
            search_query: String::new(),
            applied_query: String::new(),
            search_debounce: Debouncer::new(config.search_debounce()),
            theme,
            keymap,
            show_keybinds: config.show_keybinds,
            config,
            status: String::new(),
            should_quit: false,
        };
        app.reload();
        app
    }

    /// Default theme, keys and settings; used by tests and embedding code.
    pub fn with_api(api: Arc<dyn AdminApi>) -> Self {
        Self::new(api, ConsoleConfig::default(), Theme::mocha(), Keymap::default())
    }

    pub fn focus(&self) -> &FocusTracker {
        self.registry.focus()
    }

    pub fn input_mode(&self) -> InputMode {
        if self.active_dialog().is_some() {
            InputMode::Modal
        } else if self.focus().is_focused(PAGE_SEARCH) {
            InputMode::Search
        } else {
            InputMode::Normal
        }
    }

    /// The topmost dialog that is open, i.e. not closing.
    pub fn active_dialog(&self) -> Option<ModalName> {
        self.stack
            .iter()
            .rev()
            .copied()
            .find(|name| self.modals.phase(*name) == ModalPhase::Open)
    }

    pub fn selected_index(&self) -> usize {
        self.selected[self.active_tab.index()]
    }

    pub fn selected_user(&self) -> Option<&User> {
        self.users.get(self.selected[ActiveTab::Users.index()])
    }

    pub fn selected_group(&self) -> Option<&Group> {
        self.groups.get(self.selected[ActiveTab::Groups.index()])
    }

    pub fn selected_location(&self) -> Option<&Location> {
        self.locations.get(self.selected[ActiveTab::Locations.index()])
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.devices.get(self.selected[ActiveTab::Devices.index()])
    }

    /// Rows on the active tab after search.
    pub fn row_count(&self) -> usize {
        match self.active_tab {
            ActiveTab::Users => self.users.len(),
            ActiveTab::Groups => self.groups.len(),
            ActiveTab::Locations => self.locations.len(),
            ActiveTab::Devices => self.devices.len(),
        }
    }

    /// Fetch every page from the API. A failure keeps the previous data and
    /// shows a notice.
    pub fn reload(&mut self) {
        match fetch_all(self.api.as_ref()) {
            Ok((users, groups, locations, devices)) => {
                self.users_all = users;
                self.groups_all = groups;
                self.locations_all = locations;
                self.devices_all = devices;
                crate::search::apply_search(self);
                debug!(
                    users = self.users_all.len(),
                    groups = self.groups_all.len(),
                    locations = self.locations_all.len(),
                    devices = self.devices_all.len(),
                    "pages reloaded"
                );
            }
            Err(e) => self.notify_failure(format!("Cannot load data: {e}")),
        }
    }

    pub fn notify_failure(&self, message: impl Into<String>) {
        let notice = Notice::failure(message);
        warn!(message = %notice.message, "request failed");
        self.registry.open::<kinds::Notice>(notice);
    }

    fn show(&mut self, name: ModalName, dialog: Dialog) {
        if let Some(mut old) = self.dialogs.insert(name, dialog) {
            if let Some(session) = old.session_mut() {
                session.dispose();
            }
        }
        self.stack.retain(|n| *n != name);
        self.stack.push(name);
        self.closing_drawn.remove(&name);
        debug!(modal = name.as_str(), "dialog shown");
    }

    /// Build dialogs for open requests the hosts received since the last call.
    pub fn sync_modals(&mut self) {
        if self.modals.add_user.take_opened().is_some() {
            self.show(ModalName::AddUser, Dialog::Form(forms::add_user(&self.api)));
        }
        if let Some(user) = self.modals.edit_user.take_opened() {
            self.show(ModalName::EditUser, Dialog::Form(forms::edit_user(&self.api, &user)));
        }
        if let Some(user) = self.modals.delete_user.take_opened() {
            self.show(ModalName::DeleteUser, Dialog::Form(forms::delete_user(&self.api, &user)));
        }
        if self.modals.add_group.take_opened().is_some() {
            self.show(ModalName::AddGroup, Dialog::Form(forms::add_group(&self.api)));
        }
        if let Some(group) = self.modals.edit_group_members.take_opened() {
            let view = forms::edit_members(&self.api, &group, &self.users_all);
            self.show(ModalName::EditGroupMembers, Dialog::Members(view));
        }
        if let Some(location) = self.modals.edit_location.take_opened() {
            let view = forms::edit_location(&self.api, location.as_ref(), &self.config.default_network);
            self.show(ModalName::EditLocation, Dialog::Form(view));
        }
        if let Some(seed) = self.modals.add_device.take_opened() {
            let view = forms::add_device(&self.api, &seed, &self.users_all, &self.locations_all, &self.devices_all);
            self.show(ModalName::AddDevice, Dialog::Form(view));
        }
        if let Some(notice) = self.modals.notice.take_opened() {
            self.show(ModalName::Notice, Dialog::Notice(notice));
        }
    }

    /// Record which closing dialogs have been drawn once in their closing state.
    pub fn mark_drawn(&mut self) {
        self.closing_drawn = self
            .dialogs
            .keys()
            .copied()
            .filter(|name| self.modals.phase(*name) == ModalPhase::Closing)
            .collect();
    }

    /// Complete closes whose closing frame was drawn, then release their dialogs.
    pub fn finish_transitions(&mut self) {
        for name in std::mem::take(&mut self.closing_drawn) {
            self.modals.finish(name);
        }
        let done: Vec<ModalName> = std::mem::take(&mut *self.finished.lock());
        for name in done {
            if self.modals.phase(name) != ModalPhase::Closed {
                continue;
            }
            if let Some(mut dialog) = self.dialogs.remove(&name) {
                if let Some(session) = dialog.session_mut() {
                    session.dispose();
                }
            }
            self.stack.retain(|n| *n != name);
            debug!(modal = name.as_str(), "dialog released");
        }
    }

    /// Collect finished submissions and act on them.
    pub fn poll_submits(&mut self) {
        let outcomes: Vec<(ModalName, SubmitOutcome)> = self
            .dialogs
            .iter_mut()
            .filter_map(|(name, d)| d.session_mut()?.poll_submit().map(|o| (*name, o)))
            .collect();
        for (name, outcome) in outcomes {
            match outcome {
                SubmitOutcome::Succeeded => {
                    info!(modal = name.as_str(), "submitted");
                    self.status = format!("{} done", describe(name));
                    self.registry.close(name);
                    self.reload();
                }
                SubmitOutcome::Rejected { field } => match self.dialogs.get_mut(&name) {
                    Some(Dialog::Form(view)) => view.focus_field(field),
                    Some(Dialog::Members(view)) => {
                        if let Some(err) = view.session.visible_error(field) {
                            self.status = err.to_string();
                        }
                    }
                    _ => {}
                },
                SubmitOutcome::Failed(message) => self.notify_failure(message),
            }
        }
    }

    /// One step of background work: transitions, opens, submissions and debounced searches.
    pub fn tick(&mut self, now: Instant) {
        self.finish_transitions();
        self.sync_modals();
        self.poll_submits();
        // Results may have opened a notice.
        self.sync_modals();
        for dialog in self.dialogs.values_mut() {
            if let Dialog::Members(view) = dialog {
                view.section.tick(now);
            }
        }
        if let Some(query) = self.search_debounce.poll(now) {
            self.applied_query = query;
            crate::search::apply_search(self);
        }
    }
}

type Pages = (Vec<User>, Vec<Group>, Vec<Location>, Vec<Device>);

fn fetch_all(api: &dyn AdminApi) -> ApiResult<Pages> {
    Ok((api.list_users()?, api.list_groups()?, api.list_locations()?, api.list_devices()?))
}

fn describe(name: ModalName) -> &'static str {
    match name {
        ModalName::AddUser => "Add user",
        ModalName::EditUser => "Edit user",
        ModalName::DeleteUser => "Delete user",
        ModalName::AddGroup => "Add group",
        ModalName::EditGroupMembers => "Edit members",
        ModalName::EditLocation => "Save location",
        ModalName::AddDevice => "Add device",
        ModalName::Notice => "Notice",
    }
}

/// Re-export the application event loop entry function.
pub use update::run_app as run;
