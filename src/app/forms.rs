//! The console's dialogs: field layout, validation schema and submit action
//! for every form, built on [`crate::form`].
//!
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use crate::api::{
    AdminApi, ApiError, ApiResult, Device, Group, Location, LocationMfaMode, NewDevice,
    ServiceLocationMode, User,
};
use crate::form::ip::{self, Ipv4Network};
use crate::form::{
    Check, FieldKind, FieldSpec, FieldValue, FormSession, FormValues, MutuallyExclusive,
    PendingSubmit, Recompute, Schema, SubmitHandler, Upload, ValidationPolicy, Validators,
    ValuesExt,
};
use crate::modal::DeviceSeed;
use crate::selection::{SelectionOption, SelectionSection};

/// What a key press inside a dialog asks the host to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogKey {
    Handled,
    Ignored,
    Close,
    Submit,
    /// Report a failure that is not tied to the form state.
    Failed(String),
}

/// An open form dialog.
pub struct FormView {
    pub title: String,
    pub intro: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub session: FormSession,
    pub cursor: usize,
    /// Path being typed into the focused upload field.
    pub path_input: String,
    pub submit_label: &'static str,
}

impl FormView {
    fn new(title: impl Into<String>, fields: Vec<FieldSpec>, session: FormSession) -> Self {
        Self {
            title: title.into(),
            intro: None,
            fields,
            session,
            cursor: 0,
            path_input: String::new(),
            submit_label: "Save",
        }
    }

    fn with_intro(mut self, intro: impl Into<String>) -> Self {
        self.intro = Some(intro.into());
        self
    }

    fn with_submit_label(mut self, label: &'static str) -> Self {
        self.submit_label = label;
        self
    }

    pub fn current_field(&self) -> Option<&FieldSpec> {
        self.fields.get(self.cursor)
    }

    fn leave_field(&mut self) {
        if let Some(name) = self.current_field().map(|f| f.name) {
            self.session.blur(name);
        }
        self.path_input.clear();
    }

    pub fn next_field(&mut self) {
        if self.fields.is_empty() {
            return;
        }
        self.leave_field();
        self.cursor = (self.cursor + 1) % self.fields.len();
    }

    pub fn prev_field(&mut self) {
        if self.fields.is_empty() {
            return;
        }
        self.leave_field();
        self.cursor = (self.cursor + self.fields.len() - 1) % self.fields.len();
    }

    pub fn focus_field(&mut self, name: &str) {
        if let Some(idx) = self.fields.iter().position(|f| f.name == name) {
            self.cursor = idx;
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> DialogKey {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('s') => DialogKey::Submit,
                _ => DialogKey::Ignored,
            };
        }
        match key.code {
            KeyCode::Esc => return DialogKey::Close,
            KeyCode::Tab | KeyCode::Down => {
                self.next_field();
                return DialogKey::Handled;
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.prev_field();
                return DialogKey::Handled;
            }
            _ => {}
        }
        let Some(spec) = self.fields.get(self.cursor).cloned() else {
            return if key.code == KeyCode::Enter { DialogKey::Submit } else { DialogKey::Ignored };
        };
        match (&spec.kind, key.code) {
            (FieldKind::Upload, KeyCode::Enter) => {
                let path = self.path_input.trim().to_string();
                if path.is_empty() {
                    return DialogKey::Ignored;
                }
                match Upload::read(&path) {
                    Ok(upload) => {
                        self.session.input(spec.name, FieldValue::File(Some(upload)));
                        self.path_input.clear();
                        DialogKey::Handled
                    }
                    Err(e) => DialogKey::Failed(format!("Cannot read {path}: {e}")),
                }
            }
            (FieldKind::Upload, KeyCode::Char(c)) => {
                self.path_input.push(c);
                DialogKey::Handled
            }
            (FieldKind::Upload, KeyCode::Backspace) => {
                self.path_input.pop();
                DialogKey::Handled
            }
            (kind, KeyCode::Enter) if !matches!(kind, FieldKind::Textarea) => DialogKey::Submit,
            _ => match spec.edit(self.session.values(), key.code) {
                Some(value) => {
                    self.session.input(spec.name, value);
                    DialogKey::Handled
                }
                None => DialogKey::Ignored,
            },
        }
    }
}

/// Field the membership dialog stores its selection under.
pub const MEMBERS_FIELD: &str = "members";

/// Membership dialog: a selection section whose selection is the form's
/// `members` value.
pub struct MembersView {
    pub group: String,
    pub section: SelectionSection<String>,
    pub session: FormSession,
}

impl MembersView {
    pub fn selection(&self) -> BTreeSet<String> {
        self.session.values().set(MEMBERS_FIELD)
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> DialogKey {
        let selection = self.selection();
        match key.code {
            KeyCode::Esc => DialogKey::Close,
            KeyCode::Enter => DialogKey::Submit,
            KeyCode::Up => {
                self.section.move_up();
                DialogKey::Handled
            }
            KeyCode::Down => {
                self.section.move_down(&selection);
                DialogKey::Handled
            }
            KeyCode::Tab => {
                let on = !self.section.selected_only();
                self.section.set_selected_only(on);
                DialogKey::Handled
            }
            KeyCode::Char(' ') => {
                let session = &mut self.session;
                self.section.toggle_current(&selection, |next| {
                    session.input(MEMBERS_FIELD, FieldValue::Set(next));
                });
                DialogKey::Handled
            }
            KeyCode::Char(c) => {
                self.section.push_char(c, now);
                DialogKey::Handled
            }
            KeyCode::Backspace => {
                self.section.pop_char(now);
                DialogKey::Handled
            }
            _ => DialogKey::Ignored,
        }
    }
}

/// Submit handler that runs `job` against `api` on a worker thread.
fn dispatch<F>(api: &Arc<dyn AdminApi>, job: F) -> SubmitHandler
where
    F: Fn(&dyn AdminApi, &FormValues) -> ApiResult<()> + Send + Sync + 'static,
{
    let api = Arc::clone(api);
    let job = Arc::new(job);
    Box::new(move |values, token| {
        let api = Arc::clone(&api);
        let job = Arc::clone(&job);
        PendingSubmit::spawn(token, move || job(api.as_ref(), &values))
    })
}

fn session(values: FormValues, schema: Schema, on_submit: SubmitHandler) -> FormSession {
    FormSession::new(values, ValidationPolicy::standard(), Validators::on_submit(schema), on_submit)
}

fn parse_field<T: FromStr>(values: &FormValues, field: &str) -> ApiResult<T> {
    values
        .text(field)
        .parse()
        .map_err(|_| ApiError::invalid(field, format!("invalid {field}")))
}

fn optional(values: &FormValues, field: &str) -> Option<String> {
    Some(values.text(field)).filter(|s| !s.is_empty())
}

fn text(s: &str) -> FieldValue {
    FieldValue::text(s)
}

fn username_check() -> Check {
    Check::custom(|v| {
        let s = v.as_str().trim();
        if s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')) {
            Ok(())
        } else {
            Err("Only letters, digits, '.', '-' and '_' are allowed".to_string())
        }
    })
}

fn phone_check() -> Check {
    Check::custom(|v| {
        let s = v.as_str().trim();
        if s.chars().all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')')) {
            Ok(())
        } else {
            Err("Enter a valid phone number".to_string())
        }
    })
}

fn password_strength() -> Check {
    Check::custom(|v| {
        let s = v.as_str();
        if !s.chars().any(|c| c.is_ascii_digit()) {
            Err("Password must contain a digit".to_string())
        } else if !s.chars().any(|c| c.is_lowercase()) {
            Err("Password must contain a lowercase letter".to_string())
        } else if !s.chars().any(|c| c.is_uppercase()) {
            Err("Password must contain an uppercase letter".to_string())
        } else if !s.chars().any(|c| !c.is_alphanumeric()) {
            Err("Password must contain a special character".to_string())
        } else {
            Ok(())
        }
    })
}

fn user_schema() -> Schema {
    Schema::new()
        .field("username", [Check::Required, Check::MinLen(3), Check::MaxLen(64), username_check()])
        .field("first_name", [Check::Required, Check::MaxLen(64)])
        .field("last_name", [Check::Required, Check::MaxLen(64)])
        .field("email", [Check::Required, Check::Email])
        .field("phone", [phone_check()])
}

fn user_from(values: &FormValues, is_active: bool) -> User {
    User {
        username: values.text("username"),
        first_name: values.text("first_name"),
        last_name: values.text("last_name"),
        email: values.text("email"),
        phone: optional(values, "phone"),
        is_active,
    }
}

fn profile_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::input("username", "Username"),
        FieldSpec::input("first_name", "First name"),
        FieldSpec::input("last_name", "Last name"),
        FieldSpec::input("email", "Email"),
        FieldSpec::input("phone", "Phone"),
    ]
}

pub fn add_user(api: &Arc<dyn AdminApi>) -> FormView {
    let values: FormValues = [
        "username",
        "first_name",
        "last_name",
        "email",
        "phone",
        "password",
        "confirm_password",
    ]
    .into_iter()
    .map(|f| (f, text("")))
    .collect();
    let schema = user_schema()
        .field("password", [Check::Required, Check::MinLen(8), Check::MaxLen(128), password_strength()])
        .field("confirm_password", [Check::Required])
        .refine(|v| {
            let confirm = v.text("confirm_password");
            if !confirm.is_empty() && confirm != v.text("password") {
                vec![("confirm_password", "Passwords do not match".to_string())]
            } else {
                vec![]
            }
        });
    let on_submit = dispatch(api, |api, v| api.create_user(user_from(v, true)).map(|_| ()));
    let mut fields = profile_fields();
    fields.push(FieldSpec::secret("password", "Password"));
    fields.push(FieldSpec::secret("confirm_password", "Repeat password"));
    FormView::new("Add user", fields, session(values, schema, on_submit)).with_submit_label("Add user")
}

pub fn edit_user(api: &Arc<dyn AdminApi>, user: &User) -> FormView {
    let mut values = FormValues::new();
    values.insert("username", text(&user.username));
    values.insert("first_name", text(&user.first_name));
    values.insert("last_name", text(&user.last_name));
    values.insert("email", text(&user.email));
    values.insert("phone", text(user.phone.as_deref().unwrap_or("")));
    values.insert("is_active", FieldValue::Flag(user.is_active));
    let original = user.username.clone();
    let on_submit = dispatch(api, move |api, v| {
        api.update_user(&original, user_from(v, v.flag("is_active"))).map(|_| ())
    });
    let mut fields = profile_fields();
    fields.push(FieldSpec::toggle("is_active", "Active"));
    FormView::new(format!("Edit user {}", user.username), fields, session(values, user_schema(), on_submit))
}

pub fn delete_user(api: &Arc<dyn AdminApi>, user: &User) -> FormView {
    let username = user.username.clone();
    let on_submit = dispatch(api, move |api, _| api.delete_user(&username));
    FormView::new("Delete user", Vec::new(), session(FormValues::new(), Schema::new(), on_submit))
        .with_intro(format!(
            "Delete {} ({})? Devices and group memberships are removed too.",
            user.username,
            user.full_name()
        ))
        .with_submit_label("Delete")
}

pub fn add_group(api: &Arc<dyn AdminApi>) -> FormView {
    let mut values = FormValues::new();
    values.insert("name", text(""));
    values.insert("is_admin", FieldValue::Flag(false));
    let schema = Schema::new().field("name", [Check::Required, Check::MaxLen(64), username_check()]);
    let on_submit = dispatch(api, |api, v| api.create_group(&v.text("name"), v.flag("is_admin")).map(|_| ()));
    let fields = vec![
        FieldSpec::input("name", "Group name"),
        FieldSpec::checkbox("is_admin", "Grants admin rights"),
    ];
    FormView::new("Add group", fields, session(values, schema, on_submit)).with_submit_label("Add group")
}

pub fn edit_members(api: &Arc<dyn AdminApi>, group: &Group, users: &[User]) -> MembersView {
    let options = users
        .iter()
        .map(|u| {
            let label = match u.full_name() {
                n if n.is_empty() => u.username.clone(),
                n => format!("{n} ({})", u.username),
            };
            SelectionOption::new(u.username.clone(), label)
        })
        .collect();
    let mut values = FormValues::new();
    values.insert(MEMBERS_FIELD, FieldValue::Set(group.members.iter().cloned().collect()));
    let name = group.name.clone();
    let on_submit = dispatch(api, move |api, v| {
        api.set_group_members(&name, v.set(MEMBERS_FIELD).into_iter().collect()).map(|_| ())
    });
    MembersView {
        group: group.name.clone(),
        section: SelectionSection::new(options),
        session: session(values, Schema::new(), on_submit),
    }
}

fn network_check() -> Check {
    Check::custom(|v| Ipv4Network::parse(v.as_str()).map(|_| ()).map_err(|e| e.to_string()))
}

fn allowed_ips_check() -> Check {
    Check::custom(|v| {
        for entry in v.as_str().split([',', '\n']).map(str::trim).filter(|s| !s.is_empty()) {
            let ok = Ipv4Network::parse(entry).is_ok() || entry.parse::<std::net::Ipv4Addr>().is_ok();
            if !ok {
                return Err(format!("'{entry}' is not an address or network"));
            }
        }
        Ok(())
    })
}

fn keepalive_check() -> Check {
    Check::custom(|v| match v.as_str().trim().parse::<u32>() {
        Ok(n) if n <= 3600 => Ok(()),
        _ => Err("Keepalive must be between 0 and 3600 seconds".to_string()),
    })
}

pub fn edit_location(api: &Arc<dyn AdminApi>, location: Option<&Location>, default_network: &str) -> FormView {
    let current = location.cloned().unwrap_or_else(|| Location {
        id: 0,
        name: String::new(),
        endpoint: String::new(),
        port: 51820,
        network: default_network.to_string(),
        allowed_ips: String::new(),
        location_mfa_mode: LocationMfaMode::Disabled,
        service_location_mode: ServiceLocationMode::Disabled,
        keepalive_interval: 25,
    });
    let mut values = FormValues::new();
    values.insert("name", text(&current.name));
    values.insert("endpoint", text(&current.endpoint));
    values.insert("port", text(&current.port.to_string()));
    values.insert("network", text(&current.network));
    values.insert("allowed_ips", text(&current.allowed_ips));
    values.insert("keepalive_interval", text(&current.keepalive_interval.to_string()));
    values.insert("location_mfa_mode", FieldValue::choice(current.location_mfa_mode.as_str()));
    values.insert("service_location_mode", FieldValue::choice(current.service_location_mode.as_str()));

    let schema = Schema::new()
        .field("name", [Check::Required, Check::MaxLen(64)])
        .field("endpoint", [Check::Required])
        .field("port", [Check::Required, Check::Port])
        .field("network", [Check::Required, network_check()])
        .field("allowed_ips", [allowed_ips_check()])
        .field("keepalive_interval", [Check::Required, keepalive_check()])
        .field("location_mfa_mode", [Check::OneOf(LocationMfaMode::ALL.iter().map(|m| m.as_str()).collect())])
        .field(
            "service_location_mode",
            [Check::OneOf(ServiceLocationMode::ALL.iter().map(|m| m.as_str()).collect())],
        );

    let id = current.id;
    let on_submit = dispatch(api, move |api, v| {
        let location = Location {
            id,
            name: v.text("name"),
            endpoint: v.text("endpoint"),
            port: parse_field(v, "port")?,
            network: v.text("network"),
            allowed_ips: v.text("allowed_ips"),
            location_mfa_mode: LocationMfaMode::parse(&v.text("location_mfa_mode"))
                .ok_or_else(|| ApiError::invalid("location_mfa_mode", "unknown MFA mode"))?,
            service_location_mode: ServiceLocationMode::parse(&v.text("service_location_mode"))
                .ok_or_else(|| ApiError::invalid("service_location_mode", "unknown service mode"))?,
            keepalive_interval: parse_field(v, "keepalive_interval")?,
        };
        api.save_location(location).map(|_| ())
    });

    let fields = vec![
        FieldSpec::input("name", "Name"),
        FieldSpec::input("endpoint", "Gateway endpoint"),
        FieldSpec::input("port", "Port"),
        FieldSpec::input("network", "VPN network"),
        FieldSpec::textarea("allowed_ips", "Allowed IPs"),
        FieldSpec::input("keepalive_interval", "Keepalive (s)"),
        FieldSpec::radio(
            "location_mfa_mode",
            "MFA",
            [("disabled", "Disabled"), ("internal", "Internal MFA"), ("external", "External OIDC")],
        ),
        FieldSpec::select(
            "service_location_mode",
            "Service location",
            [("disabled", "Disabled"), ("prelogon", "Pre-logon"), ("alwayson", "Always on")],
        ),
    ];
    let title = match location {
        Some(l) => format!("Edit location {}", l.name),
        None => "Add location".to_string(),
    };
    let form = session(values, schema, on_submit).with_rule(MutuallyExclusive::new(
        "location_mfa_mode",
        FieldValue::choice(LocationMfaMode::Disabled.as_str()),
        "service_location_mode",
        FieldValue::choice(ServiceLocationMode::Disabled.as_str()),
    ));
    FormView::new(title, fields, form)
}

pub fn add_device(
    api: &Arc<dyn AdminApi>,
    seed: &DeviceSeed,
    users: &[User],
    locations: &[Location],
    devices: &[Device],
) -> FormView {
    let networks: BTreeMap<String, Ipv4Network> = locations
        .iter()
        .filter_map(|l| Ipv4Network::parse(&l.network).ok().map(|n| (l.id.to_string(), n)))
        .collect();
    let mut used: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for d in devices {
        used.entry(d.location_id.to_string()).or_default().push(d.wireguard_ip.clone());
    }
    let networks = Arc::new(networks);
    let used = Arc::new(used);

    let location_id = seed
        .location_id
        .or_else(|| locations.first().map(|l| l.id))
        .map(|id| id.to_string())
        .unwrap_or_default();
    let username = seed
        .username
        .clone()
        .or_else(|| users.first().map(|u| u.username.clone()))
        .unwrap_or_default();
    let suggest = {
        let (networks, used) = (Arc::clone(&networks), Arc::clone(&used));
        move |location: &str| -> Option<String> {
            let net = networks.get(location)?;
            let taken = used.get(location).map(Vec::as_slice).unwrap_or_default();
            ip::suggest(net, taken).map(|a| a.to_string())
        }
    };

    let mut values = FormValues::new();
    values.insert("name", text(""));
    values.insert("username", FieldValue::choice(username));
    values.insert("location_id", FieldValue::choice(location_id.clone()));
    values.insert("wireguard_ip", text(&suggest(&location_id).unwrap_or_default()));
    values.insert("pubkey_file", FieldValue::File(None));
    values.insert("wireguard_pubkey", text(""));
    values.insert("description", text(""));

    let schema = {
        let (networks, used) = (Arc::clone(&networks), Arc::clone(&used));
        Schema::new()
            .field("name", [Check::Required, Check::MaxLen(64)])
            .field("username", [Check::Required])
            .field("location_id", [Check::Required])
            .field("wireguard_ip", [Check::Required, Check::Ipv4])
            .field("wireguard_pubkey", [Check::Required, Check::WireguardKey])
            .field("description", [Check::MaxLen(256)])
            .refine(move |v| {
                let location = v.text("location_id");
                let address = v.text("wireguard_ip");
                let Some(net) = networks.get(&location) else {
                    return vec![("location_id", "Choose a location".to_string())];
                };
                if address.is_empty() {
                    return vec![];
                }
                let taken = used.get(&location).map(Vec::as_slice).unwrap_or_default();
                match ip::validate_assignment(net, &address, taken) {
                    Ok(_) => vec![],
                    Err(msg) => vec![("wireguard_ip", msg)],
                }
            })
    };

    let on_submit = dispatch(api, |api, v| {
        let device = NewDevice {
            name: v.text("name"),
            username: v.text("username"),
            location_id: parse_field(v, "location_id")?,
            wireguard_ip: v.text("wireguard_ip"),
            wireguard_pubkey: v.text("wireguard_pubkey"),
            description: v.text("description"),
        };
        api.create_device(device).map(|_| ())
    });

    let user_options: Vec<(&str, &str)> =
        users.iter().map(|u| (u.username.as_str(), u.username.as_str())).collect();
    let location_ids: Vec<String> = locations.iter().map(|l| l.id.to_string()).collect();
    let location_options: Vec<(&str, &str)> = location_ids
        .iter()
        .zip(locations)
        .map(|(id, l)| (id.as_str(), l.name.as_str()))
        .collect();
    let fields = vec![
        FieldSpec::input("name", "Device name"),
        FieldSpec::select("username", "Owner", user_options),
        FieldSpec::select("location_id", "Location", location_options),
        FieldSpec::suggested_ip("wireguard_ip", "Address", "location_id", (*networks).clone()),
        FieldSpec::upload("pubkey_file", "Public key file"),
        FieldSpec::input("wireguard_pubkey", "Public key"),
        FieldSpec::textarea("description", "Description"),
    ];

    let form = session(values, schema, on_submit)
        .with_rule(Recompute::new("location_id", "wireguard_ip", move |v| {
            suggest(&v.text("location_id")).map(FieldValue::Text)
        }))
        .with_rule(Recompute::new("pubkey_file", "wireguard_pubkey", |v| match v.get("pubkey_file") {
            Some(FieldValue::File(Some(upload))) => Some(FieldValue::text(upload.text())),
            _ => None,
        }));
    FormView::new("Add device", fields, form).with_submit_label("Add device")
}
