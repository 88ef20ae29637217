//! In-memory [`AdminApi`] backed by a JSON document.
//!
//! State is optionally loaded from and written back to a file after every
//! successful mutation, so the console can be used offline against a
//! snapshot of a real server.
//!
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{
    AdminApi, ApiError, ApiResult, Device, Group, Location, LocationMfaMode, NewDevice,
    ServiceLocationMode, User,
};
use crate::error::{Context, Result};
use crate::form::ip::Ipv4Network;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Store {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    next_id: u64,
}

impl Store {
    /// A small data set so a fresh console has something to show.
    pub fn demo() -> Self {
        let user = |username: &str, first: &str, last: &str| User {
            username: username.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: format!("{username}@example.com"),
            phone: None,
            is_active: true,
        };
        Self {
            users: vec![
                user("admin", "Default", "Admin"),
                user("alice", "Alice", "Archer"),
                user("bob", "Bob", "Builder"),
            ],
            groups: vec![
                Group { name: "admin".into(), members: vec!["admin".into()], is_admin: true },
                Group { name: "staff".into(), members: vec!["alice".into(), "bob".into()], is_admin: false },
            ],
            locations: vec![Location {
                id: 1,
                name: "Site A".into(),
                endpoint: "vpn.example.com".into(),
                port: 51820,
                network: "10.10.0.0/24".into(),
                allowed_ips: "10.10.0.0/24".into(),
                location_mfa_mode: LocationMfaMode::Disabled,
                service_location_mode: ServiceLocationMode::Disabled,
                keepalive_interval: 25,
            }],
            devices: vec![],
            next_id: 2,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

pub struct MemoryApi {
    store: Mutex<Store>,
    path: Option<PathBuf>,
}

impl MemoryApi {
    pub fn new(store: Store) -> Self {
        Self { store: Mutex::new(store), path: None }
    }

    /// Load the document at `path`, or start from demo data if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let store = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_ctx(|| format!("read data file {}", path.display()))?;
            let store: Store = serde_json::from_str(&raw)
                .with_ctx(|| format!("parse data file {}", path.display()))?;
            info!(path = %path.display(), users = store.users.len(), "loaded data file");
            store
        } else {
            info!(path = %path.display(), "data file missing; starting from demo data");
            Store::demo()
        };
        Ok(Self { store: Mutex::new(store), path: Some(path.to_path_buf()) })
    }

    pub fn snapshot(&self) -> Store {
        self.store.lock().clone()
    }

    fn persist(&self, store: &Store) -> ApiResult<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let body = serde_json::to_string_pretty(store).map_err(|e| ApiError::Transport(e.to_string()))?;
        std::fs::write(path, body).map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to write data file");
            ApiError::Transport(format!("write {}: {e}", path.display()))
        })
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Store) -> ApiResult<T>) -> ApiResult<T> {
        let mut guard = self.store.lock();
        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }
}

impl Default for MemoryApi {
    fn default() -> Self {
        Self::new(Store::demo())
    }
}

fn check_user(store: &Store, user: &User, original: Option<&str>) -> ApiResult<()> {
    let taken = store
        .users
        .iter()
        .any(|u| u.username == user.username && Some(u.username.as_str()) != original);
    if taken {
        return Err(ApiError::conflict("username", format!("user '{}' already exists", user.username)));
    }
    let email_taken = store.users.iter().any(|u| {
        u.email.eq_ignore_ascii_case(&user.email) && Some(u.username.as_str()) != original
    });
    if email_taken {
        return Err(ApiError::conflict("email", format!("email '{}' is already in use", user.email)));
    }
    Ok(())
}

impl AdminApi for MemoryApi {
    fn list_users(&self) -> ApiResult<Vec<User>> {
        Ok(self.store.lock().users.clone())
    }

    fn create_user(&self, user: User) -> ApiResult<User> {
        self.mutate(|s| {
            check_user(s, &user, None)?;
            s.users.push(user.clone());
            debug!(username = %user.username, "user created");
            Ok(user)
        })
    }

    fn update_user(&self, username: &str, user: User) -> ApiResult<User> {
        self.mutate(|s| {
            if !s.users.iter().any(|u| u.username == username) {
                return Err(ApiError::not_found(format!("user '{username}' no longer exists")));
            }
            check_user(s, &user, Some(username))?;
            for u in s.users.iter_mut().filter(|u| u.username == username) {
                *u = user.clone();
            }
            if username != user.username {
                for g in &mut s.groups {
                    for m in g.members.iter_mut().filter(|m| m.as_str() == username) {
                        *m = user.username.clone();
                    }
                }
                for d in s.devices.iter_mut().filter(|d| d.username == username) {
                    d.username = user.username.clone();
                }
            }
            Ok(user)
        })
    }

    fn delete_user(&self, username: &str) -> ApiResult<()> {
        self.mutate(|s| {
            let before = s.users.len();
            s.users.retain(|u| u.username != username);
            if s.users.len() == before {
                return Err(ApiError::not_found(format!("user '{username}' no longer exists")));
            }
            for g in &mut s.groups {
                g.members.retain(|m| m != username);
            }
            s.devices.retain(|d| d.username != username);
            Ok(())
        })
    }

    fn list_groups(&self) -> ApiResult<Vec<Group>> {
        Ok(self.store.lock().groups.clone())
    }

    fn create_group(&self, name: &str, is_admin: bool) -> ApiResult<Group> {
        self.mutate(|s| {
            if s.groups.iter().any(|g| g.name == name) {
                return Err(ApiError::conflict("name", format!("group '{name}' already exists")));
            }
            let group = Group { name: name.to_string(), members: Vec::new(), is_admin };
            s.groups.push(group.clone());
            Ok(group)
        })
    }

    fn set_group_members(&self, name: &str, members: Vec<String>) -> ApiResult<Group> {
        self.mutate(|s| {
            if let Some(unknown) = members.iter().find(|m| !s.users.iter().any(|u| &u.username == *m)) {
                return Err(ApiError::invalid("members", format!("unknown user '{unknown}'")));
            }
            let group = s
                .groups
                .iter_mut()
                .find(|g| g.name == name)
                .ok_or_else(|| ApiError::not_found(format!("group '{name}' no longer exists")))?;
            group.members = members;
            Ok(group.clone())
        })
    }

    fn list_locations(&self) -> ApiResult<Vec<Location>> {
        Ok(self.store.lock().locations.clone())
    }

    fn save_location(&self, mut location: Location) -> ApiResult<Location> {
        self.mutate(|s| {
            Ipv4Network::parse(&location.network)
                .map_err(|e| ApiError::invalid("network", e.to_string()))?;
            if s.locations.iter().any(|l| l.name == location.name && l.id != location.id) {
                return Err(ApiError::conflict("name", format!("location '{}' already exists", location.name)));
            }
            if location.id == 0 {
                location.id = s.allocate_id();
                s.locations.push(location.clone());
            } else {
                let slot = s
                    .locations
                    .iter_mut()
                    .find(|l| l.id == location.id)
                    .ok_or_else(|| ApiError::not_found(format!("location {} no longer exists", location.id)))?;
                *slot = location.clone();
            }
            Ok(location)
        })
    }

    fn list_devices(&self) -> ApiResult<Vec<Device>> {
        Ok(self.store.lock().devices.clone())
    }

    fn create_device(&self, device: NewDevice) -> ApiResult<Device> {
        self.mutate(|s| {
            if !s.users.iter().any(|u| u.username == device.username) {
                return Err(ApiError::not_found(format!("user '{}' no longer exists", device.username)));
            }
            let location = s
                .locations
                .iter()
                .find(|l| l.id == device.location_id)
                .ok_or_else(|| ApiError::invalid("location_id", "unknown location"))?;
            let network = Ipv4Network::parse(&location.network)
                .map_err(|e| ApiError::Transport(format!("location network corrupt: {e}")))?;
            let used: Vec<String> = s
                .devices
                .iter()
                .filter(|d| d.location_id == device.location_id)
                .map(|d| d.wireguard_ip.clone())
                .collect();
            crate::form::ip::validate_assignment(&network, &device.wireguard_ip, &used)
                .map_err(|msg| ApiError::invalid("wireguard_ip", msg))?;
            if s.devices.iter().any(|d| d.wireguard_pubkey == device.wireguard_pubkey) {
                return Err(ApiError::conflict("wireguard_pubkey", "public key already registered"));
            }
            if s.devices.iter().any(|d| d.username == device.username && d.name == device.name) {
                return Err(ApiError::conflict("name", format!("device '{}' already exists", device.name)));
            }
            let created = Device {
                id: s.allocate_id(),
                name: device.name,
                username: device.username,
                location_id: device.location_id,
                wireguard_ip: device.wireguard_ip,
                wireguard_pubkey: device.wireguard_pubkey,
                description: device.description,
            };
            s.devices.push(created.clone());
            Ok(created)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn tmp_path(tag: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        let n = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        p.push(format!("wgadm_{tag}_{}_{}.json", std::process::id(), n));
        p
    }

    #[test]
    fn duplicate_username_is_attributed_to_field() {
        let api = MemoryApi::default();
        let mut dup = api.list_users().unwrap()[1].clone();
        dup.email = "other@example.com".into();
        match api.create_user(dup) {
            Err(ApiError::Problem(p)) => assert_eq!(p.field.as_deref(), Some("username")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn rename_carries_group_membership() {
        let api = MemoryApi::default();
        let mut alice = api.list_users().unwrap().into_iter().find(|u| u.username == "alice").unwrap();
        alice.username = "alicia".into();
        api.update_user("alice", alice).unwrap();
        let staff = api.list_groups().unwrap().into_iter().find(|g| g.name == "staff").unwrap();
        assert!(staff.members.contains(&"alicia".to_string()));
        assert!(!staff.members.contains(&"alice".to_string()));
    }

    #[test]
    fn failed_mutation_leaves_store_untouched() {
        let api = MemoryApi::default();
        let before = api.snapshot().groups;
        assert!(api.set_group_members("staff", vec!["nobody".into()]).is_err());
        assert_eq!(api.snapshot().groups, before);
    }

    #[test]
    fn device_ip_conflict_is_rejected() {
        let api = MemoryApi::default();
        let new = |name: &str, key: &str| NewDevice {
            name: name.into(),
            username: "alice".into(),
            location_id: 1,
            wireguard_ip: "10.10.0.2".into(),
            wireguard_pubkey: key.into(),
            description: String::new(),
        };
        api.create_device(new("laptop", "k1")).unwrap();
        match api.create_device(new("phone", "k2")) {
            Err(ApiError::Problem(p)) => assert_eq!(p.field.as_deref(), Some("wireguard_ip")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn unknown_location_lands_on_location_field() {
        let api = MemoryApi::default();
        let device = NewDevice {
            name: "tablet".into(),
            username: "bob".into(),
            location_id: 99,
            wireguard_ip: "10.10.0.3".into(),
            wireguard_pubkey: "k3".into(),
            description: String::new(),
        };
        match api.create_device(device) {
            Err(ApiError::Problem(p)) => assert_eq!(p.field.as_deref(), Some("location_id")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(api.list_devices().unwrap().is_empty());
    }

    #[test]
    fn open_persists_after_mutation() {
        let path = tmp_path("store");
        let api = MemoryApi::open(&path).unwrap();
        api.create_group("ops", false).unwrap();
        let reopened = MemoryApi::open(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(reopened.list_groups().unwrap().iter().any(|g| g.name == "ops"));
    }
}
