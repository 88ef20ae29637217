//! Page search: filter and order the tables for the applied query.
use crate::api::{Device, Group, Location, User};
use crate::app::AppState;
use crate::selection::sort_key;

fn matches(q: &str, haystacks: &[&String]) -> bool {
    q.is_empty() || haystacks.iter().any(|h| h.to_lowercase().contains(q))
}

pub fn filter_users(all: &[User], q: &str) -> Vec<User> {
    let mut out: Vec<User> = all
        .iter()
        .filter(|u| matches(q, &[&u.username, &u.first_name, &u.last_name, &u.email]))
        .cloned()
        .collect();
    out.sort_by_cached_key(|u| sort_key(&u.username));
    out
}

pub fn filter_groups(all: &[Group], q: &str) -> Vec<Group> {
    let mut out: Vec<Group> = all
        .iter()
        .filter(|g| matches(q, &[&g.name]) || g.members.iter().any(|m| matches(q, &[m])))
        .cloned()
        .collect();
    out.sort_by_cached_key(|g| sort_key(&g.name));
    out
}

pub fn filter_locations(all: &[Location], q: &str) -> Vec<Location> {
    let mut out: Vec<Location> = all
        .iter()
        .filter(|l| matches(q, &[&l.name, &l.endpoint, &l.network]))
        .cloned()
        .collect();
    out.sort_by_cached_key(|l| sort_key(&l.name));
    out
}

pub fn filter_devices(all: &[Device], q: &str) -> Vec<Device> {
    let mut out: Vec<Device> = all
        .iter()
        .filter(|d| matches(q, &[&d.name, &d.username, &d.wireguard_ip]))
        .cloned()
        .collect();
    out.sort_by_cached_key(|d| sort_key(&d.name));
    out
}

/// Recompute every table from the `_all` lists and the applied query,
/// clamping selections to the new lengths.
pub fn apply_search(app: &mut AppState) {
    let q = app.applied_query.trim().to_lowercase();
    app.users = filter_users(&app.users_all, &q);
    app.groups = filter_groups(&app.groups_all, &q);
    app.locations = filter_locations(&app.locations_all, &q);
    app.devices = filter_devices(&app.devices_all, &q);
    let lens = [app.users.len(), app.groups.len(), app.locations.len(), app.devices.len()];
    for (sel, len) in app.selected.iter_mut().zip(lens) {
        *sel = (*sel).min(len.saturating_sub(1));
    }
}
