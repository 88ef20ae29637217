//! Searchable multi-select list used by membership dialogs.
//!
//! The search query is debounced: filtering runs once a burst of keystrokes
//! has settled, not on every key. Time is passed in by the caller so the
//! event loop and tests drive it the same way.
//!
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::trace;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Shown in place of the list when nothing matches.
pub const EMPTY_MESSAGE: &str = "No results";

/// Holds the latest value until `delay` has passed without a newer one.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.delay));
    }

    /// The settled value, once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, deadline)) if *deadline <= now => self.pending.take().map(|(v, _)| v),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }
}

/// Sort key for option labels: lower-cased with all whitespace removed.
pub fn sort_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOption<K> {
    pub id: K,
    pub label: String,
}

impl<K> SelectionOption<K> {
    pub fn new(id: K, label: impl Into<String>) -> Self {
        Self { id, label: label.into() }
    }
}

/// A filterable, sorted list of options. The selection itself is owned by
/// the caller; [`toggle`](Self::toggle) hands back a modified copy.
#[derive(Debug, Clone)]
pub struct SelectionSection<K> {
    options: Vec<SelectionOption<K>>,
    query: String,
    applied: String,
    debounce: Debouncer<String>,
    selected_only: bool,
    matches: Vec<usize>,
    cursor: usize,
    recomputes: usize,
}

impl<K: Ord + Clone> SelectionSection<K> {
    pub fn new(mut options: Vec<SelectionOption<K>>) -> Self {
        options.sort_by_cached_key(|o| sort_key(&o.label));
        let matches = (0..options.len()).collect();
        Self {
            options,
            query: String::new(),
            applied: String::new(),
            debounce: Debouncer::new(DEFAULT_DEBOUNCE),
            selected_only: false,
            matches,
            cursor: 0,
            recomputes: 0,
        }
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce = Debouncer::new(delay);
        self
    }

    /// The query as typed, which may not be applied yet.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>, now: Instant) {
        self.query = query.into();
        self.debounce.push(self.query.clone(), now);
    }

    pub fn push_char(&mut self, c: char, now: Instant) {
        let mut q = self.query.clone();
        q.push(c);
        self.set_query(q, now);
    }

    pub fn pop_char(&mut self, now: Instant) {
        let mut q = self.query.clone();
        if q.pop().is_some() {
            self.set_query(q, now);
        }
    }

    /// Apply a settled query. Returns `true` when the list was recomputed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let Some(query) = self.debounce.poll(now) else {
            return false;
        };
        self.applied = query;
        self.recompute();
        true
    }

    fn recompute(&mut self) {
        let needle = self.applied.trim().to_lowercase();
        self.matches = self
            .options
            .iter()
            .enumerate()
            .filter(|(_, o)| needle.is_empty() || o.label.to_lowercase().contains(&needle))
            .map(|(i, _)| i)
            .collect();
        self.cursor = 0;
        self.recomputes += 1;
        trace!(query = %self.applied, matches = self.matches.len(), "selection filtered");
    }

    /// Filter recomputations run so far.
    pub fn recompute_count(&self) -> usize {
        self.recomputes
    }

    pub fn selected_only(&self) -> bool {
        self.selected_only
    }

    pub fn set_selected_only(&mut self, on: bool) {
        self.selected_only = on;
        self.cursor = 0;
    }

    /// Options to display, in display order.
    pub fn visible<'a>(&'a self, selection: &BTreeSet<K>) -> Vec<&'a SelectionOption<K>> {
        self.matches
            .iter()
            .map(|&i| &self.options[i])
            .filter(|o| !self.selected_only || selection.contains(&o.id))
            .collect()
    }

    pub fn is_empty(&self, selection: &BTreeSet<K>) -> bool {
        self.visible(selection).is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_down(&mut self, selection: &BTreeSet<K>) {
        let len = self.visible(selection).len();
        if self.cursor + 1 < len {
            self.cursor += 1;
        }
    }

    pub fn current(&self, selection: &BTreeSet<K>) -> Option<K> {
        self.visible(selection).get(self.cursor).map(|o| o.id.clone())
    }

    /// Call `on_change` with a copy of `selection` in which `id` is flipped.
    pub fn toggle(&self, id: &K, selection: &BTreeSet<K>, on_change: impl FnOnce(BTreeSet<K>)) {
        let mut next = selection.clone();
        if !next.remove(id) {
            next.insert(id.clone());
        }
        on_change(next);
    }

    pub fn toggle_current(&mut self, selection: &BTreeSet<K>, on_change: impl FnOnce(BTreeSet<K>)) {
        if let Some(id) = self.current(selection) {
            self.toggle(&id, selection, on_change);
        }
        let len = self.visible(selection).len();
        if self.cursor >= len {
            self.cursor = len.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(labels: &[&str]) -> SelectionSection<String> {
        SelectionSection::new(labels.iter().map(|l| SelectionOption::new(l.to_string(), *l)).collect())
    }

    fn labels(s: &SelectionSection<String>, sel: &BTreeSet<String>) -> Vec<String> {
        s.visible(sel).into_iter().map(|o| o.label.clone()).collect()
    }

    #[test]
    fn sorts_ignoring_case_and_whitespace() {
        let s = section(&["site c", "Site B", "SiteA"]);
        assert_eq!(labels(&s, &BTreeSet::new()), vec!["SiteA", "Site B", "site c"]);
    }

    #[test]
    fn burst_of_keystrokes_recomputes_once() {
        let names: Vec<String> = (0..500).map(|i| format!("user{i:03}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut s = section(&refs);
        let t0 = Instant::now();
        for (i, c) in "user042".chars().enumerate() {
            s.push_char(c, t0 + Duration::from_millis(25 * i as u64));
        }
        assert!(!s.tick(t0 + Duration::from_millis(150)));
        assert_eq!(s.recompute_count(), 0);
        assert_eq!(labels(&s, &BTreeSet::new()).len(), 500);

        assert!(s.tick(t0 + Duration::from_millis(400)));
        assert!(!s.tick(t0 + Duration::from_millis(500)));
        assert_eq!(s.recompute_count(), 1);
        assert_eq!(labels(&s, &BTreeSet::new()), vec!["user042"]);
    }

    #[test]
    fn toggle_twice_restores_selection() {
        let s = section(&["a", "b"]);
        let original: BTreeSet<String> = ["a".to_string()].into();
        let mut once = BTreeSet::new();
        s.toggle(&"b".to_string(), &original, |next| once = next);
        assert_eq!(once, ["a".to_string(), "b".to_string()].into());
        let mut twice = BTreeSet::new();
        s.toggle(&"b".to_string(), &once, |next| twice = next);
        assert_eq!(twice, original);
        assert_eq!(original.len(), 1);
    }

    #[test]
    fn selected_only_and_empty_state() {
        let mut s = section(&["a", "b"]);
        let none = BTreeSet::new();
        s.set_selected_only(true);
        assert!(s.is_empty(&none));
        let sel: BTreeSet<String> = ["b".to_string()].into();
        assert_eq!(labels(&s, &sel), vec!["b"]);
    }
}
