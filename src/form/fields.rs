//! Field descriptors and their keyboard editing behaviour.
use crossterm::event::KeyCode;
use std::collections::BTreeMap;

use super::ip::{Ipv4Network, SuggestedIp};
use super::{FieldValue, FormValues, ValuesExt};

/// `(value, label)` pairs for choice fields.
pub type Options = Vec<(String, String)>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Input { secret: bool },
    Textarea,
    Select { options: Options },
    Radio { options: Options },
    Checkbox,
    Toggle,
    /// Takes a file path; the host reads the file.
    Upload,
    /// IPv4 address within the network chosen by `network_field`. Only the
    /// host octets are editable.
    SuggestedIp {
        network_field: &'static str,
        networks: BTreeMap<String, Ipv4Network>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

fn options<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Options {
    pairs.into_iter().map(|(v, l)| (v.to_string(), l.to_string())).collect()
}

impl FieldSpec {
    pub fn input(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Input { secret: false } }
    }

    pub fn secret(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Input { secret: true } }
    }

    pub fn textarea(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Textarea }
    }

    pub fn select<'a>(
        name: &'static str,
        label: &'static str,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self { name, label, kind: FieldKind::Select { options: options(pairs) } }
    }

    pub fn radio<'a>(
        name: &'static str,
        label: &'static str,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        Self { name, label, kind: FieldKind::Radio { options: options(pairs) } }
    }

    pub fn checkbox(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Checkbox }
    }

    pub fn toggle(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Toggle }
    }

    pub fn upload(name: &'static str, label: &'static str) -> Self {
        Self { name, label, kind: FieldKind::Upload }
    }

    pub fn suggested_ip(
        name: &'static str,
        label: &'static str,
        network_field: &'static str,
        networks: BTreeMap<String, Ipv4Network>,
    ) -> Self {
        Self { name, label, kind: FieldKind::SuggestedIp { network_field, networks } }
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Input { .. } | FieldKind::Textarea | FieldKind::SuggestedIp { .. }
        )
    }

    /// Network the IP field currently edits within, if any.
    pub fn network(&self, values: &FormValues) -> Option<Ipv4Network> {
        match &self.kind {
            FieldKind::SuggestedIp { network_field, networks } => {
                networks.get(&values.text(network_field)).copied()
            }
            _ => None,
        }
    }

    /// New value of this field after `key`, or `None` when the key does not
    /// edit it.
    pub fn edit(&self, values: &FormValues, key: KeyCode) -> Option<FieldValue> {
        let current = values.get(self.name)?;
        match &self.kind {
            FieldKind::Input { .. } => edit_text(current.as_str(), key, false).map(FieldValue::Text),
            FieldKind::Textarea => edit_text(current.as_str(), key, true).map(FieldValue::Text),
            FieldKind::Select { options } | FieldKind::Radio { options } => {
                let step = match key {
                    KeyCode::Left => -1,
                    KeyCode::Right | KeyCode::Char(' ') => 1,
                    _ => return None,
                };
                cycle(options, current.as_str(), step).map(FieldValue::Choice)
            }
            FieldKind::Checkbox | FieldKind::Toggle => match key {
                KeyCode::Char(' ') => Some(FieldValue::Flag(!current.as_flag())),
                _ => None,
            },
            FieldKind::Upload => match key {
                KeyCode::Delete => Some(FieldValue::File(None)),
                _ => None,
            },
            FieldKind::SuggestedIp { .. } => {
                let allowed = |c: char| c.is_ascii_digit() || c == '.';
                if let KeyCode::Char(c) = key {
                    if !allowed(c) {
                        return None;
                    }
                }
                match self.network(values) {
                    Some(net) => {
                        let mut split = SuggestedIp::split(&net, current.as_str());
                        split.host_part = edit_text(&split.host_part, key, false)?;
                        Some(FieldValue::Text(split.join()))
                    }
                    None => edit_text(current.as_str(), key, false).map(FieldValue::Text),
                }
            }
        }
    }

    /// Label of the current choice, for select and radio fields.
    pub fn choice_label<'a>(&'a self, value: &'a FieldValue) -> &'a str {
        match &self.kind {
            FieldKind::Select { options } | FieldKind::Radio { options } => options
                .iter()
                .find(|(v, _)| v == value.as_str())
                .map_or(value.as_str(), |(_, l)| l.as_str()),
            _ => value.as_str(),
        }
    }
}

fn edit_text(current: &str, key: KeyCode, multiline: bool) -> Option<String> {
    let mut s = current.to_string();
    match key {
        KeyCode::Char(c) => s.push(c),
        KeyCode::Backspace => {
            s.pop()?;
        }
        KeyCode::Enter if multiline => s.push('\n'),
        _ => return None,
    }
    Some(s)
}

fn cycle(options: &Options, current: &str, step: isize) -> Option<String> {
    if options.is_empty() {
        return None;
    }
    let len = options.len() as isize;
    let idx = options.iter().position(|(v, _)| v == current).map_or(0, |i| i as isize);
    let next = (idx + step).rem_euclid(len) as usize;
    Some(options[next].0.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: Vec<(&'static str, FieldValue)>) -> FormValues {
        pairs.into_iter().collect()
    }

    #[test]
    fn text_input_appends_and_backspaces() {
        let spec = FieldSpec::input("name", "Name");
        let v = values(vec![("name", FieldValue::text("ab"))]);
        assert_eq!(spec.edit(&v, KeyCode::Char('c')), Some(FieldValue::text("abc")));
        assert_eq!(spec.edit(&v, KeyCode::Backspace), Some(FieldValue::text("a")));
        assert_eq!(spec.edit(&v, KeyCode::Enter), None);
    }

    #[test]
    fn select_cycles_and_wraps() {
        let spec = FieldSpec::select("mode", "Mode", [("a", "A"), ("b", "B"), ("c", "C")]);
        let v = values(vec![("mode", FieldValue::choice("a"))]);
        assert_eq!(spec.edit(&v, KeyCode::Right), Some(FieldValue::choice("b")));
        assert_eq!(spec.edit(&v, KeyCode::Left), Some(FieldValue::choice("c")));
        assert_eq!(spec.choice_label(&FieldValue::choice("b")), "B");
    }

    #[test]
    fn toggle_flips_on_space() {
        let spec = FieldSpec::toggle("active", "Active");
        let v = values(vec![("active", FieldValue::Flag(false))]);
        assert_eq!(spec.edit(&v, KeyCode::Char(' ')), Some(FieldValue::Flag(true)));
    }

    #[test]
    fn suggested_ip_edits_only_host_part() {
        let networks: BTreeMap<String, Ipv4Network> =
            [("1".to_string(), Ipv4Network::parse("10.10.0.0/24").unwrap())].into();
        let spec = FieldSpec::suggested_ip("wireguard_ip", "Address", "location_id", networks);
        let v = values(vec![
            ("location_id", FieldValue::choice("1")),
            ("wireguard_ip", FieldValue::text("10.10.0.")),
        ]);
        assert_eq!(spec.edit(&v, KeyCode::Backspace), None);
        assert_eq!(spec.edit(&v, KeyCode::Char('9')), Some(FieldValue::text("10.10.0.9")));
        assert_eq!(spec.edit(&v, KeyCode::Char('x')), None);
    }
}
