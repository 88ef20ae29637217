//! Cross-field rules evaluated as a pure reducer step.
//!
//! On every user edit, each rule is given the name of the edited field and
//! the current values, and returns the writes it wants. Writes are applied
//! only when they change a value and never re-run the rules, so two rules
//! that reset each other cannot loop.
//!
use std::sync::Arc;

use super::{FieldValue, FormValues};

pub trait FieldRule: Send + Sync {
    fn reduce(&self, changed: &str, values: &FormValues) -> Vec<(&'static str, FieldValue)>;
}

/// Two fields that may not both be enabled. Enabling one resets the other
/// to its disabled value.
#[derive(Clone, Debug)]
pub struct MutuallyExclusive {
    pub a: &'static str,
    pub a_off: FieldValue,
    pub b: &'static str,
    pub b_off: FieldValue,
}

impl MutuallyExclusive {
    pub fn new(a: &'static str, a_off: FieldValue, b: &'static str, b_off: FieldValue) -> Self {
        Self { a, a_off, b, b_off }
    }
}

impl FieldRule for MutuallyExclusive {
    fn reduce(&self, changed: &str, values: &FormValues) -> Vec<(&'static str, FieldValue)> {
        let (this, this_off, other, other_off) = if changed == self.a {
            (self.a, &self.a_off, self.b, &self.b_off)
        } else if changed == self.b {
            (self.b, &self.b_off, self.a, &self.a_off)
        } else {
            return Vec::new();
        };
        let enabled = values.get(this).is_some_and(|v| v != this_off);
        let other_enabled = values.get(other).is_some_and(|v| v != other_off);
        if enabled && other_enabled {
            vec![(other, other_off.clone())]
        } else {
            Vec::new()
        }
    }
}

type Derive = Arc<dyn Fn(&FormValues) -> Option<FieldValue> + Send + Sync>;

/// Recompute `target` from the whole form whenever `source` changes.
#[derive(Clone)]
pub struct Recompute {
    source: &'static str,
    target: &'static str,
    derive: Derive,
}

impl Recompute {
    pub fn new(
        source: &'static str,
        target: &'static str,
        derive: impl Fn(&FormValues) -> Option<FieldValue> + Send + Sync + 'static,
    ) -> Self {
        Self { source, target, derive: Arc::new(derive) }
    }
}

impl FieldRule for Recompute {
    fn reduce(&self, changed: &str, values: &FormValues) -> Vec<(&'static str, FieldValue)> {
        if changed != self.source {
            return Vec::new();
        }
        (self.derive)(values).map(|v| vec![(self.target, v)]).unwrap_or_default()
    }
}

/// Apply `rules` for an edit of `changed`, returning the next values and
/// the fields that were actually written.
pub fn reconcile(
    rules: &[Box<dyn FieldRule>],
    changed: &str,
    values: &FormValues,
) -> (FormValues, Vec<&'static str>) {
    let mut next = values.clone();
    let mut written = Vec::new();
    for rule in rules {
        for (field, value) in rule.reduce(changed, &next) {
            if field == changed {
                continue;
            }
            if next.get(field) != Some(&value) {
                next.insert(field, value);
                written.push(field);
            }
        }
    }
    (next, written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes(mfa: &str, service: &str) -> FormValues {
        let mut v = FormValues::new();
        v.insert("location_mfa_mode", FieldValue::choice(mfa));
        v.insert("service_location_mode", FieldValue::choice(service));
        v
    }

    fn exclusive() -> Vec<Box<dyn FieldRule>> {
        vec![Box::new(MutuallyExclusive::new(
            "location_mfa_mode",
            FieldValue::choice("disabled"),
            "service_location_mode",
            FieldValue::choice("disabled"),
        ))]
    }

    #[test]
    fn enabling_one_side_resets_the_other() {
        let (next, written) = reconcile(&exclusive(), "location_mfa_mode", &modes("external", "alwayson"));
        assert_eq!(next["service_location_mode"], FieldValue::choice("disabled"));
        assert_eq!(written, vec!["service_location_mode"]);
    }

    #[test]
    fn already_disabled_target_is_not_written() {
        let (next, written) = reconcile(&exclusive(), "location_mfa_mode", &modes("internal", "disabled"));
        assert_eq!(next, modes("internal", "disabled"));
        assert!(written.is_empty());
    }

    #[test]
    fn unrelated_field_is_ignored() {
        let (_, written) = reconcile(&exclusive(), "name", &modes("internal", "prelogon"));
        assert!(written.is_empty());
    }

    #[test]
    fn recompute_derives_target_from_source() {
        let rules: Vec<Box<dyn FieldRule>> = vec![Box::new(Recompute::new("a", "b", |v| {
            v.get("a").map(|a| FieldValue::text(format!("{}!", a.as_str())))
        }))];
        let mut v = FormValues::new();
        v.insert("a", FieldValue::text("x"));
        let (next, written) = reconcile(&rules, "a", &v);
        assert_eq!(next["b"], FieldValue::text("x!"));
        assert_eq!(written, vec!["b"]);
    }
}
