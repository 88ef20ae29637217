//! Declarative schema validation for form values.
use base64::Engine as _;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{FieldValue, FormValues};

/// Field name to the first failing message for that field.
pub type FieldErrors = BTreeMap<&'static str, String>;

type CustomCheck = Arc<dyn Fn(&FieldValue) -> Result<(), String> + Send + Sync>;
type Refinement = Arc<dyn Fn(&FormValues) -> Vec<(&'static str, String)> + Send + Sync>;

/// A single-field constraint. Everything except `Required` accepts an
/// empty value, so optional fields are expressed by omitting `Required`.
#[derive(Clone)]
pub enum Check {
    Required,
    MinLen(usize),
    MaxLen(usize),
    OneOf(Vec<&'static str>),
    Email,
    Ipv4,
    Port,
    WireguardKey,
    Custom(CustomCheck),
}

impl Check {
    pub fn custom(f: impl Fn(&FieldValue) -> Result<(), String> + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    pub fn check(&self, value: &FieldValue) -> Result<(), String> {
        if !matches!(self, Check::Required) && value.is_empty() {
            return Ok(());
        }
        let s = value.as_str().trim();
        match self {
            Check::Required => {
                if value.is_empty() {
                    Err("This field is required".to_string())
                } else {
                    Ok(())
                }
            }
            Check::MinLen(n) if s.chars().count() < *n => Err(format!("Minimum length is {n}")),
            Check::MaxLen(n) if s.chars().count() > *n => Err(format!("Maximum length is {n}")),
            Check::MinLen(_) | Check::MaxLen(_) => Ok(()),
            Check::OneOf(options) => {
                if options.iter().any(|o| *o == s) {
                    Ok(())
                } else {
                    Err(format!("Must be one of: {}", options.join(", ")))
                }
            }
            Check::Email => {
                let valid = s.split_once('@').is_some_and(|(local, domain)| {
                    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
                }) && !s.contains(char::is_whitespace);
                if valid { Ok(()) } else { Err("Enter a valid email address".to_string()) }
            }
            Check::Ipv4 => s
                .parse::<std::net::Ipv4Addr>()
                .map(|_| ())
                .map_err(|_| "Enter a valid IPv4 address".to_string()),
            Check::Port => match s.parse::<u16>() {
                Ok(p) if p > 0 => Ok(()),
                _ => Err("Port must be between 1 and 65535".to_string()),
            },
            Check::WireguardKey => match base64::engine::general_purpose::STANDARD.decode(s) {
                Ok(bytes) if bytes.len() == 32 => Ok(()),
                _ => Err("Enter a 32 byte base64 WireGuard public key".to_string()),
            },
            Check::Custom(f) => f(value),
        }
    }
}

/// Per-field checks plus whole-form refinements for cross-field constraints.
#[derive(Clone, Default)]
pub struct Schema {
    fields: Vec<(&'static str, Vec<Check>)>,
    refinements: Vec<Refinement>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: &'static str, checks: impl IntoIterator<Item = Check>) -> Self {
        self.fields.push((name, checks.into_iter().collect()));
        self
    }

    pub fn refine(
        mut self,
        f: impl Fn(&FormValues) -> Vec<(&'static str, String)> + Send + Sync + 'static,
    ) -> Self {
        self.refinements.push(Arc::new(f));
        self
    }

    pub fn validate(&self, values: &FormValues) -> FieldErrors {
        let mut errors = FieldErrors::new();
        let empty = FieldValue::Text(String::new());
        for (name, checks) in &self.fields {
            let value = values.get(name).unwrap_or(&empty);
            if let Some(msg) = checks.iter().find_map(|c| c.check(value).err()) {
                errors.insert(*name, msg);
            }
        }
        for refine in &self.refinements {
            for (name, msg) in refine(values) {
                errors.entry(name).or_insert(msg);
            }
        }
        errors
    }
}

/// Schemas run on change and on submit.
#[derive(Clone, Default)]
pub struct Validators {
    pub on_change: Option<Schema>,
    pub on_submit: Schema,
}

impl Validators {
    pub fn on_submit(schema: Schema) -> Self {
        Self { on_change: None, on_submit: schema }
    }

    pub fn with_on_change(mut self, schema: Schema) -> Self {
        self.on_change = Some(schema);
        self
    }

    /// Errors for a change event. Until a submit was attempted only the
    /// on-change schema applies (falling back to the submit schema when
    /// there is none); afterwards both apply, on-change messages first.
    pub fn change_errors(&self, values: &FormValues, submitted: bool) -> FieldErrors {
        match (&self.on_change, submitted) {
            (Some(change), false) => change.validate(values),
            (None, _) => self.on_submit.validate(values),
            (Some(change), true) => {
                let mut errors = change.validate(values);
                for (k, v) in self.on_submit.validate(values) {
                    errors.entry(k).or_insert(v);
                }
                errors
            }
        }
    }

    pub fn submit_errors(&self, values: &FormValues) -> FieldErrors {
        self.change_errors(values, true)
    }
}
