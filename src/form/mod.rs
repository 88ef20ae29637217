//! Form engine shared by every dialog in the console.
//!
//! A [`FormSession`] owns field values, per-field touched/dirty state and
//! validation errors, and drives submission. All forms use the same
//! [`ValidationPolicy`], so error timing is identical everywhere.
//!
pub mod fields;
pub mod ip;
pub mod rules;
pub mod session;
pub mod validate;

use std::collections::{BTreeMap, BTreeSet};

pub use fields::{FieldKind, FieldSpec};
pub use rules::{FieldRule, MutuallyExclusive, Recompute};
pub use session::{PendingSubmit, SubmitAttempt, SubmitHandler, SubmitOutcome, SubmitResolver, FormSession};
pub use validate::{Check, FieldErrors, Schema, Validators};

/// A file picked through an upload field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub contents: Vec<u8>,
}

impl Upload {
    pub fn read(path: &str) -> std::io::Result<Self> {
        let contents = std::fs::read(path)?;
        let name = std::path::Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        Ok(Self { name, contents })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).trim().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Choice(String),
    Set(BTreeSet<String>),
    File(Option<Upload>),
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn choice(s: impl Into<String>) -> Self {
        Self::Choice(s.into())
    }

    /// String form of text-like values; empty for flags, sets and files.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text(s) | Self::Choice(s) => s,
            Self::Flag(_) | Self::Set(_) | Self::File(_) => "",
        }
    }

    pub fn as_flag(&self) -> bool {
        matches!(self, Self::Flag(true))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(s) | Self::Choice(s) => s.trim().is_empty(),
            Self::Flag(_) => false,
            Self::Set(s) => s.is_empty(),
            Self::File(f) => f.is_none(),
        }
    }
}

/// Field name to value. Field names are fixed by the form definition.
pub type FormValues = BTreeMap<&'static str, FieldValue>;

/// Read helpers over [`FormValues`].
pub trait ValuesExt {
    fn text(&self, field: &str) -> String;
    fn flag(&self, field: &str) -> bool;
    fn set(&self, field: &str) -> BTreeSet<String>;
}

impl ValuesExt for FormValues {
    fn text(&self, field: &str) -> String {
        self.get(field).map(|v| v.as_str().trim().to_string()).unwrap_or_default()
    }

    fn flag(&self, field: &str) -> bool {
        self.get(field).is_some_and(FieldValue::as_flag)
    }

    fn set(&self, field: &str) -> BTreeSet<String> {
        match self.get(field) {
            Some(FieldValue::Set(s)) => s.clone(),
            _ => BTreeSet::new(),
        }
    }
}

/// When validation runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    OnChange,
    OnBlur,
    OnSubmit,
}

/// Validation timing before (`mode`) and after (`revalidate`) the first
/// submit attempt.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub mode: Trigger,
    pub revalidate: Trigger,
}

impl ValidationPolicy {
    /// Validate on every change, and keep doing so after a submit attempt.
    pub const fn standard() -> Self {
        Self { mode: Trigger::OnChange, revalidate: Trigger::OnChange }
    }

    /// Whether a field-level `trigger` revalidates. Submit always validates.
    pub fn runs_on(&self, trigger: Trigger, submitted: bool) -> bool {
        let active = if submitted { self.revalidate } else { self.mode };
        match active {
            Trigger::OnChange => matches!(trigger, Trigger::OnChange | Trigger::OnBlur),
            Trigger::OnBlur => trigger == Trigger::OnBlur,
            Trigger::OnSubmit => false,
        }
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
