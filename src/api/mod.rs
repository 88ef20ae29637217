//! Admin API boundary: records, error shape, and the `AdminApi` trait.
//!
//! The console never talks to storage directly; every page and form goes
//! through an [`AdminApi`] implementation. [`memory::MemoryApi`] is the
//! bundled one, backed by a JSON document.
//!
pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub use memory::MemoryApi;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Second factor enforced when connecting to a location.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationMfaMode {
    #[default]
    Disabled,
    Internal,
    External,
}

impl LocationMfaMode {
    pub const ALL: [LocationMfaMode; 3] = [Self::Disabled, Self::Internal, Self::External];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Internal => "internal",
            Self::External => "external",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

/// Whether a location is brought up by the system service before login.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceLocationMode {
    #[default]
    Disabled,
    Prelogon,
    Alwayson,
}

impl ServiceLocationMode {
    pub const ALL: [ServiceLocationMode; 3] = [Self::Disabled, Self::Prelogon, Self::Alwayson];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Prelogon => "prelogon",
            Self::Alwayson => "alwayson",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

/// A WireGuard network location (gateway endpoint plus its VPN subnet).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Zero for a location that has not been created yet.
    pub id: u64,
    pub name: String,
    pub endpoint: String,
    pub port: u16,
    /// VPN subnet in CIDR notation, e.g. `10.10.0.0/24`.
    pub network: String,
    #[serde(default)]
    pub allowed_ips: String,
    #[serde(default)]
    pub location_mfa_mode: LocationMfaMode,
    #[serde(default)]
    pub service_location_mode: ServiceLocationMode,
    #[serde(default = "default_keepalive")]
    pub keepalive_interval: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: u64,
    pub name: String,
    pub username: String,
    pub location_id: u64,
    pub wireguard_ip: String,
    pub wireguard_pubkey: String,
    #[serde(default)]
    pub description: String,
}

/// Body of a device creation request; the server assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDevice {
    pub name: String,
    pub username: String,
    pub location_id: u64,
    pub wireguard_ip: String,
    pub wireguard_pubkey: String,
    pub description: String,
}

fn default_true() -> bool {
    true
}

fn default_keepalive() -> u32 {
    25
}

/// Structured rejection returned by the server for a failed mutation.
///
/// `field` names the form field the rejection belongs to, when the server
/// can attribute it to one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    pub status: u16,
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
}

impl ProblemDetails {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            detail: None,
            field: None,
        }
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Text shown to the user: the detail when present, otherwise the title.
    pub fn message(&self) -> &str {
        self.detail.as_deref().unwrap_or(&self.title)
    }
}

impl Display for ProblemDetails {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(d) => write!(f, "{} ({}): {}", self.title, self.status, d),
            None => write!(f, "{} ({})", self.title, self.status),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Problem(ProblemDetails),
    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn conflict(field: &str, detail: impl Into<String>) -> Self {
        Self::Problem(ProblemDetails::new(409, "Conflict").detail(detail).field(field))
    }

    pub fn invalid(field: &str, detail: impl Into<String>) -> Self {
        Self::Problem(ProblemDetails::new(400, "Bad request").detail(detail).field(field))
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::Problem(ProblemDetails::new(404, "Not found").detail(detail))
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Operations the console performs against the administration server.
pub trait AdminApi: Send + Sync {
    fn list_users(&self) -> ApiResult<Vec<User>>;
    fn create_user(&self, user: User) -> ApiResult<User>;
    /// Update the user currently named `username`; the record may rename it.
    fn update_user(&self, username: &str, user: User) -> ApiResult<User>;
    fn delete_user(&self, username: &str) -> ApiResult<()>;

    fn list_groups(&self) -> ApiResult<Vec<Group>>;
    fn create_group(&self, name: &str, is_admin: bool) -> ApiResult<Group>;
    fn set_group_members(&self, name: &str, members: Vec<String>) -> ApiResult<Group>;

    fn list_locations(&self) -> ApiResult<Vec<Location>>;
    /// Create when `location.id == 0`, update otherwise.
    fn save_location(&self, location: Location) -> ApiResult<Location>;

    fn list_devices(&self) -> ApiResult<Vec<Device>>;
    fn create_device(&self, device: NewDevice) -> ApiResult<Device>;
}
