//! Modal catalogue and orchestration.
//!
//! Every modal the console can show is declared once in the catalogue below,
//! together with the payload it must be opened with. The [`Modal`] trait
//! ties a marker type to its [`ModalName`] and payload, so
//! [`ModalRegistry::open`] and [`ModalRegistry::subscribe_open`] cannot be
//! called with the wrong data.
//!
pub mod lifecycle;
pub mod registry;

pub use lifecycle::{HostControl, ModalHost, ModalLifecycle, ModalPhase};
pub use registry::{FocusTracker, ModalRegistry, Subscription};

/// A modal known to the registry.
pub trait Modal: 'static {
    const NAME: ModalName;
    type Payload: Send + Sync + 'static;
}

/// Data for the device provisioning modal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceSeed {
    pub username: Option<String>,
    pub location_id: Option<u64>,
}

/// A user-visible failure or informational message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { title: "Request failed".to_string(), message: message.into() }
    }
}

macro_rules! modal_catalogue {
    ($( $(#[$doc:meta])* $name:ident => $payload:ty ),+ $(,)?) => {
        /// Unique name of every modal in the console.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ModalName {
            $( $name ),+
        }

        impl ModalName {
            pub const ALL: &'static [ModalName] = &[$( ModalName::$name ),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( ModalName::$name => stringify!($name) ),+
                }
            }
        }

        /// Marker types, one per catalogue entry.
        pub mod kinds {
            $(
                $(#[$doc])*
                #[derive(Debug)]
                pub struct $name;

                impl super::Modal for $name {
                    const NAME: super::ModalName = super::ModalName::$name;
                    type Payload = $payload;
                }
            )+
        }
    };
}

modal_catalogue! {
    /// Create a user account.
    AddUser => (),
    /// Edit the profile of an existing user.
    EditUser => crate::api::User,
    /// Confirm deletion of a user.
    DeleteUser => crate::api::User,
    /// Create a group.
    AddGroup => (),
    /// Choose the members of a group.
    EditGroupMembers => crate::api::Group,
    /// Create (`None`) or edit a network location.
    EditLocation => Option<crate::api::Location>,
    /// Provision a WireGuard device.
    AddDevice => crate::modal::DeviceSeed,
    /// Show a failure or informational message.
    Notice => crate::modal::Notice,
}

impl std::fmt::Display for ModalName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
