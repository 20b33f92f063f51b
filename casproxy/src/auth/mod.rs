// Authentication module
//
// Everything that decides whether a request may reach a backend:
// - cas: CAS ticket validation and the redirect to the CAS login page
// - session: Session stores and the gate that short-circuits re-validation
// - permissions: Optional permission-service check
// - apps: Startup lookup of the resource name guarded by the permission check

pub mod apps;
pub mod cas;
pub mod permissions;
pub mod session;

pub use cas::TicketValidator;
pub use permissions::AccessController;
pub use session::{CookieStore, MemoryStore, SessionGate, SessionStore};

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identity string handed back by CAS. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Option<Self> {
        let name = name.into();
        if name.is_empty() { None } else { Some(Self(name)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Principal {
    type Error = &'static str;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value).ok_or("session value was empty instead of a username")
    }
}

impl From<Principal> for String {
    fn from(principal: Principal) -> Self {
        principal.0
    }
}

impl Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
