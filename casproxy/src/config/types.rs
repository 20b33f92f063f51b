use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_CAS_VALIDATE: &str = "validate";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:60000";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_API_LISTEN_ADDR: &str = "0.0.0.0:8081";
pub const DEFAULT_SUBJECT_TYPE: &str = "user";
pub const DEFAULT_RESOURCE_TYPE: &str = "analysis";

/// Where CAS lives and what this proxy calls itself when talking to it.
#[derive(Debug, Clone)]
pub struct CasSettings {
    // Base URL of the CAS server, e.g. https://auth.example.org/cas
    pub(crate) base_url: Url,
    // Path of the validation endpoint, relative to base_url
    pub(crate) validate_path: String,
    // Public URL of this proxy, placed into the CAS `service` parameter
    pub(crate) frontend_url: Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStoreKind {
    /// Sessions live in process memory; the cookie only carries an opaque token.
    #[default]
    Memory,
    /// The session is serialized into an HMAC-signed cookie; nothing is kept server side.
    Cookie,
}

#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    // Idle timeout in seconds, 0 disables expiry
    pub(crate) max_age: u64,
    pub(crate) store: SessionStoreKind,
    // Signing key for the cookie store; a random key is generated when absent
    pub(crate) secret: Option<String>,
}

/// The single backend used by the `cas` variant.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub(crate) backend_url: Url,
    pub(crate) ws_backend_url: Url,
}

/// Everything needed to ask the permission service about one resource.
#[derive(Debug, Clone)]
pub struct PermissionSettings {
    pub(crate) permissions_url: Url,
    pub(crate) subject_type: String,
    pub(crate) resource_type: String,
    pub(crate) resource_name: String,
}

#[derive(Debug, Clone)]
pub struct ListenSettings {
    pub(crate) listen_addr: SocketAddr,
    pub(crate) ssl_cert: Option<PathBuf>,
    pub(crate) ssl_key: Option<PathBuf>,
}

impl CasSettings {
    pub fn new(base_url: Url, validate_path: impl Into<String>, frontend_url: Url) -> Self {
        Self { base_url, validate_path: validate_path.into(), frontend_url }
    }

    pub fn get_base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn get_validate_path(&self) -> &str {
        &self.validate_path
    }

    pub fn get_frontend_url(&self) -> &Url {
        &self.frontend_url
    }
}

impl SessionSettings {
    pub fn new(max_age: u64, store: SessionStoreKind, secret: Option<String>) -> Self {
        Self { max_age, store, secret }
    }

    pub fn get_max_age(&self) -> u64 {
        self.max_age
    }

    pub fn get_store(&self) -> SessionStoreKind {
        self.store
    }
}

impl BackendSettings {
    pub fn get_backend_url(&self) -> &Url {
        &self.backend_url
    }

    pub fn get_ws_backend_url(&self) -> &Url {
        &self.ws_backend_url
    }
}

impl PermissionSettings {
    pub fn new(permissions_url: Url, subject_type: impl Into<String>, resource_type: impl Into<String>, resource_name: impl Into<String>) -> Self {
        Self { permissions_url, subject_type: subject_type.into(), resource_type: resource_type.into(), resource_name: resource_name.into() }
    }

    pub fn get_permissions_url(&self) -> &Url {
        &self.permissions_url
    }

    pub fn get_resource_name(&self) -> &str {
        &self.resource_name
    }
}

impl ListenSettings {
    pub fn new(listen_addr: SocketAddr, ssl_cert: Option<PathBuf>, ssl_key: Option<PathBuf>) -> Self {
        Self { listen_addr, ssl_cert, ssl_key }
    }

    pub fn get_listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }
}

impl Display for SessionStoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStoreKind::Memory => write!(f, "memory"),
            SessionStoreKind::Cookie => write!(f, "cookie"),
        }
    }
}
