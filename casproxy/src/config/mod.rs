// Configuration module
//
// Settings are plain values handed to each component at construction; there is no global config.
// - types: Settings structures and defaults
// - validator: Startup-time checks and derived values

pub mod types;
pub mod validator;

pub use types::{BackendSettings, CasSettings, ListenSettings, PermissionSettings, SessionSettings, SessionStoreKind};
