use crate::config::types::{BackendSettings, CasSettings, ListenSettings, PermissionSettings, SessionSettings, SessionStoreKind};
use crate::utils::validation::{is_empty_or_whitespace, is_http_url, is_ws_url};
use anyhow::{Result, anyhow, bail};
use log::warn;
use rand::RngCore;
use std::path::Path;
use url::Url;

const MIN_SECRET_LEN: usize = 32;

impl CasSettings {
    /// Both URLs must be absolute http(s) URLs and the validation path must be set
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.base_url) {
            bail!("CAS base URL {} must be an absolute http(s) URL", self.base_url);
        }
        if !is_http_url(&self.frontend_url) {
            bail!("frontend URL {} must be an absolute http(s) URL", self.frontend_url);
        }
        if is_empty_or_whitespace(&self.validate_path) {
            bail!("CAS validation path must not be empty");
        }
        Ok(())
    }
}

impl BackendSettings {
    /// Build backend settings, deriving the websocket URL from the HTTP one when it is not given.
    pub fn new(backend_url: Url, ws_backend_url: Option<Url>) -> Result<Self> {
        if !is_http_url(&backend_url) {
            bail!("backend URL {} must be an absolute http(s) URL", backend_url);
        }
        let ws_backend_url = match ws_backend_url {
            Some(url) => url,
            None => Self::derive_ws_url(&backend_url)?,
        };
        if !is_ws_url(&ws_backend_url) {
            bail!("websocket backend URL {} must be an absolute ws(s) URL", ws_backend_url);
        }
        Ok(Self { backend_url, ws_backend_url })
    }

    /// Same URL with `ws://` (or `wss://` for an https backend)
    pub fn derive_ws_url(backend_url: &Url) -> Result<Url> {
        let mut ws = backend_url.clone();
        let scheme = if backend_url.scheme() == "https" { "wss" } else { "ws" };
        ws.set_scheme(scheme).map_err(|_| anyhow!("cannot derive a websocket URL from {}", backend_url))?;
        Ok(ws)
    }
}

impl PermissionSettings {
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.permissions_url) {
            bail!("permissions URL {} must be an absolute http(s) URL", self.permissions_url);
        }
        if is_empty_or_whitespace(&self.subject_type) || is_empty_or_whitespace(&self.resource_type) {
            bail!("subject type and resource type must not be empty");
        }
        if is_empty_or_whitespace(&self.resource_name) {
            bail!("resource name must not be empty");
        }
        Ok(())
    }
}

impl ListenSettings {
    /// Certificate and key paths, when TLS is configured. Supplying only one of them is an error.
    pub fn tls_files(&self) -> Result<Option<(&Path, &Path)>> {
        match (&self.ssl_cert, &self.ssl_key) {
            (Some(cert), Some(key)) => Ok(Some((cert.as_path(), key.as_path()))),
            (None, None) => Ok(None),
            (Some(_), None) => bail!("an SSL key is required with the SSL certificate"),
            (None, Some(_)) => bail!("an SSL certificate is required with the SSL key"),
        }
    }
}

impl SessionSettings {
    /// Key used to sign cookie-store sessions
    pub fn signing_key(&self) -> Vec<u8> {
        match &self.secret {
            Some(secret) if !is_empty_or_whitespace(secret) => {
                if secret.len() < MIN_SECRET_LEN {
                    warn!("Session secret is shorter than {} bytes", MIN_SECRET_LEN);
                }
                secret.as_bytes().to_vec()
            }
            _ => {
                if self.store == SessionStoreKind::Cookie {
                    warn!("No session secret configured; using a random signing key, sessions will not survive a restart");
                }
                let mut key = vec![0u8; MIN_SECRET_LEN];
                rand::thread_rng().fill_bytes(&mut key);
                key
            }
        }
    }
}
