use anyhow::{Context, Result, bail};
use casproxy::auth::apps::resolve_resource_name;
use casproxy::config::types::{
    DEFAULT_API_LISTEN_ADDR, DEFAULT_BACKEND_URL, DEFAULT_CAS_VALIDATE, DEFAULT_LISTEN_ADDR, DEFAULT_RESOURCE_TYPE, DEFAULT_SUBJECT_TYPE,
};
use casproxy::config::{BackendSettings, CasSettings, ListenSettings, PermissionSettings, SessionSettings, SessionStoreKind};
use casproxy::utils::http::HttpsClient;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug, Clone)]
#[command(name = "cas-proxy", about, author, version, long_about = None, propagate_version = true)]
pub struct CasProxyArguments {
    #[arg(short = 'l', long = "listen-addr", global = true, default_value = DEFAULT_LISTEN_ADDR, help = "Address the proxy listens on")]
    pub(crate) listen_addr: SocketAddr,
    #[arg(long = "ssl-cert", global = true, help = "PEM certificate chain; serves HTTPS together with --ssl-key")]
    pub(crate) ssl_cert: Option<PathBuf>,
    #[arg(long = "ssl-key", global = true, help = "PEM private key for --ssl-cert")]
    pub(crate) ssl_key: Option<PathBuf>,
    #[arg(short = 'v', long = "verbose", global = true, help = "Enable verbose logging")]
    pub(crate) verbose: bool,
    #[command(subcommand)]
    pub(crate) command: CasProxyCommands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CasProxyCommands {
    #[clap(name = "cas", about = "Authenticate with CAS in front of a single backend")]
    Cas(CasArgs),
    #[clap(name = "reverse-proxy", about = "Authenticate with CAS in front of routes registered at runtime")]
    ReverseProxy(ReverseProxyArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreArg {
    Memory,
    Cookie,
}

/// Flags shared by both subcommands
#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    #[arg(long = "cas-base-url", help = "Base URL of the CAS server, e.g. https://auth.example.org/cas")]
    pub cas_base_url: Url,
    #[arg(long = "cas-validate", default_value = DEFAULT_CAS_VALIDATE, help = "Path of the CAS validation endpoint, relative to the base URL")]
    pub cas_validate: String,
    #[arg(long = "frontend-url", help = "Public URL of this proxy, used as the CAS service")]
    pub frontend_url: Url,
    #[arg(long = "max-age", default_value_t = 0, help = "Session idle timeout in seconds, 0 never expires")]
    pub max_age: u64,
    #[arg(long = "session-store", value_enum, default_value_t = SessionStoreArg::Memory, help = "Where sessions are kept")]
    pub session_store: SessionStoreArg,
    #[arg(long = "session-secret", help = "Signing key for the cookie session store, random per process when omitted")]
    pub session_secret: Option<String>,
    #[arg(long = "permissions-url", help = "Permission service URL; enables the permission check")]
    pub permissions_url: Option<Url>,
    #[arg(long = "subject-type", default_value = DEFAULT_SUBJECT_TYPE, help = "Subject type used in permission lookups")]
    pub subject_type: String,
    #[arg(long = "resource-type", default_value = DEFAULT_RESOURCE_TYPE, help = "Resource type used in permission lookups")]
    pub resource_type: String,
    #[arg(long = "resource-name", help = "Resource the permission check is made against")]
    pub resource_name: Option<String>,
    #[arg(long = "apps-url", help = "Apps service URL, used to look up the resource name")]
    pub apps_url: Option<Url>,
    #[arg(long = "apps-user", help = "User the apps service lookup is made as")]
    pub apps_user: Option<String>,
    #[arg(long = "external-id", help = "External ID of the analysis to look up in the apps service")]
    pub external_id: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct CasArgs {
    #[clap(flatten)]
    pub auth: AuthArgs,
    #[arg(long = "backend-url", default_value = DEFAULT_BACKEND_URL, help = "Backend HTTP requests are proxied to")]
    pub backend_url: Url,
    #[arg(long = "ws-backend-url", help = "Backend websocket upgrades are proxied to, derived from --backend-url when omitted")]
    pub ws_backend_url: Option<Url>,
}

#[derive(Args, Debug, Clone)]
pub struct ReverseProxyArgs {
    #[clap(flatten)]
    pub auth: AuthArgs,
    #[arg(long = "api-listen-addr", default_value = DEFAULT_API_LISTEN_ADDR, help = "Address the route registration API listens on")]
    pub api_listen_addr: SocketAddr,
}

impl From<SessionStoreArg> for SessionStoreKind {
    fn from(arg: SessionStoreArg) -> Self {
        match arg {
            SessionStoreArg::Memory => SessionStoreKind::Memory,
            SessionStoreArg::Cookie => SessionStoreKind::Cookie,
        }
    }
}

impl From<&CasProxyArguments> for ListenSettings {
    fn from(args: &CasProxyArguments) -> Self {
        ListenSettings::new(args.listen_addr, args.ssl_cert.clone(), args.ssl_key.clone())
    }
}

impl From<&AuthArgs> for CasSettings {
    fn from(args: &AuthArgs) -> Self {
        CasSettings::new(args.cas_base_url.clone(), args.cas_validate.clone(), args.frontend_url.clone())
    }
}

impl From<&AuthArgs> for SessionSettings {
    fn from(args: &AuthArgs) -> Self {
        SessionSettings::new(args.max_age, args.session_store.into(), args.session_secret.clone())
    }
}

impl TryFrom<&CasArgs> for BackendSettings {
    type Error = anyhow::Error;

    fn try_from(args: &CasArgs) -> Result<Self> {
        BackendSettings::new(args.backend_url.clone(), args.ws_backend_url.clone())
    }
}

impl AuthArgs {
    /// Permission settings when `--permissions-url` is given. Without `--resource-name` the name is
    /// looked up in the apps service, and a failed lookup is a startup error.
    pub async fn permission_settings(&self, client: &HttpsClient) -> Result<Option<PermissionSettings>> {
        let Some(permissions_url) = self.permissions_url.clone() else {
            return Ok(None);
        };

        let resource_name = match &self.resource_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => {
                let (Some(apps_url), Some(apps_user), Some(external_id)) = (&self.apps_url, &self.apps_user, &self.external_id) else {
                    bail!("--permissions-url needs either --resource-name or all of --apps-url, --apps-user and --external-id");
                };
                resolve_resource_name(client, apps_url, apps_user, external_id).await.context("failed to resolve the resource name")?
            }
        };

        let settings = PermissionSettings::new(permissions_url, &self.subject_type, &self.resource_type, resource_name);
        settings.validate()?;
        Ok(Some(settings))
    }
}
