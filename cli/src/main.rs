mod cli;

use crate::cli::{AuthArgs, CasProxyArguments, CasProxyCommands};
use anyhow::Result;
use casproxy::auth::{AccessController, SessionGate, TicketValidator};
use casproxy::config::{BackendSettings, CasSettings, ListenSettings, SessionSettings};
use casproxy::proxy::http_server::{serve, serve_http};
use casproxy::proxy::{ControlPlane, Gateway, Handler, ProtocolDispatcher, ProxyMux};
use casproxy::utils::http::{HttpsClient, https_client};
use clap::Parser;
use log::{LevelFilter, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CasProxyArguments::parse();
    pretty_env_logger::env_logger::builder()
        .format_timestamp(None)
        .filter_level(if args.verbose { LevelFilter::Trace } else { LevelFilter::Info })
        .init();

    info!("Starting cas-proxy");

    let listen = ListenSettings::from(&args);
    // Reject a half-configured TLS setup before contacting any service
    listen.tls_files()?;
    let client = https_client();

    match &args.command {
        CasProxyCommands::Cas(cas) => {
            let backend = BackendSettings::try_from(cas)?;
            info!("Proxying to {http} (websockets to {ws})", http = backend.get_backend_url(), ws = backend.get_ws_backend_url());
            let upstream = Arc::new(ProtocolDispatcher::new(&backend, client.clone())?);
            let gateway = build_gateway(&cas.auth, upstream, client).await?;
            serve(&listen, Arc::new(gateway)).await?;
        }
        CasProxyCommands::ReverseProxy(rp) => {
            let mux = Arc::new(ProxyMux::new());
            let gateway = build_gateway(&rp.auth, mux.clone(), client.clone()).await?;
            let api = Arc::new(ControlPlane::new(mux, client));
            info!("Route registration API on {}", rp.api_listen_addr);
            tokio::try_join!(serve(&listen, Arc::new(gateway)), serve_http(rp.api_listen_addr, api))?;
        }
    }

    Ok(())
}

/// CAS gateway in front of `upstream`, with the permission check when it is configured.
async fn build_gateway(auth: &AuthArgs, upstream: Arc<dyn Handler>, client: HttpsClient) -> Result<Gateway> {
    let cas = CasSettings::from(auth);
    cas.validate()?;
    info!("CAS at {base} (validating with {path}), service {frontend}", base = cas.get_base_url(), path = cas.get_validate_path(), frontend = cas.get_frontend_url());

    let secure = cas.get_frontend_url().scheme() == "https";
    let sessions = SessionGate::from_settings(&SessionSettings::from(auth), secure);

    let access = match auth.permission_settings(&client).await? {
        Some(settings) => {
            info!("Checking permissions at {url} for resource {name}", url = settings.get_permissions_url(), name = settings.get_resource_name());
            Some(AccessController::new(settings, client.clone()))
        }
        None => None,
    };

    Ok(Gateway::new(TicketValidator::new(cas, client), sessions, access, upstream))
}
