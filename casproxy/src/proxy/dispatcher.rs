use crate::config::BackendSettings;
use crate::proxy::forwarder::HttpBackend;
use crate::proxy::handler::{Handler, HandlerFuture};
use crate::proxy::websocket::{WebSocketBackend, is_websocket};
use crate::utils::http::HttpsClient;
use anyhow::Result;
use hyper::{Body, Request};
use log::debug;
use std::net::IpAddr;

/// Sends websocket upgrades to the websocket backend and everything else to the HTTP backend.
#[derive(Debug, Clone)]
pub struct ProtocolDispatcher {
    http: HttpBackend,
    ws: WebSocketBackend,
}

impl ProtocolDispatcher {
    pub fn new(settings: &BackendSettings, client: HttpsClient) -> Result<Self> {
        let http = HttpBackend::new(settings.get_backend_url(), client.clone())?;
        let ws = WebSocketBackend::new(settings.get_ws_backend_url(), client)?;
        Ok(Self { http, ws })
    }
}

impl Handler for ProtocolDispatcher {
    fn serve(&self, client_ip: IpAddr, req: Request<Body>) -> HandlerFuture<'_> {
        if is_websocket(&req) {
            debug!("Websocket upgrade for {}", req.uri().path());
            self.ws.serve(client_ip, req)
        } else {
            self.http.serve(client_ip, req)
        }
    }
}
