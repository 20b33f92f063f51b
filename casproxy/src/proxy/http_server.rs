use crate::config::ListenSettings;
use crate::proxy::handler::Handler;
use crate::ssl_server::serve_tls;
use crate::utils::http::text_response;
use anyhow::{Context, Result};
use hyper::server::conn::AddrStream;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, StatusCode};
use log::{error, info};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Serve `handler` on the configured address, over TLS when a certificate and key are configured.
/// Runs until Ctrl-C.
pub async fn serve(listen: &ListenSettings, handler: Arc<dyn Handler>) -> Result<()> {
    match listen.tls_files()? {
        Some((cert, key)) => serve_tls(listen.get_listen_addr(), cert, key, handler).await,
        None => serve_http(listen.get_listen_addr(), handler).await,
    }
}

/// Plain HTTP listener. A failed bind is returned to the caller instead of retried.
pub async fn serve_http(addr: SocketAddr, handler: Arc<dyn Handler>) -> Result<()> {
    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let remote_addr = conn.remote_addr().ip();
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(respond(handler.as_ref(), remote_addr, req).await) }
            }))
        }
    });

    let builder = hyper::Server::try_bind(&addr).with_context(|| format!("failed to bind {}", addr))?;
    let server = builder.serve(make_svc);
    info!("HTTP server running on {}", server.local_addr());

    server.with_graceful_shutdown(shutdown_signal()).await.with_context(|| format!("HTTP server on {} failed", addr))?;
    info!("HTTP server on {} stopped", addr);
    Ok(())
}

/// Run one request through `handler`, turning a handler error into a bare 500.
pub async fn respond(handler: &dyn Handler, client_ip: IpAddr, req: Request<Body>) -> Response<Body> {
    match handler.serve(client_ip, req).await {
        Ok(response) => response,
        Err(e) => {
            error!("handle_request error from {}: {:#}", client_ip, e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
