// Helpers shared by the unit tests: throwaway hyper servers on ephemeral loopback ports.

use crate::proxy::handler::Handler;
use crate::proxy::http_server::respond;
use hyper::service::{make_service_fn, service_fn};
use hyper::server::conn::AddrStream;
use hyper::{Body, Request, Response, Server};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// Serve `handler` on 127.0.0.1 and return the bound address.
pub(crate) fn spawn_server<F, Fut>(handler: F) -> SocketAddr
where
    F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    let make_svc = make_service_fn(move |_conn: &AddrStream| {
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(handler(req).await) }
            }))
        }
    });
    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    let server = Server::bind(&addr).serve(make_svc);
    let bound = server.local_addr();
    tokio::spawn(server);
    bound
}

/// Serve a `Handler` the same way the data plane does.
pub(crate) fn spawn_handler(handler: Arc<dyn Handler>) -> SocketAddr {
    let make_svc = make_service_fn(move |conn: &AddrStream| {
        let client_ip = conn.remote_addr().ip();
        let handler = handler.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(respond(handler.as_ref(), client_ip, req).await) }
            }))
        }
    });
    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    let server = Server::bind(&addr).serve(make_svc);
    let bound = server.local_addr();
    tokio::spawn(server);
    bound
}

/// Read a response body into a string.
pub(crate) async fn body_string(response: Response<Body>) -> String {
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap_or_default();
    String::from_utf8_lossy(&bytes).into_owned()
}
