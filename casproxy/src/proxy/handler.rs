use hyper::{Body, Request, Response};
use std::fmt::Debug;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<Response<Body>>> + Send + 'a>>;

/// Anything that can answer a proxied request: a backend, the protocol dispatcher, the CAS
/// gateway, the routing table or the control-plane API.
///
/// `client_ip` is the address of the peer that opened the connection and feeds X-Forwarded-For.
/// An `Err` is answered with a bare 500 by the server loop; handlers that know better build the
/// response themselves.
pub trait Handler: Send + Sync + Debug {
    fn serve(&self, client_ip: IpAddr, req: Request<Body>) -> HandlerFuture<'_>;
}
