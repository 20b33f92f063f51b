// Proxy module
//
// This module contains the request path of the proxy:
// - handler: The trait every request handler implements
// - forwarder: Single-host HTTP reverse proxy
// - websocket: Websocket upgrade detection and tunneling
// - dispatcher: Protocol split between the HTTP and websocket backends
// - request_handler: CAS gateway in front of an upstream handler
// - mux: Path-keyed routing table mutable at runtime
// - api: Control-plane endpoints that edit the routing table
// - http_server: Listener loops that feed connections to a handler

pub mod api;
pub mod dispatcher;
pub mod forwarder;
pub mod handler;
pub mod http_server;
pub mod mux;
pub mod request_handler;
pub mod websocket;

pub use api::ControlPlane;
pub use dispatcher::ProtocolDispatcher;
pub use forwarder::HttpBackend;
pub use handler::{Handler, HandlerFuture};
pub use mux::ProxyMux;
pub use request_handler::Gateway;
pub use websocket::WebSocketBackend;
