use crate::proxy::forwarder::HttpBackend;
use crate::proxy::handler::{Handler, HandlerFuture};
use crate::proxy::mux::ProxyMux;
use crate::utils::http::{HttpsClient, text_response};
use hyper::header::{self, HeaderValue};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{error, info};
use serde::Deserialize;
use std::net::IpAddr;
use std::sync::Arc;

pub const REGISTER_PATH: &str = "/api/register";
pub const UNREGISTER_PATH: &str = "/api/unregister";

/// JSON body accepted by the register and unregister endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiRequest {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub backend: String,
}

/// HTTP control plane for the routing table.
#[derive(Debug, Clone)]
pub struct ControlPlane {
    mux: Arc<ProxyMux>,
    client: HttpsClient,
}

impl ControlPlane {
    pub fn new(mux: Arc<ProxyMux>, client: HttpsClient) -> Self {
        Self { mux, client }
    }

    pub async fn register(&self, body: &[u8]) -> Response<Body> {
        let request = match parse_request(body) {
            Ok(request) => request,
            Err(response) => return response,
        };
        if request.backend.is_empty() {
            return text_response(StatusCode::BAD_REQUEST, "The backend field was empty");
        }

        let backend = match HttpBackend::parse(&request.backend, self.client.clone()) {
            Ok(backend) => backend,
            Err(e) => {
                error!("Failed to create proxy for {path}: {e:#}", path = request.path, e = e);
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, format!("failed to create proxy for {}: {:#}", request.path, e));
            }
        };

        match self.mux.add(&request.path, Arc::new(backend)).await {
            Ok(()) => {
                info!("Routing {path} to {backend}", path = request.path, backend = request.backend);
                Response::new(Body::empty())
            }
            Err(e) => text_response(e.status(), e.to_string()),
        }
    }

    pub async fn unregister(&self, body: &[u8]) -> Response<Body> {
        let request = match parse_request(body) {
            Ok(request) => request,
            Err(response) => return response,
        };
        self.mux.remove(&request.path).await;
        Response::new(Body::empty())
    }

    async fn route(&self, req: Request<Body>) -> Response<Body> {
        let path = req.uri().path().to_string();
        if path != REGISTER_PATH && path != UNREGISTER_PATH {
            return text_response(StatusCode::NOT_FOUND, format!("no API endpoint at {}", path));
        }
        if req.method() != Method::POST {
            let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, format!("{} only accepts POST", path));
            response.headers_mut().insert(header::ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        let body = match hyper::body::to_bytes(req.into_body()).await {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to read API request body for {path}: {e}", path = path, e = e);
                return text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to read the body of the request");
            }
        };

        if path == REGISTER_PATH { self.register(&body).await } else { self.unregister(&body).await }
    }
}

impl Handler for ControlPlane {
    fn serve(&self, _client_ip: IpAddr, req: Request<Body>) -> HandlerFuture<'_> {
        Box::pin(async move { Ok(self.route(req).await) })
    }
}

fn parse_request(body: &[u8]) -> Result<ApiRequest, Response<Body>> {
    let request: ApiRequest = serde_json::from_slice(body)
        .map_err(|e| text_response(StatusCode::BAD_REQUEST, format!("failed to unmarshal the request body as JSON: {}", e)))?;
    if request.path.is_empty() {
        return Err(text_response(StatusCode::BAD_REQUEST, "The path field was empty"));
    }
    Ok(request)
}
