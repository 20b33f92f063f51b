use crate::proxy::handler::{Handler, HandlerFuture};
use crate::utils::http::{HttpsClient, text_response};
use crate::utils::path::trim_trailing_slash;
use crate::utils::validation::is_http_url;
use anyhow::{Context, Result, bail};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Body, Request, Response, StatusCode, Uri};
use log::{debug, error};
use std::net::IpAddr;
use url::Url;

const XFF: &str = "x-forwarded-for";

// Connection-scoped headers that must not travel across the proxy
const HOP_HEADERS: [&str; 8] =
    ["connection", "keep-alive", "proxy-authenticate", "proxy-authorization", "te", "trailer", "transfer-encoding", "upgrade"];

/// Single-host HTTP reverse proxy. The request path and query are appended to the backend URL.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    target: String,
    host: HeaderValue,
    secure: bool,
    client: HttpsClient,
}

impl HttpBackend {
    pub fn new(backend: &Url, client: HttpsClient) -> Result<Self> {
        if !is_http_url(backend) {
            bail!("backend URL {} must be an absolute http(s) URL", backend);
        }
        let target = trim_trailing_slash(&backend[..url::Position::AfterPath]).to_string();
        let host = HeaderValue::from_str(&backend[url::Position::BeforeHost..url::Position::AfterPort])
            .with_context(|| format!("backend URL {} has no usable host", backend))?;
        Ok(Self { target, host, secure: backend.scheme() == "https", client })
    }

    pub fn parse(backend: &str, client: HttpsClient) -> Result<Self> {
        let url = Url::parse(backend).with_context(|| format!("invalid backend URL {}", backend))?;
        Self::new(&url, client)
    }

    pub fn get_target(&self) -> &str {
        &self.target
    }

    pub fn get_host(&self) -> &HeaderValue {
        &self.host
    }

    // hyper-reverse-proxy only speaks plain HTTP upstream, so TLS backends go through the shared client
    async fn forward_tls(&self, client_ip: IpAddr, req: Request<Body>) -> Result<Response<Body>> {
        let upstream = forwarded_request(&self.target, client_ip, req)?;
        let mut response = self.client.request(upstream).await?;
        strip_hop_headers(response.headers_mut());
        Ok(response)
    }
}

impl Handler for HttpBackend {
    fn serve(&self, client_ip: IpAddr, req: Request<Body>) -> HandlerFuture<'_> {
        Box::pin(async move {
            debug!("Forwarding {method} {uri} from {ip} to {target}", method = req.method(), uri = req.uri(), ip = client_ip, target = self.target);
            let result = if self.secure {
                self.forward_tls(client_ip, req).await
            } else {
                let mut req = req;
                req.headers_mut().insert(header::HOST, self.host.clone());
                hyper_reverse_proxy::call(client_ip, &self.target, req).await.map_err(|e| anyhow::anyhow!("{:?}", e))
            };
            match result {
                Ok(response) => Ok(response),
                Err(error) => {
                    error!("HTTP proxy error for {target}: {err:#}", target = self.target, err = error);
                    Ok(text_response(StatusCode::BAD_GATEWAY, "Bad Gateway"))
                }
            }
        })
    }
}

/// Rewrite `req` for the backend at `target`: absolute URI, no hop-by-hop headers, the backend's
/// own Host, and the client appended to X-Forwarded-For.
pub fn forwarded_request(target: &str, client_ip: IpAddr, req: Request<Body>) -> Result<Request<Body>> {
    let (mut parts, body) = req.into_parts();
    let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    parts.uri = format!("{}{}", target, path_and_query).parse::<Uri>().with_context(|| format!("cannot forward {} to {}", path_and_query, target))?;

    strip_hop_headers(&mut parts.headers);
    parts.headers.remove(header::HOST);

    let forwarded = match parts.headers.get(XFF).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, client_ip),
        None => client_ip.to_string(),
    };
    parts.headers.insert(XFF, HeaderValue::from_str(&forwarded)?);
    Ok(Request::from_parts(parts, body))
}

fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in HOP_HEADERS {
        headers.remove(name);
    }
}
