use crate::proxy::handler::{Handler, HandlerFuture};
use crate::utils::http::{HttpsClient, text_response};
use crate::utils::path::join_path;
use crate::utils::validation::is_ws_url;
use anyhow::{Result, anyhow, bail};
use hyper::body::to_bytes;
use hyper::http::Version;
use hyper::upgrade;
use hyper::{Body, Request, Response, StatusCode, Uri, header};
use log::{debug, error, warn};
use std::net::IpAddr;
use std::time::Instant;
use url::{Position, Url};

const XFF: &str = "x-forwarded-for";

/// A request is a websocket upgrade when its first `Connection` value mentions `upgrade` and its
/// first `Upgrade` value is `websocket`, both case-insensitively.
pub fn is_websocket(req: &Request<Body>) -> bool {
    let has_connection_upgrade =
        req.headers().get(header::CONNECTION).and_then(|v| v.to_str().ok()).map(|v| v.to_ascii_lowercase().contains("upgrade")).unwrap_or(false);
    let has_upgrade_ws =
        req.headers().get(header::UPGRADE).and_then(|v| v.to_str().ok()).map(|v| v.to_ascii_lowercase() == "websocket").unwrap_or(false);
    has_connection_upgrade && has_upgrade_ws
}

/// Reverse proxy for websocket upgrades. The handshake is replayed against the backend over
/// HTTP/1.1; once both sides switch protocols the two connections are spliced together.
#[derive(Debug, Clone)]
pub struct WebSocketBackend {
    // http(s) form of the ws(s) backend URL, which is what the client connects with
    upstream: Url,
    client: HttpsClient,
}

impl WebSocketBackend {
    pub fn new(ws_url: &Url, client: HttpsClient) -> Result<Self> {
        if !is_ws_url(ws_url) {
            bail!("websocket backend URL {} must be an absolute ws(s) URL", ws_url);
        }
        let mut upstream = ws_url.clone();
        let scheme = if ws_url.scheme() == "wss" { "https" } else { "http" };
        upstream.set_scheme(scheme).map_err(|_| anyhow!("cannot use {} as a websocket backend", ws_url))?;
        Ok(Self { upstream, client })
    }

    /// Backend URI for a client request: backend path joined with the request path, backend query
    /// followed by the request query.
    pub fn upstream_uri(&self, uri: &Uri) -> String {
        let path = join_path(self.upstream.path(), uri.path());
        let query = match (self.upstream.query().filter(|q| !q.is_empty()), uri.query().filter(|q| !q.is_empty())) {
            (Some(base), Some(extra)) => format!("?{}&{}", base, extra),
            (Some(only), None) | (None, Some(only)) => format!("?{}", only),
            (None, None) => String::new(),
        };
        format!("{}{}{}", &self.upstream[..Position::BeforePath], path, query)
    }

    fn host_header(&self) -> &str {
        &self.upstream[Position::BeforeHost..Position::AfterPort]
    }

    async fn proxy(&self, client_ip: IpAddr, req: Request<Body>) -> Result<Response<Body>> {
        let upstream_uri = self.upstream_uri(req.uri());

        // Replay the handshake, forcing HTTP/1.1 and the backend's Host
        let mut builder = Request::builder().method(req.method()).version(Version::HTTP_11).uri(&upstream_uri);
        {
            let headers = req.headers();
            for (name, value) in headers.iter() {
                if name == header::HOST || name == XFF {
                    continue;
                }
                builder = builder.header(name, value);
            }
            builder = builder.header(header::HOST, self.host_header());

            let forwarded = match headers.get(XFF).and_then(|v| v.to_str().ok()) {
                Some(existing) => format!("{}, {}", existing, client_ip),
                None => client_ip.to_string(),
            };
            builder = builder.header(XFF, forwarded);

            let h = |n: &str| headers.get(n).and_then(|v| v.to_str().ok()).unwrap_or("-");
            debug!(
                "WS handshake from {ip}: Origin={origin} Sec-WebSocket-Version={version} Protocol={protocol}",
                ip = client_ip,
                origin = h("origin"),
                version = h("sec-websocket-version"),
                protocol = h("sec-websocket-protocol"),
            );
        }
        let upstream_req = builder.body(Body::empty())?;

        let start = Instant::now();
        let mut upstream_res = match self.client.request(upstream_req).await {
            Ok(response) => response,
            Err(e) => {
                error!("WS upstream request error for {uri} after {ms} ms: {e}", uri = upstream_uri, ms = start.elapsed().as_millis(), e = e);
                return Ok(text_response(StatusCode::BAD_GATEWAY, "Bad Gateway"));
            }
        };

        let status = upstream_res.status();
        debug!("WS upstream {uri} responded {status} in {ms} ms", uri = upstream_uri, status = status, ms = start.elapsed().as_millis());

        if status != StatusCode::SWITCHING_PROTOCOLS {
            // The backend refused the upgrade; hand its answer back as-is
            let body = to_bytes(upstream_res.body_mut()).await.unwrap_or_default();
            warn!("WS upstream {uri} refused the upgrade with {status}", uri = upstream_uri, status = status);
            let mut refused = Response::builder().status(status);
            for (name, value) in upstream_res.headers().iter() {
                refused = refused.header(name, value.clone());
            }
            return Ok(refused.body(Body::from(body))?);
        }

        let mut switching = Response::builder().status(StatusCode::SWITCHING_PROTOCOLS);
        for name in [header::UPGRADE, header::CONNECTION, header::SEC_WEBSOCKET_ACCEPT, header::SEC_WEBSOCKET_PROTOCOL, header::SEC_WEBSOCKET_EXTENSIONS] {
            if let Some(value) = upstream_res.headers().get(&name) {
                switching = switching.header(name.clone(), value.clone());
            }
        }
        let response = switching.body(Body::empty())?;

        tokio::spawn(async move {
            let mut client_side = match upgrade::on(req).await {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    error!("WS client upgrade failed for {uri}: {e}", uri = upstream_uri, e = e);
                    return;
                }
            };
            let mut backend_side = match upgrade::on(upstream_res).await {
                Ok(upgraded) => upgraded,
                Err(e) => {
                    error!("WS upstream upgrade failed for {uri}: {e}", uri = upstream_uri, e = e);
                    return;
                }
            };
            match tokio::io::copy_bidirectional(&mut client_side, &mut backend_side).await {
                Ok((sent, received)) => debug!("WS tunnel to {uri} closed after {sent} bytes up, {received} bytes down", uri = upstream_uri, sent = sent, received = received),
                Err(e) => debug!("WS tunnel IO error for {uri}: {e}", uri = upstream_uri, e = e),
            }
        });

        Ok(response)
    }
}

impl Handler for WebSocketBackend {
    fn serve(&self, client_ip: IpAddr, req: Request<Body>) -> HandlerFuture<'_> {
        Box::pin(self.proxy(client_ip, req))
    }
}
