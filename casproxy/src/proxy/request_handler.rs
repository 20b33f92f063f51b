use crate::auth::cas::has_ticket;
use crate::auth::{AccessController, SessionGate, TicketValidator};
use crate::proxy::handler::{Handler, HandlerFuture};
use crate::utils::http::text_response;
use anyhow::Result;
use hyper::header::SET_COOKIE;
use hyper::{Body, Request, Response, StatusCode};
use log::{debug, error, warn};
use std::net::IpAddr;
use std::sync::Arc;

/// CAS authentication in front of another handler.
///
/// Per request, in order:
/// 1. a `ticket` query parameter is validated against CAS, which starts a session and redirects;
/// 2. a request without a valid session is redirected to the CAS login page;
/// 3. when permission checks are configured, the session's principal must be allowed;
/// 4. the request goes to the upstream handler, and the refreshed session cookie rides back on
///    its response.
#[derive(Debug)]
pub struct Gateway {
    validator: TicketValidator,
    sessions: SessionGate,
    access: Option<AccessController>,
    upstream: Arc<dyn Handler>,
}

impl Gateway {
    pub fn new(validator: TicketValidator, sessions: SessionGate, access: Option<AccessController>, upstream: Arc<dyn Handler>) -> Self {
        Self { validator, sessions, access, upstream }
    }

    pub async fn handle_request(&self, client_ip: IpAddr, req: Request<Body>) -> Result<Response<Body>> {
        if has_ticket(req.uri()) {
            debug!("CAS ticket on {path} from {ip}", path = req.uri().path(), ip = client_ip);
            return Ok(self.validator.validate_ticket(&self.sessions, req).await);
        }

        let Some(session) = self.sessions.authenticate(&req) else {
            return Ok(self.validator.redirect_to_cas(&req));
        };

        if let Some(access) = &self.access {
            match access.is_allowed(&session.principal).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("Access denied to {path} for a request from {ip}", path = req.uri().path(), ip = client_ip);
                    return Ok(text_response(StatusCode::FORBIDDEN, "access denied"));
                }
                Err(e) => {
                    error!("Permission check for a request from {ip} failed: {e}", ip = client_ip, e = e);
                    return Ok(text_response(e.status(), format!("access denied: {}", e)));
                }
            }
        }

        debug!("Authenticated request from {ip} for {method} {path}", ip = client_ip, method = req.method(), path = req.uri().path());
        let mut response = self.upstream.serve(client_ip, req).await?;
        response.headers_mut().append(SET_COOKIE, session.set_cookie);
        Ok(response)
    }
}

impl Handler for Gateway {
    fn serve(&self, client_ip: IpAddr, req: Request<Body>) -> HandlerFuture<'_> {
        Box::pin(self.handle_request(client_ip, req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStore;
    use crate::config::{BackendSettings, CasSettings, PermissionSettings};
    use crate::proxy::dispatcher::ProtocolDispatcher;
    use crate::test_support::{body_string, spawn_server};
    use crate::utils::http::https_client;
    use hyper::header;
    use std::net::SocketAddr;
    use url::Url;

    fn ip() -> IpAddr {
        "10.0.0.7".parse().unwrap()
    }

    fn cas_server() -> SocketAddr {
        spawn_server(|req: Request<Body>| async move {
            let good = req.uri().query().unwrap_or("").contains("ticket=ST-good");
            Response::new(Body::from(if good { "yes\nalice\n" } else { "no\n\n" }))
        })
    }

    fn backend_server() -> SocketAddr {
        spawn_server(|req: Request<Body>| async move { Response::new(Body::from(format!("backend {}", req.uri()))) })
    }

    fn permissions_server(level: &'static str) -> SocketAddr {
        spawn_server(move |_req: Request<Body>| async move {
            Response::new(Body::from(format!(r#"{{"permissions":[{{"permission_level":"{}"}}]}}"#, level)))
        })
    }

    fn gateway(cas: SocketAddr, backend: SocketAddr, permissions: Option<SocketAddr>) -> Gateway {
        let client = https_client();
        let settings = CasSettings::new(Url::parse(&format!("http://{}/cas", cas)).unwrap(), "validate", Url::parse("https://app.example.org").unwrap());
        let validator = TicketValidator::new(settings, client.clone());
        let sessions = SessionGate::new(Arc::new(MemoryStore::new(0)), 0, true);
        let access = permissions.map(|addr| {
            let settings = PermissionSettings::new(Url::parse(&format!("http://{}", addr)).unwrap(), "user", "analysis", "b2f4");
            AccessController::new(settings, client.clone())
        });
        let backend = BackendSettings::new(Url::parse(&format!("http://{}", backend)).unwrap(), None).unwrap();
        let upstream = Arc::new(ProtocolDispatcher::new(&backend, client).unwrap());
        Gateway::new(validator, sessions, access, upstream)
    }

    fn request(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn log_in(gateway: &Gateway) -> String {
        let response = gateway.handle_request(ip(), request("/app?x=1&ticket=ST-good", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://app.example.org/app?x=1");
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_unauthenticated_request_redirects_to_cas() {
        let cas = cas_server();
        let gateway = gateway(cas, backend_server(), None);

        let response = gateway.handle_request(ip(), request("/app?x=1", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        let location = Url::parse(response.headers()[header::LOCATION].to_str().unwrap()).unwrap();
        assert_eq!(location.path(), "/cas/login");
        let service = location.query_pairs().find(|(k, _)| k == "service").map(|(_, v)| v.into_owned());
        assert_eq!(service.as_deref(), Some("https://app.example.org/app?x=1"));
    }

    #[tokio::test]
    async fn test_full_login_flow() {
        let gateway = gateway(cas_server(), backend_server(), None);
        let cookie = log_in(&gateway).await;

        let response = gateway.handle_request(ip(), request("/app?x=1", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::SET_COOKIE].to_str().unwrap().starts_with("proxy-session="));
        assert_eq!(body_string(response).await, "backend /app?x=1");
    }

    #[tokio::test]
    async fn test_bad_ticket_is_forbidden() {
        let gateway = gateway(cas_server(), backend_server(), None);
        let response = gateway.handle_request(ip(), request("/app?ticket=ST-bad", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_ticket_takes_precedence_over_session() {
        let gateway = gateway(cas_server(), backend_server(), None);
        let cookie = log_in(&gateway).await;
        // A stale ticket is still sent to CAS even with a valid session
        let response = gateway.handle_request(ip(), request("/app?ticket=ST-bad", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_permission_granted() {
        let gateway = gateway(cas_server(), backend_server(), Some(permissions_server("read")));
        let cookie = log_in(&gateway).await;
        let response = gateway.handle_request(ip(), request("/app", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let gateway = gateway(cas_server(), backend_server(), Some(permissions_server("")));
        let cookie = log_in(&gateway).await;
        let response = gateway.handle_request(ip(), request("/app", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_permission_service_down_denies() {
        let client = https_client();
        let mut gateway = gateway(cas_server(), backend_server(), None);
        let settings = PermissionSettings::new(Url::parse("http://127.0.0.1:1").unwrap(), "user", "analysis", "b2f4");
        gateway.access = Some(AccessController::new(settings, client));

        let cookie = log_in(&gateway).await;
        let response = gateway.handle_request(ip(), request("/app", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
