use crate::auth::Principal;
use crate::auth::session::SessionGate;
use crate::config::CasSettings;
use crate::error::CasError;
use crate::utils::http::{HttpsClient, redirect_response, text_response};
use crate::utils::path::join_path;
use hyper::header::SET_COOKIE;
use hyper::{Body, Request, Response, StatusCode, Uri};
use log::{debug, error, info, warn};
use url::{Position, Url, form_urlencoded};

/// Query parameter CAS appends when it sends the browser back
pub const TICKET_PARAM: &str = "ticket";
/// Exact body a CAS 1.0 `validate` endpoint answers for a bad ticket
pub const REJECTED_BODY: &[u8] = b"no\n\n";
const LOGIN_PATH: &str = "login";

/// Talks to CAS on behalf of the gateway: validates tickets and builds the login redirect.
#[derive(Debug, Clone)]
pub struct TicketValidator {
    settings: CasSettings,
    client: HttpsClient,
}

impl TicketValidator {
    pub fn new(settings: CasSettings, client: HttpsClient) -> Self {
        Self { settings, client }
    }

    /// The URL CAS sees as `service`: the frontend URL carrying the request path and the request
    /// query with every `ticket` pair removed.
    pub fn service_url(&self, uri: &Uri) -> Url {
        let mut service = self.settings.frontend_url.clone();
        service.set_path(uri.path());
        service.set_query(uri.query().and_then(strip_ticket).as_deref());
        service.set_fragment(None);
        service
    }

    pub fn validation_url(&self, service: &Url, ticket: &str) -> Url {
        let mut url = self.settings.base_url.clone();
        let path = join_path(url.path(), &self.settings.validate_path);
        url.set_path(&path);
        url.query_pairs_mut().append_pair("service", service.as_str()).append_pair(TICKET_PARAM, ticket);
        url
    }

    /// CAS login page, with the original request (path and raw query) as the `service`.
    pub fn login_url(&self, uri: &Uri) -> Url {
        let mut service = self.settings.frontend_url.clone();
        service.set_path(uri.path());
        service.set_query(uri.query());
        service.set_fragment(None);

        let mut login = self.settings.base_url.clone();
        let path = join_path(login.path(), LOGIN_PATH);
        login.set_path(&path);
        login.query_pairs_mut().append_pair("service", service.as_str());
        login
    }

    pub fn redirect_to_cas(&self, req: &Request<Body>) -> Response<Body> {
        let login = self.login_url(req.uri());
        debug!("Redirecting {uri} to CAS login at {login}", uri = req.uri(), login = login);
        redirect_response(StatusCode::PERMANENT_REDIRECT, login.as_str())
    }

    /// Ask CAS whether the ticket on `uri` is good. Returns the principal and the service URL the
    /// ticket was issued for.
    pub async fn validate(&self, uri: &Uri) -> Result<(Principal, Url), CasError> {
        let ticket = ticket(uri).unwrap_or_default();
        let service = self.service_url(uri);
        let validation = self.validation_url(&service, &ticket);
        let target = validation[..Position::AfterPath].to_string();
        let request_uri: Uri = validation.as_str().parse()?;

        debug!("Validating CAS ticket for {service} at {target}", service = service, target = target);
        let response = self.client.get(request_uri).await.map_err(|source| CasError::ValidationTransport { url: target.clone(), source })?;
        if !response.status().is_success() {
            return Err(CasError::ValidationStatus { url: target, status: response.status() });
        }

        let body = hyper::body::to_bytes(response.into_body()).await.map_err(CasError::ResponseBody)?;
        let principal = parse_validation_body(&body)?;
        Ok((principal, service))
    }

    /// Validate the ticket, start a session and send the browser back to the clean service URL.
    pub async fn validate_ticket(&self, sessions: &SessionGate, req: Request<Body>) -> Response<Body> {
        let (parts, _body) = req.into_parts();
        let outcome = match self.validate(&parts.uri).await {
            Ok((principal, service)) => sessions.start(&parts.headers, principal.clone()).map(|cookie| (principal, service, cookie)).map_err(CasError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((principal, service, cookie)) => {
                info!("CAS ticket validated for {user}, redirecting to {service}", user = principal, service = service);
                let mut response = redirect_response(StatusCode::FOUND, service.as_str());
                response.headers_mut().append(SET_COOKIE, cookie);
                response
            }
            Err(e) => {
                let status = e.status();
                if status == StatusCode::FORBIDDEN {
                    warn!("CAS ticket rejected for {path}: {e}", path = parts.uri.path(), e = e);
                } else {
                    error!("CAS ticket validation failed for {path}: {e}", path = parts.uri.path(), e = e);
                }
                text_response(status, e.to_string())
            }
        }
    }
}

/// Whether the query carries a `ticket` parameter, whatever its value.
pub fn has_ticket(uri: &Uri) -> bool {
    uri.query().is_some_and(|query| query.split('&').any(is_ticket_pair))
}

pub fn ticket(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes()).find(|(key, _)| key == TICKET_PARAM).map(|(_, value)| value.into_owned())
}

/// Read a CAS 1.0 `validate` answer: `yes\n<username>\n` on success.
pub fn parse_validation_body(body: &[u8]) -> Result<Principal, CasError> {
    if body == REJECTED_BODY {
        return Err(CasError::TicketRejected(String::from_utf8_lossy(body).into_owned()));
    }
    let text = String::from_utf8_lossy(body);
    text.split_whitespace().nth(1).and_then(Principal::new).ok_or(CasError::MalformedResponse)
}

// Pairs stay in their original order and encoding so the service URL matches the one sent to login.
fn strip_ticket(query: &str) -> Option<String> {
    let kept: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty() && !is_ticket_pair(pair)).collect();
    if kept.is_empty() { None } else { Some(kept.join("&")) }
}

fn is_ticket_pair(pair: &str) -> bool {
    let key = pair.split_once('=').map_or(pair, |(key, _)| key);
    form_urlencoded::parse(key.as_bytes()).next().is_some_and(|(key, _)| key == TICKET_PARAM)
}
