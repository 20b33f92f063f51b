use hyper::client::HttpConnector;
use hyper::header::{self, HeaderValue};
use hyper::{Body, Client, Response, StatusCode};
use hyper_tls::HttpsConnector;

/// Client used for every outbound call the proxy makes on its own behalf (CAS, permissions, apps,
/// websocket handshakes). Cloning shares the connection pool.
pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

pub fn https_client() -> HttpsClient {
    let https = HttpsConnector::new();
    Client::builder().build::<_, Body>(https)
}

/// Plain-text response with the given status.
pub fn text_response(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Redirect response pointing at `location`.
pub fn redirect_response(status: StatusCode, location: &str) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(_) => {
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, format!("redirect location {} is not a valid header value", location));
        }
    }
    response
}
