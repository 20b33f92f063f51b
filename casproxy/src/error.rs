//! Error types for the authentication gateway and the routing table.
//!
//! Every variant maps onto the HTTP status the data or control plane answers with, so handlers can
//! resolve failures at the request boundary without leaking them into shared state.

use hyper::StatusCode;
use hyper::http::uri::InvalidUri;
use thiserror::Error;

/// Failures of the CAS ticket-validation round trip.
#[derive(Debug, Error)]
pub enum CasError {
    #[error("ticket validation request to {url} failed: {source}")]
    ValidationTransport {
        url: String,
        #[source]
        source: hyper::Error,
    },

    #[error("ticket validation status code from {url} was {status}")]
    ValidationStatus { url: String, status: StatusCode },

    #[error("error reading body of CAS response: {0}")]
    ResponseBody(#[source] hyper::Error),

    #[error("ticket validation response body was {0:?}")]
    TicketRejected(String),

    #[error("not enough fields in ticket validation response body")]
    MalformedResponse,

    #[error("invalid CAS request URL: {0}")]
    InvalidUrl(#[from] InvalidUri),

    #[error("error storing session: {0}")]
    Session(#[from] SessionError),
}

impl CasError {
    pub fn status(&self) -> StatusCode {
        match self {
            CasError::ValidationTransport { .. } | CasError::ValidationStatus { .. } | CasError::TicketRejected(_) => StatusCode::FORBIDDEN,
            CasError::ResponseBody(_) | CasError::MalformedResponse | CasError::InvalidUrl(_) | CasError::Session(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Reasons a session cookie does not yield a usable session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session cookie is malformed")]
    Malformed,

    #[error("session cookie signature does not match")]
    BadSignature,

    #[error("session has been idle for longer than {0} seconds")]
    Expired(u64),

    #[error("session signing key was rejected")]
    InvalidKey,

    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures talking to the permission service. Any of these denies access.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("permission lookup at {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: hyper::Error,
    },

    #[error("permission lookup at {url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("permission response from {url} could not be parsed: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid permission lookup URL: {0}")]
    InvalidUrl(#[from] InvalidUri),
}

impl AccessError {
    pub fn status(&self) -> StatusCode {
        StatusCode::FORBIDDEN
    }
}

/// Routing table mutations rejected by the table itself.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("a route is already registered for path {0}")]
    Duplicate(String),
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::Duplicate(_) => StatusCode::BAD_REQUEST,
        }
    }
}
