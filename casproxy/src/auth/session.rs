use crate::auth::Principal;
use crate::config::{SessionSettings, SessionStoreKind};
use crate::error::SessionError;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use cookie::Cookie;
use hmac::{Hmac, Mac};
use hyper::header::{self, HeaderMap, HeaderValue};
use hyper::{Body, Request};
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Cookie carrying the session reference
pub const SESSION_NAME: &str = "proxy-session";
/// Key under which the principal is stored inside the session
pub const SESSION_KEY: &str = "proxy-session-key";
/// How often the memory store drops idle sessions
pub const REAP_INTERVAL: Duration = Duration::from_secs(30);

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "proxy-session-key")]
    principal: Principal,
    created: DateTime<Utc>,
    last_access: DateTime<Utc>,
}

impl Session {
    pub fn new(principal: Principal) -> Self {
        let now = Utc::now();
        Self { principal, created: now, last_access: now }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.last_access
    }

    pub fn touch(&mut self) {
        self.last_access = Utc::now();
    }

    /// A `max_age` of 0 never expires.
    pub fn is_expired(&self, max_age: u64, now: DateTime<Utc>) -> bool {
        max_age > 0 && now.signed_duration_since(self.last_access).num_seconds() > max_age as i64
    }
}

/// Backing storage for sessions. The value handed back by `save` is what goes into the cookie.
pub trait SessionStore: Send + Sync + Debug {
    /// `Ok(None)` means the cookie refers to nothing this store knows about.
    fn load(&self, cookie: &str) -> Result<Option<Session>, SessionError>;

    /// Persist `session`, reusing the reference in `cookie` when the store still knows it.
    fn save(&self, cookie: Option<&str>, session: &Session) -> Result<String, SessionError>;

    fn remove(&self, cookie: &str);

    /// Reset the idle timer of the session behind `cookie`, handing back the session and the new
    /// cookie value. `Ok(None)` when the session is gone; a vanished session is never recreated.
    fn refresh(&self, cookie: &str) -> Result<Option<(Session, String)>, SessionError> {
        let Some(mut session) = self.load(cookie)? else {
            return Ok(None);
        };
        session.touch();
        let value = self.save(Some(cookie), &session)?;
        Ok(Some((session, value)))
    }
}

/// Sessions kept in process memory, keyed by a random token.
///
/// With a max age of 0 nothing ever expires, so every login adds an entry that lives until the
/// process exits or the user logs in again with the same cookie.
#[derive(Debug)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
    max_age: u64,
}

impl MemoryStore {
    pub fn new(max_age: u64) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), max_age }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Drop every session idle for longer than the configured max age. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        if self.max_age == 0 {
            return 0;
        }
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(self.max_age, now));
        before - sessions.len()
    }

    /// Periodically purge expired sessions. The task ends once the store itself is dropped.
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    debug!("Session store dropped, stopping reaper");
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!("Purged {} expired sessions", purged);
                }
            }
        })
    }
}

impl SessionStore for MemoryStore {
    fn load(&self, cookie: &str) -> Result<Option<Session>, SessionError> {
        let sessions = self.sessions.read();
        match sessions.get(cookie) {
            None => Ok(None),
            Some(session) if session.is_expired(self.max_age, Utc::now()) => Err(SessionError::Expired(self.max_age)),
            Some(session) => Ok(Some(session.clone())),
        }
    }

    fn save(&self, cookie: Option<&str>, session: &Session) -> Result<String, SessionError> {
        let mut sessions = self.sessions.write();
        let token = match cookie {
            Some(token) if sessions.contains_key(token) => token.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        sessions.insert(token.clone(), session.clone());
        Ok(token)
    }

    fn remove(&self, cookie: &str) {
        self.sessions.write().remove(cookie);
    }

    // Lookup and touch under one write lock, so a rotation or purge in between cannot resurrect it
    fn refresh(&self, cookie: &str) -> Result<Option<(Session, String)>, SessionError> {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(cookie) else {
            return Ok(None);
        };
        if session.is_expired(self.max_age, Utc::now()) {
            return Err(SessionError::Expired(self.max_age));
        }
        session.touch();
        Ok(Some((session.clone(), cookie.to_string())))
    }
}

/// Sessions serialized into the cookie itself and signed with HMAC-SHA256.
///
/// Cookie value: `base64url(json) "." base64url(mac)`, where the MAC covers the cookie name, a `|`
/// and the encoded payload.
pub struct CookieStore {
    key: Vec<u8>,
    max_age: u64,
}

impl CookieStore {
    pub fn new(key: Vec<u8>, max_age: u64) -> Self {
        Self { key, max_age }
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, SessionError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| SessionError::InvalidKey)?;
        mac.update(SESSION_NAME.as_bytes());
        mac.update(b"|");
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    fn encode(&self, session: &Session) -> Result<String, SessionError> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(session)?);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    fn decode(&self, cookie: &str) -> Result<Session, SessionError> {
        let (payload, signature) = cookie.split_once('.').ok_or(SessionError::Malformed)?;
        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| SessionError::Malformed)?;
        self.mac(payload)?.verify_slice(&signature).map_err(|_| SessionError::BadSignature)?;

        let json = URL_SAFE_NO_PAD.decode(payload).map_err(|_| SessionError::Malformed)?;
        let session: Session = serde_json::from_slice(&json).map_err(|e| {
            info!("Discarding signed session that does not decode: {}", e);
            SessionError::Malformed
        })?;
        Ok(session)
    }
}

impl Debug for CookieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieStore").field("max_age", &self.max_age).finish_non_exhaustive()
    }
}

impl SessionStore for CookieStore {
    fn load(&self, cookie: &str) -> Result<Option<Session>, SessionError> {
        let session = self.decode(cookie)?;
        if session.is_expired(self.max_age, Utc::now()) {
            return Err(SessionError::Expired(self.max_age));
        }
        Ok(Some(session))
    }

    fn save(&self, _cookie: Option<&str>, session: &Session) -> Result<String, SessionError> {
        self.encode(session)
    }

    // Nothing is kept server side; a replaced cookie simply stops being sent.
    fn remove(&self, _cookie: &str) {}
}

/// Outcome of a successful session check.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    /// Refreshed cookie to hand back with the response
    pub set_cookie: HeaderValue,
}

/// Decides whether a request already carries a valid session, and starts new ones.
#[derive(Debug, Clone)]
pub struct SessionGate {
    store: Arc<dyn SessionStore>,
    max_age: u64,
    secure: bool,
}

impl SessionGate {
    pub fn new(store: Arc<dyn SessionStore>, max_age: u64, secure: bool) -> Self {
        Self { store, max_age, secure }
    }

    /// Build the configured store. The memory store gets its reaper, so this must run inside a
    /// tokio runtime.
    pub fn from_settings(settings: &SessionSettings, secure: bool) -> Self {
        let store: Arc<dyn SessionStore> = match settings.get_store() {
            SessionStoreKind::Memory => {
                if settings.get_max_age() == 0 {
                    warn!("Sessions never expire with a max age of 0; the memory store grows with every login");
                }
                let store = Arc::new(MemoryStore::new(settings.get_max_age()));
                store.spawn_reaper(REAP_INTERVAL);
                store
            }
            SessionStoreKind::Cookie => Arc::new(CookieStore::new(settings.signing_key(), settings.get_max_age())),
        };
        info!("Using the {} session store, max age {}s", settings.get_store(), settings.get_max_age());
        Self::new(store, settings.get_max_age(), secure)
    }

    /// The principal of a valid session, with the session's idle timer reset.
    pub fn authenticate(&self, req: &Request<Body>) -> Option<Authenticated> {
        let cookie = session_cookie(req.headers())?;
        let (session, value) = match self.store.refresh(&cookie) {
            Ok(Some(refreshed)) => refreshed,
            Ok(None) => {
                debug!("No session found for cookie on {}", req.uri().path());
                return None;
            }
            Err(e) => {
                debug!("Ignoring session cookie on {}: {}", req.uri().path(), e);
                return None;
            }
        };

        match self.set_cookie(&value) {
            Ok(set_cookie) => Some(Authenticated { principal: session.principal, set_cookie }),
            Err(e) => {
                warn!("Failed to refresh session on {}: {}", req.uri().path(), e);
                None
            }
        }
    }

    pub fn needs_authentication(&self, req: &Request<Body>) -> bool {
        self.authenticate(req).is_none()
    }

    /// Replace whatever session the request carried with a fresh one for `principal`.
    pub fn start(&self, headers: &HeaderMap, principal: Principal) -> Result<HeaderValue, SessionError> {
        if let Some(previous) = session_cookie(headers) {
            self.store.remove(&previous);
        }
        let value = self.store.save(None, &Session::new(principal))?;
        self.set_cookie(&value)
    }

    fn set_cookie(&self, value: &str) -> Result<HeaderValue, SessionError> {
        let mut builder = Cookie::build((SESSION_NAME, value)).path("/").http_only(true).secure(self.secure);
        if self.max_age > 0 {
            let seconds = i64::try_from(self.max_age).unwrap_or(i64::MAX);
            builder = builder.max_age(cookie::time::Duration::seconds(seconds));
        }
        HeaderValue::from_str(&builder.build().to_string()).map_err(|_| SessionError::Malformed)
    }
}

/// Value of the session cookie, if the request sent one.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_NAME)
        .map(|cookie| cookie.value().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Principal {
        Principal::new("alice").unwrap()
    }

    fn request_with_cookie(cookie: &str) -> Request<Body> {
        Request::builder().uri("/app").header(header::COOKIE, cookie).body(Body::empty()).unwrap()
    }

    fn cookie_value(set_cookie: &HeaderValue) -> String {
        let raw = set_cookie.to_str().unwrap();
        let pair = raw.split(';').next().unwrap();
        pair.trim_start_matches("proxy-session=").to_string()
    }

    fn stale(principal: Principal, idle_secs: i64) -> Session {
        let mut session = Session::new(principal);
        session.last_access = Utc::now() - chrono::Duration::seconds(idle_secs);
        session
    }

    #[test]
    fn test_session_expiry() {
        let now = Utc::now();
        assert!(!stale(alice(), 10_000).is_expired(0, now));
        assert!(stale(alice(), 120).is_expired(60, now));
        assert!(!stale(alice(), 30).is_expired(60, now));
    }

    #[test]
    fn test_session_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark; proxy-session=abc123"));
        assert_eq!(session_cookie(&headers).as_deref(), Some("abc123"));

        let mut split = HeaderMap::new();
        split.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        split.append(header::COOKIE, HeaderValue::from_static("proxy-session=\"xyz\""));
        assert_eq!(session_cookie(&split).as_deref(), Some("xyz"));

        let mut empty = HeaderMap::new();
        empty.append(header::COOKIE, HeaderValue::from_static("proxy-session="));
        assert_eq!(session_cookie(&empty), None);
        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new(0);
        let token = store.save(None, &Session::new(alice())).unwrap();
        assert!(Uuid::parse_str(&token).is_ok());
        assert_eq!(store.load(&token).unwrap().unwrap().principal(), &alice());
        assert!(store.load("unknown").unwrap().is_none());

        // Saving against a known token keeps it
        assert_eq!(store.save(Some(&token), &Session::new(alice())).unwrap(), token);
        // An unknown token is never adopted
        assert_ne!(store.save(Some("forged"), &Session::new(alice())).unwrap(), "forged");

        store.remove(&token);
        assert!(store.load(&token).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_expiry_and_purge() {
        let store = MemoryStore::new(60);
        let fresh = store.save(None, &Session::new(alice())).unwrap();
        let old = store.save(None, &stale(alice(), 600)).unwrap();

        assert!(matches!(store.load(&old), Err(SessionError::Expired(60))));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.load(&fresh).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_purges_and_stops_with_store() {
        let store = Arc::new(MemoryStore::new(60));
        store.save(None, &stale(alice(), 600)).unwrap();
        let reaper = store.spawn_reaper(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(store.is_empty());

        drop(store);
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::time::timeout(Duration::from_secs(1), reaper).await.unwrap().unwrap();
    }

    #[test]
    fn test_cookie_store_roundtrip() {
        let store = CookieStore::new(b"0123456789abcdef0123456789abcdef".to_vec(), 0);
        let value = store.save(None, &Session::new(alice())).unwrap();
        let (payload, signature) = value.split_once('.').unwrap();
        assert!(!payload.is_empty() && !signature.is_empty());
        assert_eq!(store.load(&value).unwrap().unwrap().principal(), &alice());
    }

    #[test]
    fn test_cookie_store_rejects_tampering() {
        let store = CookieStore::new(b"0123456789abcdef0123456789abcdef".to_vec(), 0);
        let value = store.save(None, &Session::new(alice())).unwrap();
        let (_, signature) = value.split_once('.').unwrap();

        let forged = Session::new(Principal::new("mallory").unwrap());
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let tampered = format!("{}.{}", forged_payload, signature);
        assert!(matches!(store.load(&tampered), Err(SessionError::BadSignature)));

        let other_key = CookieStore::new(b"another key entirely, also long!".to_vec(), 0);
        assert!(matches!(other_key.load(&value), Err(SessionError::BadSignature)));

        assert!(matches!(store.load("no-dot-here"), Err(SessionError::Malformed)));
    }

    #[test]
    fn test_cookie_store_rejects_empty_principal() {
        let store = CookieStore::new(b"0123456789abcdef0123456789abcdef".to_vec(), 0);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"proxy-session-key":"","created":"2024-01-01T00:00:00Z","last_access":"2024-01-01T00:00:00Z"}"#);
        let signature = URL_SAFE_NO_PAD.encode(store.mac(&payload).unwrap().finalize().into_bytes());
        let value = format!("{}.{}", payload, signature);
        assert!(matches!(store.load(&value), Err(SessionError::Malformed)));
    }

    #[test]
    fn test_cookie_store_expiry() {
        let store = CookieStore::new(b"0123456789abcdef0123456789abcdef".to_vec(), 60);
        let value = store.save(None, &stale(alice(), 600)).unwrap();
        assert!(matches!(store.load(&value), Err(SessionError::Expired(60))));
    }

    #[test]
    fn test_gate_start_and_authenticate() {
        let gate = SessionGate::new(Arc::new(MemoryStore::new(0)), 0, false);
        let set_cookie = gate.start(&HeaderMap::new(), alice()).unwrap();
        let raw = set_cookie.to_str().unwrap();
        assert!(raw.starts_with("proxy-session="));
        assert!(raw.contains("Path=/"));
        assert!(raw.contains("HttpOnly"));
        assert!(!raw.contains("Max-Age"));
        assert!(!raw.contains("Secure"));

        let req = request_with_cookie(&format!("proxy-session={}", cookie_value(&set_cookie)));
        let authenticated = gate.authenticate(&req).unwrap();
        assert_eq!(authenticated.principal, alice());
        assert!(!gate.needs_authentication(&req));
    }

    #[test]
    fn test_gate_cookie_attributes() {
        let gate = SessionGate::new(Arc::new(MemoryStore::new(3600)), 3600, true);
        let raw = gate.start(&HeaderMap::new(), alice()).unwrap().to_str().unwrap().to_string();
        assert!(raw.contains("Max-Age=3600"));
        assert!(raw.contains("; Secure"));
        assert!(raw.contains("Path=/"));
    }

    #[test]
    fn test_gate_requires_session() {
        let gate = SessionGate::new(Arc::new(MemoryStore::new(0)), 0, false);
        let bare = Request::builder().uri("/app").body(Body::empty()).unwrap();
        assert!(gate.needs_authentication(&bare));
        assert!(gate.needs_authentication(&request_with_cookie("proxy-session=unknown")));
    }

    #[test]
    fn test_gate_rotates_session_on_start() {
        let store = Arc::new(MemoryStore::new(0));
        let gate = SessionGate::new(store.clone(), 0, false);
        let first = cookie_value(&gate.start(&HeaderMap::new(), alice()).unwrap());

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&format!("proxy-session={}", first)).unwrap());
        let second = cookie_value(&gate.start(&headers, alice()).unwrap());

        assert_ne!(first, second);
        assert_eq!(store.len(), 1);
        assert!(store.load(&first).unwrap().is_none());
    }

    #[test]
    fn test_memory_store_refresh() {
        let store = MemoryStore::new(60);
        let token = store.save(None, &stale(alice(), 30)).unwrap();
        let before = store.load(&token).unwrap().unwrap().last_access();

        let (session, value) = store.refresh(&token).unwrap().unwrap();
        assert_eq!(value, token);
        assert!(session.last_access() > before);
        assert_eq!(store.load(&token).unwrap().unwrap().last_access(), session.last_access());

        let old = store.save(None, &stale(alice(), 600)).unwrap();
        assert!(matches!(store.refresh(&old), Err(SessionError::Expired(60))));

        store.remove(&token);
        assert!(store.refresh(&token).unwrap().is_none());
        assert!(store.load(&token).unwrap().is_none());
    }

    #[test]
    fn test_gate_does_not_resurrect_removed_session() {
        let store = Arc::new(MemoryStore::new(0));
        let gate = SessionGate::new(store.clone(), 0, false);
        let token = cookie_value(&gate.start(&HeaderMap::new(), alice()).unwrap());
        let req = request_with_cookie(&format!("proxy-session={}", token));

        store.remove(&token);
        assert!(gate.authenticate(&req).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_gate_rotation_races_with_authenticate() {
        let store = Arc::new(MemoryStore::new(0));
        let gate = SessionGate::new(store.clone(), 0, false);
        let first = cookie_value(&gate.start(&HeaderMap::new(), alice()).unwrap());
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&format!("proxy-session={}", first)).unwrap());

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let req = request_with_cookie(&format!("proxy-session={}", first));
                    for _ in 0..500 {
                        gate.authenticate(&req);
                    }
                });
            }
            scope.spawn(|| gate.start(&headers, alice()).unwrap());
        });

        // Only the rotated session survives
        assert_eq!(store.len(), 1);
        assert!(store.load(&first).unwrap().is_none());
    }

    #[test]
    fn test_gate_with_cookie_store() {
        let gate = SessionGate::new(Arc::new(CookieStore::new(b"0123456789abcdef0123456789abcdef".to_vec(), 0)), 0, false);
        let value = cookie_value(&gate.start(&HeaderMap::new(), alice()).unwrap());
        let authenticated = gate.authenticate(&request_with_cookie(&format!("proxy-session={}", value))).unwrap();
        assert_eq!(authenticated.principal, alice());
    }
}
