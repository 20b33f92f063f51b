//! Common validation utilities shared across modules

use url::Url;

/// Check if a string is empty or only whitespace
pub fn is_empty_or_whitespace(s: &str) -> bool {
    s.trim().is_empty()
}

/// True for absolute `http://` or `https://` URLs that carry a host
pub fn is_http_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
}

/// True for absolute `ws://` or `wss://` URLs that carry a host
pub fn is_ws_url(url: &Url) -> bool {
    matches!(url.scheme(), "ws" | "wss") && url.host_str().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty_or_whitespace() {
        assert!(is_empty_or_whitespace(""));
        assert!(is_empty_or_whitespace("   "));
        assert!(is_empty_or_whitespace("\t"));
        assert!(is_empty_or_whitespace("  \t\n  "));
        assert!(!is_empty_or_whitespace("/app"));
        assert!(!is_empty_or_whitespace("  /app  "));
    }

    #[test]
    fn test_is_http_url() {
        assert!(is_http_url(&Url::parse("http://localhost:60000").unwrap()));
        assert!(is_http_url(&Url::parse("https://cas.example.org/cas").unwrap()));
        assert!(!is_http_url(&Url::parse("ws://localhost:60000").unwrap()));
        assert!(!is_http_url(&Url::parse("file:///etc/passwd").unwrap()));
    }

    #[test]
    fn test_is_ws_url() {
        assert!(is_ws_url(&Url::parse("ws://localhost:60000").unwrap()));
        assert!(is_ws_url(&Url::parse("wss://apps.example.org/socket").unwrap()));
        assert!(!is_ws_url(&Url::parse("http://localhost:60000").unwrap()));
    }
}
