use log::debug;

/// Trim trailing slashes from a URL or path string.
/// Backend targets are stored without them so request paths can be appended directly.
pub fn trim_trailing_slash(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.len() != path.len() {
        debug!("Stripped trailing '/' from {}", path);
    }
    trimmed
}

/// Join two path fragments with exactly one '/' between them.
/// The result always starts with '/', so an empty base yields an absolute path.
pub fn join_path(base: &str, suffix: &str) -> String {
    let base = trim_trailing_slash(base);
    let suffix = suffix.trim_start_matches('/');
    if base.is_empty() {
        format!("/{}", suffix)
    } else if base.starts_with('/') {
        format!("{}/{}", base, suffix)
    } else {
        format!("/{}/{}", base, suffix)
    }
}
