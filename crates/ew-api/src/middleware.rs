//! # Middleware
//!
//! Request logging, preflight CORS, and the per-request origin allow-list.
//! The allow-list decision reads live configuration, so it runs inside the
//! route handler rather than in a statically configured middleware; the
//! `Cors` layer below only answers preflights.

use actix_cors::Cors;
use actix_web::middleware::Logger;

/// Returns a standard set of middleware for the Echo-Wall API.
pub fn standard_middleware() -> Logger {
    Logger::default()
}

/// Preflight handling. The actual allow/deny decision per request is
/// [`origin_allowed`] against live config.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allow_any_header()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .max_age(3600)
}

fn strip_trailing_slash(s: &str) -> &str {
    s.trim_end_matches('/')
}

fn is_loopback(origin: &str) -> bool {
    let rest = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .unwrap_or(origin);
    if rest.starts_with("[::1]") {
        return true;
    }
    let host = rest.split(&[':', '/'][..]).next().unwrap_or(rest);
    host == "localhost" || host == "127.0.0.1"
}

/// Whether `origin` may talk to this deployment. Loopback origins pass
/// unconditionally; otherwise the configured comma-separated list decides,
/// trailing slashes ignored; an empty list allows any origin.
pub fn origin_allowed(allow_list: &str, origin: &str) -> bool {
    if is_loopback(origin) {
        return true;
    }
    if allow_list.trim().is_empty() {
        return true;
    }
    let origin = strip_trailing_slash(origin);
    allow_list
        .split(',')
        .map(|item| strip_trailing_slash(item.trim()))
        .any(|item| !item.is_empty() && item == origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_always_passes() {
        assert!(origin_allowed("https://blog.example.com", "http://localhost:4000"));
        assert!(origin_allowed("https://blog.example.com", "http://127.0.0.1"));
    }

    #[test]
    fn empty_list_allows_everything() {
        assert!(origin_allowed("", "https://anywhere.example"));
        assert!(origin_allowed("   ", "https://anywhere.example"));
    }

    #[test]
    fn list_matches_ignore_trailing_slash() {
        let list = "https://blog.example.com/, https://docs.example.com";
        assert!(origin_allowed(list, "https://blog.example.com"));
        assert!(origin_allowed(list, "https://docs.example.com/"));
        assert!(!origin_allowed(list, "https://evil.example.com"));
    }
}
