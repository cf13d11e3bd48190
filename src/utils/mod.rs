pub mod datetime;

/// Ensure a server address has an http scheme, for building Xtream URLs.
pub fn normalize_server_url(server: &str) -> String {
    if server.starts_with("http://") || server.starts_with("https://") {
        server.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", server.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_scheme_when_missing() {
        assert_eq!(normalize_server_url("example.com:8080"), "http://example.com:8080");
        assert_eq!(normalize_server_url("http://example.com/"), "http://example.com");
        assert_eq!(normalize_server_url("https://example.com"), "https://example.com");
    }
}
