use url::Url;

/// Parse a URL-like string, assuming `https://` when no `http` prefix is present.
fn normalized_url(input: &str) -> Option<Url> {
    let candidate = if input.starts_with("http") {
        input.to_string()
    } else {
        format!("https://{input}")
    };
    Url::parse(&candidate).ok()
}

/// Scheme, host and explicit port of a URL-like string, e.g. `https://gitlab.example.com:8443`.
pub fn extract_url_domain(input: &str) -> Option<String> {
    let url = normalized_url(input)?;
    let host = url.host_str()?;
    let mut domain = format!("{}://{}", url.scheme(), host);
    if let Some(port) = url.port() {
        domain.push_str(&format!(":{port}"));
    }
    Some(domain)
}

/// Path of a URL-like string without its leading and trailing slash.
pub fn extract_url_path(input: &str) -> Option<String> {
    let url = normalized_url(input)?;
    let path = url.path();
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    Some(path.to_string())
}
