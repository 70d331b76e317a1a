//! URL helpers shared by the backend and upstream clients.

/// Remove trailing slashes from a base URL.
///
/// ```
/// use concierge::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("http://localhost:3000/"), "http://localhost:3000");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
///
/// ```
/// use concierge::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("http://localhost:3000/", "/api/chat"),
///     "http://localhost:3000/api/chat"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

/// Percent-encode a single path segment (model ids contain `:`).
pub fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
