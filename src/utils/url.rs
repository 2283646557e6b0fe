//! URL utilities for consistent endpoint construction
//!
//! The backend is addressed by a configurable base URL; these helpers keep
//! trailing slashes from producing double slashes in the final request URLs.

/// Normalize a base URL by removing trailing slashes.
///
/// # Examples
///
/// ```
/// use relief::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://relief.example.com"), "https://relief.example.com");
/// assert_eq!(normalize_base_url("https://relief.example.com/"), "https://relief.example.com");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete endpoint URL from a base URL and endpoint path.
///
/// # Examples
///
/// ```
/// use relief::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://relief.example.com/", "purchase/verify"),
///     "https://relief.example.com/purchase/verify"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://relief.example.com"),
            "https://relief.example.com"
        );
        assert_eq!(
            normalize_base_url("https://relief.example.com///"),
            "https://relief.example.com"
        );
        assert_eq!(normalize_base_url(""), "");
    }

    #[test]
    fn test_construct_api_url() {
        assert_eq!(
            construct_api_url("https://relief.example.com", "chat"),
            "https://relief.example.com/chat"
        );
        assert_eq!(
            construct_api_url("https://relief.example.com/", "/chat/history/list"),
            "https://relief.example.com/chat/history/list"
        );
        assert_eq!(
            construct_api_url("http://10.0.2.2:8001", "user/chats"),
            "http://10.0.2.2:8001/user/chats"
        );
    }
}
