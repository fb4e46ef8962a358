use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    /// The URL string could not be parsed as an absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
}

/// Validates a URL string before it is handed to the HTTP client.
///
/// Feed endpoints are frequently internal services, so unlike a public
/// subscription URL no host or address range is rejected here. Only the
/// shape of the URL is checked:
/// - it must parse as an absolute URL
/// - the scheme must be `http` or `https`
/// - a host must be present
///
/// # Examples
///
/// ```
/// use feedwalk::util::validate_url;
///
/// let url = validate_url("https://feeds.example.com/notifications/recent").unwrap();
/// assert_eq!(url.host_str(), Some("feeds.example.com"));
///
/// assert!(validate_url("/notifications/recent").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_urls() {
        assert!(validate_url("https://example.com/notifications/recent").is_ok());
        assert!(validate_url("http://127.0.0.1:8080/notifications/12").is_ok());
    }

    #[test]
    fn test_invalid_schemes() {
        assert!(matches!(
            validate_url("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            validate_url("ftp://example.com/feed"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_relative_url_rejected() {
        assert!(matches!(
            validate_url("notifications/recent"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_internal_hosts_allowed() {
        assert!(validate_url("http://localhost:3000/notifications/recent").is_ok());
        assert!(validate_url("https://10.0.0.5/notifications/recent").is_ok());
    }
}
