use crate::UrlError;
use url::Url;

/// Parses a product source URL
///
/// The URL must be absolute, use HTTP or HTTPS and carry a host. Surrounding
/// whitespace is ignored.
///
/// # Arguments
///
/// * `raw` - The URL as stored on the product
///
/// # Returns
///
/// * `Ok(Url)` - The parsed URL
/// * `Err(UrlError)` - Empty, malformed, non-HTTP(S) or host-less URL
///
/// # Examples
///
/// ```
/// use price_sync::url::parse_source_url;
///
/// let url = parse_source_url(" https://supplier.example.com/widget ").unwrap();
/// assert_eq!(url.host_str(), Some("supplier.example.com"));
///
/// assert!(parse_source_url("ftp://supplier.example.com/").is_err());
/// assert!(parse_source_url("/relative/path").is_err());
/// ```
pub fn parse_source_url(raw: &str) -> Result<Url, UrlError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::Empty);
    }

    let url = Url::parse(raw).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if source_host(&url).is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Extracts the lowercase host of a URL, without IPv6 brackets
pub fn source_host(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https_url() {
        let url = parse_source_url("https://example.com/product/1").unwrap();
        assert_eq!(url.as_str(), "https://example.com/product/1");
    }

    #[test]
    fn test_parse_http_url() {
        assert!(parse_source_url("http://example.com/").is_ok());
    }

    #[test]
    fn test_empty_url() {
        assert_eq!(parse_source_url("   "), Err(UrlError::Empty));
    }

    #[test]
    fn test_relative_url_rejected() {
        assert!(matches!(
            parse_source_url("product/1"),
            Err(UrlError::Parse(_))
        ));
    }

    #[test]
    fn test_non_http_scheme_rejected() {
        assert_eq!(
            parse_source_url("file:///etc/passwd"),
            Err(UrlError::InvalidScheme("file".to_string()))
        );
        assert!(matches!(
            parse_source_url("javascript:alert(1)"),
            Err(UrlError::InvalidScheme(_))
        ));
    }

    #[test]
    fn test_source_host_lowercase() {
        let url = Url::parse("https://Shop.EXAMPLE.com/").unwrap();
        assert_eq!(source_host(&url), Some("shop.example.com".to_string()));
    }

    #[test]
    fn test_source_host_strips_ipv6_brackets() {
        let url = Url::parse("http://[::1]:8080/").unwrap();
        assert_eq!(source_host(&url), Some("::1".to_string()));
    }
}
