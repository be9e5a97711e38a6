use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors from validating article links and service endpoints.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(String),
    #[error("Localhost not allowed")]
    Localhost,
    /// Service endpoints must use HTTPS unless they run on this machine.
    #[error("Insecure service URL: HTTPS required (except localhost)")]
    InsecureService,
}

/// Validate an article link before asking a service to fetch it.
///
/// Rejects non-HTTP(S) schemes, localhost and private address ranges so the
/// extraction and summary services are never pointed at internal hosts.
///
/// ```
/// use blogdeck::util::validate_url;
///
/// assert!(validate_url("https://example.com/post").is_ok());
/// assert!(validate_url("http://192.168.1.1/post").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = parse_http(url_str)?;

    if let Some(host) = url.host_str() {
        if host == "localhost" {
            return Err(UrlValidationError::Localhost);
        }
        if let Some(ip) = host_ip(host) {
            if ip.is_loopback() {
                return Err(UrlValidationError::Localhost);
            }
            if is_private_ip(&ip) {
                return Err(UrlValidationError::PrivateIp(ip.to_string()));
            }
        }
    }

    Ok(url)
}

/// Validate a link before handing it to the system browser.
///
/// Only the scheme is checked; the browser is the user's own.
pub fn validate_url_for_open(url_str: &str) -> Result<Url, UrlValidationError> {
    parse_http(url_str)
}

/// Validate the base URL of a backend service (article/summary API, cloud store).
///
/// HTTPS is required unless the host is loopback, which covers a locally
/// running backend and mock servers in tests.
pub fn validate_service_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = parse_http(url_str)?;
    if url.scheme() == "https" {
        return Ok(url);
    }

    let is_loopback = match url.host_str() {
        Some("localhost") => true,
        Some(host) => host_ip(host).is_some_and(|ip| ip.is_loopback()),
        None => false,
    };
    if is_loopback {
        Ok(url)
    } else {
        Err(UrlValidationError::InsecureService)
    }
}

fn parse_http(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str)?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn host_ip(host: &str) -> Option<IpAddr> {
    // IPv6 hosts come bracketed from host_str()
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
        .parse()
        .ok()
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
