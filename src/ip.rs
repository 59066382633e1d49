//! Client IP extraction for rate limiting and CAPTCHA verification.

use actix_web::HttpRequest;

/// Extract the client IP for this request.
///
/// `realip_remote_addr` honors Forwarded/X-Forwarded-For headers, which is
/// what we want behind the reverse proxy this app is expected to sit behind.
pub fn extract_client_ip(req: &HttpRequest) -> Option<String> {
    req.connection_info()
        .realip_remote_addr()
        // Strip a port if the peer address leaked through verbatim.
        .map(|addr| match addr.rsplit_once(':') {
            Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !host.is_empty() => {
                host.trim_matches(['[', ']'].as_slice()).to_owned()
            }
            _ => addr.to_owned(),
        })
}

/// IP string for rate limit keys; "unknown" rather than dropping the limit.
pub fn client_ip_or_unknown(req: &HttpRequest) -> String {
    extract_client_ip(req).unwrap_or_else(|| "unknown".to_owned())
}
