use autoscale_core::error::ProviderErrorKind;

/// Maps an HTTP status code and response body to a normalized provider error
/// kind, so every adapter reports failures the same way (spec §4.2, §7).
pub fn classify_provider_error(status: u16, body: &str) -> ProviderErrorKind {
    match status {
        401 | 403 => ProviderErrorKind::Auth,
        404 => ProviderErrorKind::NotFound,
        429 => ProviderErrorKind::RateLimited,
        402 => ProviderErrorKind::Quota,
        0 => ProviderErrorKind::Network,
        422 if body.to_lowercase().contains("quota") => ProviderErrorKind::Quota,
        s if (500..600).contains(&s) => ProviderErrorKind::Network,
        _ => ProviderErrorKind::Provider,
    }
}
