use autoscale_core::error::{AutoscaleError, ProviderErrorKind};
use autoscale_core::Result;

#[test]
fn test_error_display() {
    let err = AutoscaleError::not_found("policy cdc-worker");
    assert_eq!(format!("{err}"), "not found: policy cdc-worker");

    let err = AutoscaleError::conflict("node pool name already in use");
    assert_eq!(format!("{err}"), "conflict: node pool name already in use");

    let err = AutoscaleError::Fatal("no executor registered".to_string());
    assert_eq!(format!("{err}"), "fatal invariant breach: no executor registered");

    let err = AutoscaleError::provider(ProviderErrorKind::Quota, "quota exceeded");
    assert_eq!(format!("{err}"), "provider error (quota): quota exceeded");
}

#[test]
fn test_validation_error_carries_field() {
    let err = AutoscaleError::validation("min_replicas", "must be <= max_replicas");
    match err {
        AutoscaleError::Validation(fields) => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].field, "min_replicas");
            assert_eq!(fields[0].message, "must be <= max_replicas");
        }
        _ => panic!("expected Validation"),
    }
}

#[test]
fn test_error_from_io() {
    let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: AutoscaleError = io_error.into();
    assert!(matches!(err, AutoscaleError::Io(_)));
}

#[test]
fn test_error_from_serde_json() {
    let json_error = serde_json::Error::io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        "invalid JSON",
    ));
    let err: AutoscaleError = json_error.into();
    assert!(matches!(err, AutoscaleError::Decode(_)));
}

#[test]
fn test_retryable_kinds() {
    assert!(AutoscaleError::Transport("timed out".to_string()).retryable());
    assert!(AutoscaleError::provider(ProviderErrorKind::RateLimited, "slow down").retryable());
    assert!(AutoscaleError::provider(ProviderErrorKind::Network, "reset").retryable());

    assert!(!AutoscaleError::provider(ProviderErrorKind::Auth, "bad key").retryable());
    assert!(!AutoscaleError::not_found("missing").retryable());
    assert!(!AutoscaleError::Fatal("invariant".to_string()).retryable());
}

#[test]
fn test_result_type() {
    fn ok_case() -> Result<String> {
        Ok("done".to_string())
    }
    fn err_case() -> Result<String> {
        Err(AutoscaleError::not_found("thing"))
    }

    assert_eq!(ok_case().unwrap(), "done");
    assert!(err_case().is_err());
}

#[test]
fn test_provider_error_kind_display() {
    assert_eq!(ProviderErrorKind::Auth.to_string(), "auth");
    assert_eq!(ProviderErrorKind::RateLimited.to_string(), "rate_limited");
    assert_eq!(ProviderErrorKind::NotFound.to_string(), "not_found");
}
