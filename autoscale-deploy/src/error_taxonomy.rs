//! Turns a free-text provisioner error into the fixed error taxonomy of
//! spec §4.10: a stable code, static suggestions, a retryable flag, and a
//! docs URL, enriched with step-specific suggestions from a fixed table.

use crate::types::{ErrorCode, ErrorInfo};
use crate::StepId;

struct Pattern {
    needle: &'static str,
    code: ErrorCode,
}

/// Matched in order, case-insensitive substring. First match wins, mirroring
/// the provider error classifier's status-code precedence in
/// `autoscale-providers::classify`.
const PATTERNS: &[Pattern] = &[
    Pattern { needle: "permission denied", code: ErrorCode::PermissionDenied },
    Pattern { needle: "forbidden", code: ErrorCode::PermissionDenied },
    Pattern { needle: "unauthorized", code: ErrorCode::AuthFailed },
    Pattern { needle: "auth", code: ErrorCode::AuthFailed },
    Pattern { needle: "credential", code: ErrorCode::AuthFailed },
    Pattern { needle: "quota", code: ErrorCode::QuotaExceeded },
    Pattern { needle: "limit exceeded", code: ErrorCode::QuotaExceeded },
    Pattern { needle: "rate limit", code: ErrorCode::RateLimited },
    Pattern { needle: "too many requests", code: ErrorCode::RateLimited },
    Pattern { needle: "timed out", code: ErrorCode::Timeout },
    Pattern { needle: "timeout", code: ErrorCode::Timeout },
    Pattern { needle: "connection refused", code: ErrorCode::NetworkError },
    Pattern { needle: "network", code: ErrorCode::NetworkError },
    Pattern { needle: "dns", code: ErrorCode::NetworkError },
    Pattern { needle: "not found", code: ErrorCode::ResourceNotFound },
    Pattern { needle: "404", code: ErrorCode::ResourceNotFound },
    Pattern { needle: "already exists", code: ErrorCode::ResourceConflict },
    Pattern { needle: "conflict", code: ErrorCode::ResourceConflict },
    Pattern { needle: "ssh", code: ErrorCode::SshError },
    Pattern { needle: "kubeconfig", code: ErrorCode::K8sError },
    Pattern { needle: "kubernetes", code: ErrorCode::K8sError },
    Pattern { needle: "kubectl", code: ErrorCode::K8sError },
    Pattern { needle: "apiserver", code: ErrorCode::K8sError },
    Pattern { needle: "volume", code: ErrorCode::StorageError },
    Pattern { needle: "bucket", code: ErrorCode::StorageError },
    Pattern { needle: "disk", code: ErrorCode::StorageError },
    Pattern { needle: "certificate", code: ErrorCode::SslError },
    Pattern { needle: "tls", code: ErrorCode::SslError },
    Pattern { needle: "ssl", code: ErrorCode::SslError },
    Pattern { needle: "provider", code: ErrorCode::ProviderError },
];

fn base_suggestions(code: ErrorCode) -> &'static [&'static str] {
    match code {
        ErrorCode::AuthFailed => &["Verify the credentials entered are valid and not expired", "Check the account has API access enabled"],
        ErrorCode::QuotaExceeded => &["Request a quota increase from the provider", "Pick a smaller instance size or fewer replicas"],
        ErrorCode::Timeout => &["Retry the step; transient provider slowness is common", "Check the provider's status page"],
        ErrorCode::NetworkError => &["Check connectivity to the provider API", "Retry the step"],
        ErrorCode::PermissionDenied => &["Grant the service account the required role", "Re-check the credentials' scope"],
        ErrorCode::ResourceNotFound => &["Confirm the region/image/instance type still exists", "Retry after re-checking the configuration"],
        ErrorCode::ResourceConflict => &["A resource with this name already exists; remove it or retry with a new name"],
        ErrorCode::RateLimited => &["Wait a moment and retry", "Reduce concurrent operations against this provider"],
        ErrorCode::ProviderError => &["Consult the provider's status page", "Retry the step"],
        ErrorCode::SshError => &["Verify the SSH key was uploaded to the provider", "Check firewall rules allow SSH from the installer"],
        ErrorCode::K8sError => &["Check cluster API server reachability", "Verify the kubeconfig credentials are current"],
        ErrorCode::StorageError => &["Check storage quota and region availability", "Retry the step"],
        ErrorCode::SslError => &["Verify DNS for the certificate domain resolves", "Retry once DNS has propagated"],
        ErrorCode::UnknownError => &["Retry the step", "Contact support with the deployment id if it persists"],
    }
}

fn docs_url(code: ErrorCode) -> Option<String> {
    let slug = match code {
        ErrorCode::AuthFailed => "auth-failed",
        ErrorCode::QuotaExceeded => "quota-exceeded",
        ErrorCode::Timeout => "timeout",
        ErrorCode::NetworkError => "network-error",
        ErrorCode::PermissionDenied => "permission-denied",
        ErrorCode::ResourceNotFound => "resource-not-found",
        ErrorCode::ResourceConflict => "resource-conflict",
        ErrorCode::RateLimited => "rate-limited",
        ErrorCode::ProviderError => "provider-error",
        ErrorCode::SshError => "ssh-error",
        ErrorCode::K8sError => "k8s-error",
        ErrorCode::StorageError => "storage-error",
        ErrorCode::SslError => "ssl-error",
        ErrorCode::UnknownError => return None,
    };
    Some(format!("https://docs.autoscale.dev/errors/{slug}"))
}

fn retryable(code: ErrorCode) -> bool {
    !matches!(code, ErrorCode::PermissionDenied | ErrorCode::ResourceConflict)
}

/// Step-specific suggestions appended on top of the code's base list
/// (spec §4.10).
fn step_suggestions(step: StepId) -> &'static [&'static str] {
    match step {
        StepId::Auth => &["Double check the project/account id matches the credentials"],
        StepId::Network => &["Ensure the account has not hit its VPC/network quota"],
        StepId::Compute => &["Confirm the chosen instance type is available in the region"],
        StepId::K8s => &["Check that the control plane image version is still published"],
        StepId::Storage => &["Verify the object storage bucket name is globally unique"],
        StepId::Catalog => &["Confirm the catalog service reached a healthy state before this step"],
        StepId::App => &["Check application image pull secrets are configured"],
        StepId::Health => &["Give the workloads more time to pass readiness probes, then retry"],
        StepId::Ssl => &["Confirm DNS records point at the provisioned load balancer"],
        StepId::Ready => &[],
    }
}

/// Classifies `message` (case-insensitive substring match) into the fixed
/// taxonomy, appending `step`'s suggestions on top of the code's base list.
/// Unmatched text becomes `UNKNOWN_ERROR`, which is retryable (spec §4.10).
pub fn classify(message: &str, step: StepId) -> ErrorInfo {
    let lower = message.to_lowercase();
    let code = PATTERNS
        .iter()
        .find(|p| lower.contains(p.needle))
        .map(|p| p.code)
        .unwrap_or(ErrorCode::UnknownError);

    let mut suggestions: Vec<String> = base_suggestions(code).iter().map(|s| s.to_string()).collect();
    suggestions.extend(step_suggestions(step).iter().map(|s| s.to_string()));

    ErrorInfo {
        code,
        message: message.to_string(),
        details: None,
        suggestions,
        retryable: retryable(code),
        docs_url: docs_url(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_auth_failed() {
        let info = classify("request Unauthorized: bad token", StepId::Auth);
        assert_eq!(info.code, ErrorCode::AuthFailed);
        assert!(info.retryable);
    }

    #[test]
    fn already_exists_maps_to_conflict_and_is_not_retryable() {
        let info = classify("resource already exists", StepId::Network);
        assert_eq!(info.code, ErrorCode::ResourceConflict);
        assert!(!info.retryable);
    }

    #[test]
    fn unmatched_text_is_unknown_and_retryable() {
        let info = classify("the cat knocked over the server rack", StepId::Compute);
        assert_eq!(info.code, ErrorCode::UnknownError);
        assert!(info.retryable);
    }

    #[test]
    fn step_suggestions_are_appended() {
        let info = classify("timeout waiting for cluster", StepId::K8s);
        assert!(info
            .suggestions
            .iter()
            .any(|s| s.contains("control plane image version")));
    }
}
