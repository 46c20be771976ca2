use tracing::{debug, warn};

use crate::api::{ApiClient, ApiHttp};

/// Query whether launches need an access code. Any failure answers `true`,
/// so an unreachable backend never silently disables the gate.
pub fn fetch_auth_required<H: ApiHttp>(api: &ApiClient<H>) -> bool {
    match api.auth_status() {
        Ok(status) => {
            debug!(auth_required = status.auth_required, "fetched auth status");
            status.auth_required
        }
        Err(err) => {
            warn!(error = %err, "failed to fetch auth status; assuming an access code is required");
            true
        }
    }
}

/// Gate a launch on the access code. Issues at most one validation request,
/// and none when no code is needed or none was supplied.
pub fn check<H: ApiHttp>(api: &ApiClient<H>, auth_required: bool, code: &str) -> bool {
    if !auth_required {
        return true;
    }
    if code.is_empty() {
        debug!("access code required but not provided");
        return false;
    }
    match api.validate_code(code) {
        Ok(validation) => validation.success,
        Err(err) => {
            warn!(error = %err, "access code validation request failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::StubApiHttp;
    use serde_json::json;

    const ORIGIN: &str = "http://wiki.test";
    const VALIDATE: &str = "http://wiki.test/api/auth/validate";
    const STATUS: &str = "http://wiki.test/api/auth/status";

    #[test]
    fn not_required_always_passes_without_requests() {
        let stub = StubApiHttp::default();
        let api = ApiClient::new(ORIGIN, &stub);
        assert!(check(&api, false, ""));
        assert!(check(&api, false, "anything"));
        assert!(stub.calls().is_empty());
    }

    #[test]
    fn required_with_empty_code_fails_without_requests() {
        let stub = StubApiHttp::default();
        let api = ApiClient::new(ORIGIN, &stub);
        assert!(!check(&api, true, ""));
        assert!(stub.calls().is_empty());
    }

    #[test]
    fn server_verdict_is_returned() {
        let accepted = StubApiHttp::new(vec![(VALIDATE, json!({"success": true}))]);
        assert!(check(&ApiClient::new(ORIGIN, &accepted), true, "good"));
        assert_eq!(accepted.calls().len(), 1);

        let rejected = StubApiHttp::new(vec![(VALIDATE, json!({"success": false}))]);
        assert!(!check(&ApiClient::new(ORIGIN, &rejected), true, "bad"));
    }

    #[test]
    fn missing_success_field_or_transport_error_fails() {
        let empty = StubApiHttp::new(vec![(VALIDATE, json!({}))]);
        assert!(!check(&ApiClient::new(ORIGIN, &empty), true, "code"));

        let unreachable = StubApiHttp::default();
        assert!(!check(&ApiClient::new(ORIGIN, &unreachable), true, "code"));
        assert_eq!(unreachable.calls().len(), 1);
    }

    #[test]
    fn status_failure_defaults_to_required() {
        let unreachable = StubApiHttp::default();
        assert!(fetch_auth_required(&ApiClient::new(ORIGIN, &unreachable)));

        let open = StubApiHttp::new(vec![(STATUS, json!({"auth_required": false}))]);
        assert!(!fetch_auth_required(&ApiClient::new(ORIGIN, &open)));
    }
}
