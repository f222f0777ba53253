//! Request dispatch: one HTTP attempt, status classification, and the
//! bounded retry loop around it.
//!
//! # Design
//! `Dispatcher` holds only immutable state (base URL, credential, retry
//! policy, transport), so a single instance can serve concurrent callers.
//! Classification looks at the status code alone:
//!
//! | Status              | Result                      | Retried |
//! |---------------------|-----------------------------|---------|
//! | 2xx                 | `Ok(response)`              | -       |
//! | 404                 | `ApiError::NotFound`        | no      |
//! | other 4xx           | `ApiError::InvalidRequest`  | no      |
//! | anything else       | `ApiError::Service`         | yes     |
//! | no response         | `ApiError::Service` (no status) | yes |
//!
//! When retries run out the last `Service` error is returned as is.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::operation::ArgValue;
use crate::retry::RetryPolicy;

pub struct Dispatcher {
    base_url: String,
    authorization: String,
    retry: RetryPolicy,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Trailing slashes are trimmed from `base_url` once, here.
    pub fn new(
        base_url: &str,
        api_key: &str,
        retry: RetryPolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            authorization: format!("Bearer {api_key}"),
            retry,
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Builds the request for `path` with the credential attached and query
    /// values serialized to their wire form.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
        query: &[(String, ArgValue)],
    ) -> HttpRequest {
        HttpRequest {
            method,
            url: self.url_for(path),
            headers: vec![("Authorization".to_string(), self.authorization.clone())],
            query: query
                .iter()
                .map(|(name, value)| (name.clone(), value.to_string()))
                .collect(),
            body,
        }
    }

    /// Performs a single attempt.
    pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "sending request");
        match self.transport.send(request) {
            Ok(response) => classify(&request.url, response),
            Err(err) => Err(ApiError::Service {
                status: None,
                url: request.url.clone(),
                message: err.0,
            }),
        }
    }

    /// Performs up to `RetryPolicy::attempts` attempts, sleeping the fixed
    /// delay after each retryable failure.
    pub fn execute_with_retry(&self, request: &HttpRequest) -> Result<HttpResponse> {
        if !self.retry.is_enabled() {
            return self.execute(request);
        }

        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            match self.execute(request) {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(
                        "{} {}: attempt {}/{} failed ({}), retrying in {:?}",
                        request.method,
                        request.url,
                        attempt,
                        attempts,
                        err,
                        self.retry.delay()
                    );
                    std::thread::sleep(self.retry.delay());
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Maps a received response onto success or an error kind.
pub fn classify(url: &str, response: HttpResponse) -> Result<HttpResponse> {
    match response.status {
        200..=299 => Ok(response),
        404 => Err(ApiError::NotFound {
            url: url.to_string(),
        }),
        400..=499 => Err(ApiError::InvalidRequest {
            status: response.status,
            url: url.to_string(),
            body: response.body,
        }),
        status => Err(ApiError::Service {
            status: Some(status),
            url: url.to_string(),
            message: response.body,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::testing::ScriptedTransport;

    const BASE_URL: &str = "http://ensek.test/api";

    fn dispatcher(retry: RetryPolicy, transport: Arc<ScriptedTransport>) -> Dispatcher {
        Dispatcher::new(BASE_URL, "secret", retry, transport)
    }

    fn get(d: &Dispatcher, path: &str) -> HttpRequest {
        d.build_request(HttpMethod::Get, path, None, &[])
    }

    fn three_attempts() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(20)).unwrap()
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let d = Dispatcher::new(
            "http://ensek.test/api//",
            "k",
            RetryPolicy::NONE,
            Arc::new(ScriptedTransport::new()),
        );
        assert_eq!(d.base_url(), "http://ensek.test/api");
        assert_eq!(d.url_for("/accounts/1"), "http://ensek.test/api/accounts/1");
        assert_eq!(d.url_for("accounts/1"), "http://ensek.test/api/accounts/1");
    }

    #[test]
    fn build_request_attaches_bearer_token_and_wire_query() {
        let d = dispatcher(RetryPolicy::NONE, Arc::new(ScriptedTransport::new()));
        let req = d.build_request(
            HttpMethod::Get,
            "/Accounts/1507/Tariffs",
            None,
            &[("includeHistory".to_string(), ArgValue::Bool(true))],
        );
        assert_eq!(req.url, "http://ensek.test/api/Accounts/1507/Tariffs");
        assert_eq!(req.header("Authorization"), Some("Bearer secret"));
        assert_eq!(req.query, vec![("includeHistory".to_string(), "true".to_string())]);
        assert!(req.body.is_none());
    }

    #[test]
    fn classify_statuses() {
        let ok = classify("u", HttpResponse { status: 201, body: "[]".into() }).unwrap();
        assert_eq!(ok.body, "[]");

        let err = classify("u", HttpResponse { status: 404, body: String::new() }).unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));

        let err = classify("u", HttpResponse { status: 400, body: "bad id".into() }).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest { status: 400, ref body, .. } if body == "bad id"));

        let err = classify("u", HttpResponse { status: 401, body: String::new() }).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest { status: 401, .. }));

        let err = classify("u", HttpResponse { status: 502, body: "gateway".into() }).unwrap_err();
        assert!(matches!(err, ApiError::Service { status: Some(502), ref message, .. } if message == "gateway"));

        let err = classify("u", HttpResponse { status: 302, body: String::new() }).unwrap_err();
        assert!(matches!(err, ApiError::Service { status: Some(302), .. }));
    }

    #[test]
    fn transport_failure_is_service_error_without_status() {
        let transport = Arc::new(ScriptedTransport::new().fail("connection refused"));
        let d = dispatcher(RetryPolicy::NONE, transport.clone());
        let err = d.execute(&get(&d, "/accounts/1")).unwrap_err();
        match err {
            ApiError::Service { status, url, message } => {
                assert_eq!(status, None);
                assert_eq!(url, "http://ensek.test/api/accounts/1");
                assert_eq!(message, "connection refused");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn without_retry_a_single_attempt_is_made() {
        let transport = Arc::new(ScriptedTransport::new().reply(503, "down"));
        let d = dispatcher(RetryPolicy::NONE, transport.clone());
        let err = d.execute_with_retry(&get(&d, "/accounts/1")).unwrap_err();
        assert!(matches!(err, ApiError::Service { status: Some(503), .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn retry_recovers_after_transient_failures() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(500, "oops")
                .fail("timed out")
                .reply(200, r#"{"id":1507}"#),
        );
        let d = dispatcher(three_attempts(), transport.clone());

        let started = Instant::now();
        let response = d.execute_with_retry(&get(&d, "/accounts/1507")).unwrap();

        assert_eq!(response.body, r#"{"id":1507}"#);
        assert_eq!(transport.calls(), 3);
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn retry_gives_up_after_max_attempts_with_last_error() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .reply(500, "first")
                .reply(502, "second")
                .reply(503, "third")
                .reply(200, "{}"),
        );
        let d = dispatcher(three_attempts(), transport.clone());

        let err = d.execute_with_retry(&get(&d, "/accounts/1")).unwrap_err();

        assert_eq!(transport.calls(), 3);
        assert!(matches!(err, ApiError::Service { status: Some(503), ref message, .. } if message == "third"));
    }

    #[test]
    fn not_found_is_never_retried() {
        let transport = Arc::new(ScriptedTransport::new().reply(404, "").reply(200, "{}"));
        let d = dispatcher(three_attempts(), transport.clone());
        let err = d.execute_with_retry(&get(&d, "/accounts/9")).unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn invalid_request_is_never_retried() {
        let transport = Arc::new(ScriptedTransport::new().reply(400, "bad").reply(200, "{}"));
        let d = dispatcher(three_attempts(), transport.clone());
        let err = d
            .execute_with_retry(&get(&d, "/Accounts/aaa/MeterPoints"))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest { status: 400, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn debug_output_hides_the_credential() {
        let d = dispatcher(RetryPolicy::NONE, Arc::new(ScriptedTransport::new()));
        assert!(!format!("{d:?}").contains("secret"));
    }
}
