// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrying request execution and candidate-endpoint discovery.
//!
//! Two failure regimes are kept apart: transient faults (network errors,
//! 5xx) are retried with linear backoff, while anti-forgery rejections are
//! surfaced immediately because replaying the same token can never succeed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RequestError;
use crate::response::ResponseEnvelope;
use crate::session::TransportSession;

/// Outcome of one attempt inside a discovery run.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Success,
    /// Failed, but the next candidate may still work.
    Retryable(String),
    /// Failed in a way that aborts the whole run.
    Fatal(String),
}

/// One entry in a discovery trace.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    pub endpoint: String,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

/// A successful discovery run: which endpoint answered, its response, and
/// the full attempt trace for diagnostics.
#[derive(Debug)]
pub struct Discovery {
    pub endpoint: String,
    pub response: ResponseEnvelope,
    pub trace: Vec<RequestAttempt>,
}

/// HTTP client that layers retry, anti-forgery headers, and endpoint
/// discovery over a [`TransportSession`].
pub struct RemoteClient {
    session: Arc<TransportSession>,
    max_retries: u32,
    retry_delay: Duration,
    /// Endpoints that answered a discovery run, keyed by operation name.
    /// Remembered for the life of the client so later calls skip the scan.
    discovered: DashMap<String, String>,
}

impl RemoteClient {
    pub fn new(session: Arc<TransportSession>) -> Self {
        let max_retries = session.max_retries();
        let retry_delay = session.retry_delay();
        Self {
            session,
            max_retries,
            retry_delay,
            discovered: DashMap::new(),
        }
    }

    pub fn session(&self) -> &TransportSession {
        &self.session
    }

    /// The endpoint remembered for an operation, if a discovery run has
    /// succeeded for it before.
    pub fn discovered_endpoint(&self, operation: &str) -> Option<String> {
        self.discovered.get(operation).map(|e| e.value().clone())
    }

    /// Execute a request with bounded linear-backoff retry.
    ///
    /// Mutating verbs require a valid session and carry the anti-forgery
    /// header plus Origin/Referer. A forgery rejection is returned on the
    /// spot; network errors and server errors are retried until the budget
    /// runs out, at which point the last error is surfaced.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<ResponseEnvelope, RequestError> {
        let mut last_err: Option<RequestError> = None;

        for attempt in 1..=self.max_retries {
            match self.attempt_once(&method, endpoint, body).await {
                Ok(envelope) => {
                    if attempt > 1 {
                        debug!(endpoint, attempt, "request succeeded after retry");
                    }
                    return Ok(envelope);
                }
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    warn!(endpoint, attempt, error = %err, "request failed, retrying");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| RequestError::Network("no attempts made".to_string())))
    }

    async fn attempt_once(
        &self,
        method: &Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<ResponseEnvelope, RequestError> {
        let url = self.session.endpoint_url(endpoint)?;
        let mut builder = self
            .session
            .http()
            .request(method.clone(), url)
            .header("Accept", "application/json");

        if Self::is_mutating(method) {
            let session = self.session.ensure()?;
            builder = builder
                .header("X-CSRFToken", &session.csrf_token)
                .header("Origin", self.session.origin())
                .header("Referer", format!("{}/", self.session.origin()));
        }
        if let Some(payload) = body {
            builder = builder.json(payload);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RequestError::classify(status, &text));
        }

        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        Ok(ResponseEnvelope {
            status,
            location,
            body,
        })
    }

    /// Try candidate endpoints in order until one yields a usable response.
    ///
    /// A previously discovered endpoint for the same operation is tried
    /// first. Each candidate gets a single attempt; per-endpoint retry
    /// would multiply the scan cost for servers that simply lack the
    /// route. A forgery rejection aborts the whole run since every
    /// remaining candidate would fail the same way.
    pub async fn request_with_discovery(
        &self,
        operation: &str,
        method: Method,
        candidates: &[&str],
        body: Option<&Value>,
    ) -> Result<Discovery, RequestError> {
        let mut order: Vec<String> = Vec::with_capacity(candidates.len() + 1);
        if let Some(known) = self.discovered_endpoint(operation) {
            order.push(known);
        }
        for candidate in candidates {
            if !order.iter().any(|e| e == candidate) {
                order.push((*candidate).to_string());
            }
        }

        let mut trace = Vec::with_capacity(order.len());
        let mut failures: Vec<(String, String)> = Vec::new();

        for (index, endpoint) in order.iter().enumerate() {
            let started = Instant::now();
            let attempt = index as u32 + 1;
            match self.attempt_once(&method, endpoint, body).await {
                Ok(envelope) if envelope.is_usable() => {
                    trace.push(RequestAttempt {
                        endpoint: endpoint.clone(),
                        attempt,
                        outcome: AttemptOutcome::Success,
                        latency: started.elapsed(),
                    });
                    info!(operation, endpoint, "endpoint discovered");
                    self.discovered.insert(operation.to_string(), endpoint.clone());
                    return Ok(Discovery {
                        endpoint: endpoint.clone(),
                        response: envelope,
                        trace,
                    });
                }
                Ok(envelope) => {
                    let reason = format!("{} returned an unusable payload", envelope.status);
                    trace.push(RequestAttempt {
                        endpoint: endpoint.clone(),
                        attempt,
                        outcome: AttemptOutcome::Retryable(reason.clone()),
                        latency: started.elapsed(),
                    });
                    failures.push((endpoint.clone(), reason));
                }
                Err(err @ RequestError::Forgery(_)) => {
                    trace.push(RequestAttempt {
                        endpoint: endpoint.clone(),
                        attempt,
                        outcome: AttemptOutcome::Fatal(err.to_string()),
                        latency: started.elapsed(),
                    });
                    warn!(operation, endpoint, "anti-forgery rejection, aborting discovery");
                    return Err(err);
                }
                Err(err @ RequestError::SessionExpired) => {
                    trace.push(RequestAttempt {
                        endpoint: endpoint.clone(),
                        attempt,
                        outcome: AttemptOutcome::Fatal(err.to_string()),
                        latency: started.elapsed(),
                    });
                    return Err(err);
                }
                Err(err) => {
                    let reason = err.to_string();
                    debug!(operation, endpoint, error = %reason, "candidate failed");
                    trace.push(RequestAttempt {
                        endpoint: endpoint.clone(),
                        attempt,
                        outcome: AttemptOutcome::Retryable(reason.clone()),
                        latency: started.elapsed(),
                    });
                    failures.push((endpoint.clone(), reason));
                }
            }
        }

        Err(RequestError::NoUsableEndpoint { attempts: failures })
    }

    fn is_mutating(method: &Method) -> bool {
        matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labfold_config::RemoteConfig;
    use wiremock::matchers::{header, method as http_method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> RemoteClient {
        let config = RemoteConfig {
            base_url: Some(server.uri()),
            verify_tls: true,
            session_ttl_ms: 600_000,
            max_retries: 3,
            retry_delay_ms: 10,
        };
        let session = Arc::new(TransportSession::connect(&config).unwrap());
        RemoteClient::new(session)
    }

    async fn mount_token(server: &MockServer, token: &str) {
        Mock::given(http_method("GET"))
            .and(path("/api/v0/token/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": token})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn get_does_not_require_session() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v0/m/projects/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let envelope = client
            .request(Method::GET, "api/v0/m/projects/", None)
            .await
            .unwrap();
        assert_eq!(envelope.status, 200);
    }

    #[tokio::test]
    async fn post_without_session_is_rejected_locally() {
        let server = MockServer::start().await;
        let client = client_for(&server).await;

        let err = client
            .request(Method::POST, "api/v0/m/datasets/", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::SessionExpired));
        // Nothing was sent.
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_carries_antiforgery_headers() {
        let server = MockServer::start().await;
        mount_token(&server, "tok-9").await;
        Mock::given(http_method("POST"))
            .and(path("/api/v0/m/datasets/"))
            .and(header("X-CSRFToken", "tok-9"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"data": {"@id": 5}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.session().fetch_token().await.unwrap();

        let envelope = client
            .request(
                Method::POST,
                "api/v0/m/datasets/",
                Some(&serde_json::json!({"Name": "d"})),
            )
            .await
            .unwrap();
        assert_eq!(envelope.status, 201);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v0/m/projects/"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(http_method("GET"))
            .and(path("/api/v0/m/projects/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let envelope = client
            .request(Method::GET, "api/v0/m/projects/", None)
            .await
            .unwrap();
        assert_eq!(envelope.status, 200);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_surfaces_last_error() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v0/m/projects/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(3)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .request(Method::GET, "api/v0/m/projects/", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Server { status: 500, .. }));
    }

    #[tokio::test]
    async fn forgery_rejection_is_never_retried() {
        let server = MockServer::start().await;
        mount_token(&server, "stale").await;
        Mock::given(http_method("POST"))
            .and(path("/api/v0/m/datasets/"))
            .respond_with(
                ResponseTemplate::new(403).set_body_string("CSRF token missing or incorrect."),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.session().fetch_token().await.unwrap();

        let err = client
            .request(Method::POST, "api/v0/m/datasets/", Some(&serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Forgery(_)));
        // One token fetch plus exactly one POST.
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn discovery_takes_first_usable_candidate() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v1/things/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/things/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [{"id": 1}]})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let discovery = client
            .request_with_discovery(
                "things",
                Method::GET,
                &["api/v1/things/", "api/v2/things/"],
                None,
            )
            .await
            .unwrap();

        assert_eq!(discovery.endpoint, "api/v2/things/");
        assert_eq!(discovery.trace.len(), 2);
        assert!(matches!(
            discovery.trace[0].outcome,
            AttemptOutcome::Retryable(_)
        ));
        assert!(matches!(discovery.trace[1].outcome, AttemptOutcome::Success));
        assert_eq!(
            client.discovered_endpoint("things").as_deref(),
            Some("api/v2/things/")
        );
    }

    #[tokio::test]
    async fn discovery_prefers_remembered_endpoint() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/things/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [{"id": 1}]})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client
            .discovered
            .insert("things".to_string(), "api/v2/things/".to_string());

        let discovery = client
            .request_with_discovery(
                "things",
                Method::GET,
                &["api/v1/things/", "api/v2/things/"],
                None,
            )
            .await
            .unwrap();

        // The remembered endpoint answered first; the dead candidate was
        // never contacted.
        assert_eq!(discovery.endpoint, "api/v2/things/");
        assert_eq!(discovery.trace.len(), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn discovery_exhaustion_reports_every_candidate() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v1/things/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/things/"))
            .respond_with(ResponseTemplate::new(501))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .request_with_discovery(
                "things",
                Method::GET,
                &["api/v1/things/", "api/v2/things/"],
                None,
            )
            .await
            .unwrap_err();

        match err {
            RequestError::NoUsableEndpoint { attempts } => {
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].0, "api/v1/things/");
                assert_eq!(attempts[1].0, "api/v2/things/");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn discovery_aborts_on_forgery() {
        let server = MockServer::start().await;
        mount_token(&server, "tok").await;
        Mock::given(http_method("POST"))
            .and(path("/api/v1/annotations/"))
            .respond_with(ResponseTemplate::new(403).set_body_string("CSRF verification failed"))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.session().fetch_token().await.unwrap();

        let err = client
            .request_with_discovery(
                "annotation",
                Method::POST,
                &["api/v1/annotations/", "api/v2/annotations/"],
                Some(&serde_json::json!({})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Forgery(_)));
        assert!(client.discovered_endpoint("annotation").is_none());
    }

    #[tokio::test]
    async fn usable_rejects_empty_success_body() {
        let server = MockServer::start().await;
        Mock::given(http_method("GET"))
            .and(path("/api/v1/things/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;
        Mock::given(http_method("GET"))
            .and(path("/api/v2/things/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let discovery = client
            .request_with_discovery(
                "things",
                Method::GET,
                &["api/v1/things/", "api/v2/things/"],
                None,
            )
            .await
            .unwrap();
        // A 200 without any recognizable payload shape does not count.
        assert_eq!(discovery.endpoint, "api/v2/things/");
    }
}
