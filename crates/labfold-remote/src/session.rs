// SPDX-FileCopyrightText: 2026 Labfold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anti-forgery token and session lifecycle against one remote origin.
//!
//! Lifecycle: uninitialized -> token acquired -> established -> expired,
//! with expiry checked lazily on use (no background timer). The current
//! session snapshot lives in an `ArcSwapOption`: concurrent callers share
//! one token, and a re-acquisition racing an in-flight request may swap the
//! token mid-flight. That race is accepted and documented rather than
//! locked away; the server treats both tokens of the overlap as valid.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use labfold_config::RemoteConfig;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::error::RequestError;

/// How the current session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMethod {
    /// Username/password form login.
    Credentials,
    /// Caller-supplied session id adopted into the cookie jar.
    SessionCookies,
    /// Anonymous public-group access, read-mostly.
    PublicGroup,
}

/// Immutable snapshot of an established session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Token from the response body -- authoritative for the header check.
    pub csrf_token: String,
    /// Token the server set as a cookie, when it did. A mismatch with the
    /// body token is recorded as a warning, never an error.
    pub cookie_token: Option<String>,
    pub established_at: Instant,
    pub ttl: Duration,
    pub origin: String,
    pub is_authenticated: bool,
    pub login_method: Option<LoginMethod>,
}

impl Session {
    /// Valid iff the TTL has not elapsed. An invalid session must be
    /// re-established before use, never silently reused.
    pub fn is_valid(&self) -> bool {
        self.established_at.elapsed() < self.ttl
    }
}

/// Token acquisition and session tracking for one remote origin.
///
/// Treat one instance per origin as a singleton: the token is shared by
/// every request the client issues against that origin.
pub struct TransportSession {
    http: reqwest::Client,
    jar: Arc<Jar>,
    base_url: Url,
    origin: String,
    ttl: Duration,
    max_retries: u32,
    retry_delay: Duration,
    current: ArcSwapOption<Session>,
}

impl TransportSession {
    /// Build a session handle from config. Fails fast on a missing or
    /// unparsable base URL; no network traffic happens here.
    pub fn connect(config: &RemoteConfig) -> Result<Self, RequestError> {
        let raw = config
            .base_url
            .as_deref()
            .and_then(labfold_config::format_base_url)
            .ok_or_else(|| RequestError::Config("remote.base_url is not set".to_string()))?;
        let base_url = Url::parse(&raw)
            .map_err(|e| RequestError::Config(format!("invalid base URL {raw:?}: {e}")))?;
        let origin = raw.trim_end_matches('/').to_string();

        let jar = Arc::new(Jar::default());
        let mut builder = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .timeout(Duration::from_secs(30));
        if !config.verify_tls {
            warn!("TLS certificate verification disabled for {origin}");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| RequestError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            jar,
            base_url,
            origin,
            ttl: Duration::from_millis(config.session_ttl_ms),
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            current: ArcSwapOption::from(None),
        })
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Resolve an endpoint path against the base URL.
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url, RequestError> {
        self.base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| RequestError::Config(format!("invalid endpoint {endpoint:?}: {e}")))
    }

    /// The current session snapshot, if any (valid or not).
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.load_full()
    }

    /// The current session if it is still within its TTL.
    ///
    /// An expired or absent session is an error: the caller decides how to
    /// re-establish (credentials, adopted cookies, or public access).
    pub fn ensure(&self) -> Result<Arc<Session>, RequestError> {
        match self.current.load_full() {
            Some(session) if session.is_valid() => Ok(session),
            _ => Err(RequestError::SessionExpired),
        }
    }

    /// Acquire an anti-forgery token from the well-known token endpoint.
    ///
    /// The server returns the token in the body and also sets it as a
    /// cookie; the body value is authoritative for the header-based check,
    /// and a mismatch is a warning, not a failure. Retries with linear
    /// backoff; exhaustion is fatal for the call chain.
    pub async fn fetch_token(&self) -> Result<String, RequestError> {
        let url = self.endpoint_url("api/v0/token/")?;
        let mut last_err: Option<RequestError> = None;

        for attempt in 1..=self.max_retries {
            let result = self
                .http
                .get(url.clone())
                .header("Accept", "application/json")
                .header("Cache-Control", "no-cache")
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if response.status().is_success() {
                        let body: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| RequestError::TokenAcquisition(e.to_string()))?;
                        let token = body
                            .get("data")
                            .and_then(|v| v.as_str())
                            .ok_or_else(|| {
                                RequestError::TokenAcquisition(
                                    "token endpoint returned no data field".to_string(),
                                )
                            })?
                            .to_string();

                        let cookie_token = self.cookie_csrf_token();
                        match &cookie_token {
                            Some(cookie) if *cookie != token => {
                                warn!("body and cookie anti-forgery tokens differ, using body token");
                            }
                            None => debug!("server set no anti-forgery cookie"),
                            _ => {}
                        }

                        self.current.store(Some(Arc::new(Session {
                            csrf_token: token.clone(),
                            cookie_token,
                            established_at: Instant::now(),
                            ttl: self.ttl,
                            origin: self.origin.clone(),
                            is_authenticated: false,
                            login_method: None,
                        })));
                        debug!("anti-forgery token acquired");
                        return Ok(token);
                    }

                    let body = response.text().await.unwrap_or_default();
                    last_err = Some(RequestError::TokenAcquisition(format!(
                        "token endpoint returned {status}: {body}"
                    )));
                }
                Err(e) => last_err = Some(RequestError::TokenAcquisition(e.to_string())),
            }

            if attempt < self.max_retries {
                warn!(attempt, "token request failed, retrying");
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| RequestError::TokenAcquisition("no attempts made".to_string())))
    }

    /// Form-based credential login, the Django-standard path.
    ///
    /// Fetches a fresh token, resolves the server id (defaulting to 1 when
    /// the servers endpoint is unreachable), posts the login form, and
    /// confirms API access with a probe read.
    pub async fn login(&self, username: &str, password: &str) -> Result<Arc<Session>, RequestError> {
        let token = self.fetch_token().await?;
        let server_id = self.resolve_server_id(&token).await;

        let url = self.endpoint_url("api/v0/login/")?;
        let form = [
            ("username", username),
            ("password", password),
            ("server", &server_id.to_string()),
            ("csrfmiddlewaretoken", &token),
        ];

        let response = self
            .http
            .post(url)
            .header("X-CSRFToken", &token)
            .header("Accept", "application/json")
            .header("Origin", &self.origin)
            .header("Referer", format!("{}/webclient/login/", self.origin))
            .form(&form)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() && status != 302 {
            let body = response.text().await.unwrap_or_default();
            return Err(RequestError::classify(status, &body));
        }

        let authenticated = self.store_established(&token, true, LoginMethod::Credentials);
        let has_api_access = self.probe(&token).await;
        if !has_api_access {
            warn!("login succeeded but the API probe failed, access may be limited");
        }
        info!(username = %username, "credential login established");
        Ok(authenticated)
    }

    /// Anonymous public-group session: token plus a successful probe read.
    pub async fn login_public(&self) -> Result<Arc<Session>, RequestError> {
        let token = self.fetch_token().await?;
        if !self.probe(&token).await {
            return Err(RequestError::TokenAcquisition(
                "public-group probe rejected the token".to_string(),
            ));
        }
        info!("public-group session established");
        Ok(self.store_established(&token, false, LoginMethod::PublicGroup))
    }

    /// Adopt an externally obtained session id + token pair (e.g. from a
    /// browser the user is already logged into).
    pub async fn adopt_session(
        &self,
        session_id: &str,
        csrf_token: &str,
    ) -> Result<Arc<Session>, RequestError> {
        self.jar.add_cookie_str(
            &format!("sessionid={session_id}; Path=/"),
            &self.base_url,
        );
        self.jar.add_cookie_str(
            &format!("csrftoken={csrf_token}; Path=/"),
            &self.base_url,
        );

        if !self.probe(csrf_token).await {
            return Err(RequestError::TokenAcquisition(
                "adopted session was rejected by the server".to_string(),
            ));
        }
        info!("adopted external session cookies");
        Ok(self.store_established(csrf_token, true, LoginMethod::SessionCookies))
    }

    /// Best-effort server-side logout, then drop local state.
    pub async fn logout(&self) {
        if let Some(session) = self.current.load_full() {
            if session.is_authenticated {
                let logout = async {
                    let url = self.endpoint_url("webclient/logout/")?;
                    self.http
                        .post(url)
                        .header("X-CSRFToken", &session.csrf_token)
                        .send()
                        .await?;
                    Ok::<_, RequestError>(())
                };
                if let Err(e) = logout.await {
                    warn!(error = %e, "server-side logout failed, clearing local session anyway");
                }
            }
        }
        self.reset();
    }

    /// Drop the current session unconditionally. Next use starts from
    /// scratch with a fresh token.
    pub fn reset(&self) {
        self.current.store(None);
        debug!("session cleared");
    }

    /// Harmless read confirming the server honors the token.
    async fn probe(&self, token: &str) -> bool {
        let Ok(url) = self.endpoint_url("api/v0/m/projects/") else {
            return false;
        };
        match self
            .http
            .get(url)
            .header("Accept", "application/json")
            .header("X-CSRFToken", token)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "session probe failed");
                false
            }
        }
    }

    /// Look up the first configured server id, defaulting to 1. Deployments
    /// without a reachable servers endpoint still accept the default.
    async fn resolve_server_id(&self, token: &str) -> u64 {
        let fallback = 1;
        let Ok(url) = self.endpoint_url("api/v0/servers/") else {
            return fallback;
        };
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .header("X-CSRFToken", token)
            .send()
            .await;
        let Ok(response) = response else {
            warn!("servers endpoint unreachable, using default server id");
            return fallback;
        };
        let Ok(body) = response.json::<serde_json::Value>().await else {
            return fallback;
        };
        body.get("data")
            .and_then(|d| d.as_array())
            .and_then(|servers| servers.first())
            .and_then(|s| s.get("id"))
            .and_then(|id| id.as_u64())
            .unwrap_or(fallback)
    }

    fn store_established(
        &self,
        token: &str,
        is_authenticated: bool,
        method: LoginMethod,
    ) -> Arc<Session> {
        let session = Arc::new(Session {
            csrf_token: token.to_string(),
            cookie_token: self.cookie_csrf_token(),
            established_at: Instant::now(),
            ttl: self.ttl,
            origin: self.origin.clone(),
            is_authenticated,
            login_method: Some(method),
        });
        self.current.store(Some(session.clone()));
        session
    }

    /// Extract the `csrftoken` cookie for this origin from the jar.
    fn cookie_csrf_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == "csrftoken").then(|| value.to_string())
        })
    }
}
