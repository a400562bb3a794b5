//! HTTP implementation of the remote auth client

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use companion_core::{LoginError, RemoteAuthClient};

use crate::error::{CliError, Result};

/// Header carrying the application client identifier
pub const CLIENT_ID_HEADER: &str = "X-Client-Id";

/// Upper bound on a login request when no read timeout is configured
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    login: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Identity {
    client_id: String,
    user_agent: String,
}

#[derive(Debug, Clone, Copy)]
struct RequestPolicy {
    max_attempts: u32,
    read_timeout: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            read_timeout: Duration::ZERO,
        }
    }
}

// ----------------------------------------------------------------------------
// HTTP Auth Client
// ----------------------------------------------------------------------------

/// Talks to the remote identity service over HTTP(S)
#[derive(Debug)]
pub struct HttpAuthClient {
    http: Client,
    login_url: Url,
    identity: RwLock<Identity>,
    policy: RwLock<RequestPolicy>,
    request_timeout: Duration,
    active: RwLock<Option<(String, String)>>,
}

impl HttpAuthClient {
    pub fn new(base_url: &Url, login_path: &str) -> Result<Self> {
        Self::with_client(Client::builder().build()?, base_url, login_path)
    }

    /// Use a preconfigured `reqwest::Client`
    pub fn with_client(http: Client, base_url: &Url, login_path: &str) -> Result<Self> {
        let login_url = base_url.join(login_path).map_err(|e| {
            CliError::Config(format!("Invalid login path {}: {}", login_path, e))
        })?;

        Ok(Self {
            http,
            login_url,
            identity: RwLock::new(Identity::default()),
            policy: RwLock::new(RequestPolicy::default()),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            active: RwLock::new(None),
        })
    }

    /// Bound applied to every request while the read timeout is zero
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn login_url(&self) -> &Url {
        &self.login_url
    }

    /// Username and token used for authenticated calls
    pub fn active_credentials(&self) -> Option<(String, String)> {
        self.active.read().clone()
    }

    async fn send_login(
        &self,
        request: &LoginRequest<'_>,
        policy: RequestPolicy,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let identity = self.identity.read().clone();
        // A zero read timeout only turns off timeout retries
        let timeout = if policy.read_timeout.is_zero() {
            self.request_timeout
        } else {
            policy.read_timeout
        };

        self.http
            .post(self.login_url.clone())
            .header(CLIENT_ID_HEADER, identity.client_id)
            .header(reqwest::header::USER_AGENT, identity.user_agent)
            .timeout(timeout)
            .json(request)
            .send()
            .await
    }

    fn is_retryable(err: &reqwest::Error, policy: RequestPolicy) -> bool {
        err.is_connect() || (err.is_timeout() && !policy.read_timeout.is_zero())
    }
}

#[async_trait]
impl RemoteAuthClient for HttpAuthClient {
    fn configure(&self, client_id: &str, app_name: &str, version: &str) {
        *self.identity.write() = Identity {
            client_id: client_id.to_string(),
            user_agent: format!("{}/{}", app_name, version),
        };
    }

    fn set_retry_policy(&self, max_attempts: u32, read_timeout: Duration) {
        *self.policy.write() = RequestPolicy {
            max_attempts: max_attempts.max(1),
            read_timeout,
        };
    }

    async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> std::result::Result<String, LoginError> {
        let policy = *self.policy.read();
        let request = LoginRequest {
            login: username,
            password,
        };

        let mut attempt = 1;
        let response = loop {
            match self.send_login(&request, policy).await {
                Ok(response) => break response,
                Err(e) if attempt < policy.max_attempts && Self::is_retryable(&e, policy) => {
                    warn!(
                        "Login request attempt {}/{} failed: {}",
                        attempt, policy.max_attempts, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(LoginError::other(e.to_string())),
            }
        };

        let status = response.status();
        debug!("Login request for {} returned {}", username, status);

        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(LoginError::client(status.as_u16(), describe(status, body)));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LoginError::other(describe(status, body)));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| LoginError::other(format!("Invalid login response: {}", e)))?;

        Ok(body.token.unwrap_or_default())
    }

    fn set_active_credentials(&self, username: Option<&str>, token: Option<&str>) {
        *self.active.write() = match (username, token) {
            (Some(username), Some(token)) => Some((username.to_string(), token.to_string())),
            _ => None,
        };
    }
}

fn describe(status: StatusCode, body: String) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body)
    }
}
