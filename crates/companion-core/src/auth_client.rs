//! Remote Auth Client Trait Definition
//!
//! The companion never speaks the remote service's wire format directly. It
//! drives a client through this narrow surface and only distinguishes
//! success, client errors (bad credentials) and everything else.

use core::time::Duration;

// ----------------------------------------------------------------------------
// Login Error
// ----------------------------------------------------------------------------

/// Failure classification returned by `RemoteAuthClient::login`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    /// The service rejected the request itself (invalid username or password)
    #[error("client error ({status}): {message}")]
    Client { status: u16, message: String },
    /// Network failure, timeout or server-side error
    #[error("request failed: {0}")]
    Other(String),
}

impl LoginError {
    pub fn client<M: Into<String>>(status: u16, message: M) -> Self {
        LoginError::Client {
            status,
            message: message.into(),
        }
    }

    pub fn other<M: Into<String>>(message: M) -> Self {
        LoginError::Other(message.into())
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, LoginError::Client { .. })
    }
}

// ----------------------------------------------------------------------------
// Remote Auth Client Trait
// ----------------------------------------------------------------------------

/// Client for the remote identity service
///
/// Configuration methods take `&self`; implementations keep their settings
/// behind interior mutability so a single client can be shared between the
/// authenticator and background retries.
#[async_trait::async_trait]
pub trait RemoteAuthClient: Send + Sync {
    /// Set the application identity sent with every request
    fn configure(&self, client_id: &str, app_name: &str, version: &str);

    /// Set connection retry count and per-request read timeout
    fn set_retry_policy(&self, max_attempts: u32, read_timeout: Duration);

    /// Exchange a username/password pair for a token
    async fn login(&self, username: &str, password: &str) -> Result<String, LoginError>;

    /// Credentials used for subsequent authenticated calls
    ///
    /// Both are `None` when no usable token is held.
    fn set_active_credentials(&self, username: Option<&str>, token: Option<&str>);
}
