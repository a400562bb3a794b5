//! Domain types shared between the runtime and its host

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{CompanionError, CompanionResult};

// ----------------------------------------------------------------------------
// Preference Enumerations
// ----------------------------------------------------------------------------

/// Which event-feed mechanism the host subscribes to
///
/// Changing the activity mode requires a full restart of the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityMode {
    /// Let the host pick the best available mechanism
    #[default]
    Automatic,
    /// Tail the host's log file
    Logging,
    /// Subscribe to the host's websocket notification stream
    WebSocket,
}

impl ActivityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityMode::Automatic => "automatic",
            ActivityMode::Logging => "logging",
            ActivityMode::WebSocket => "web_socket",
        }
    }
}

impl fmt::Display for ActivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityMode {
    type Err = CompanionError;

    fn from_str(s: &str) -> CompanionResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "automatic" => Ok(ActivityMode::Automatic),
            "logging" => Ok(ActivityMode::Logging),
            "web_socket" | "websocket" => Ok(ActivityMode::WebSocket),
            other => Err(CompanionError::invalid_config(
                "activity_mode",
                format!("unknown activity mode '{}'", other),
            )),
        }
    }
}

/// Metadata matcher selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherMode {
    /// Use the host's own matching only
    Plex,
    /// Host matching extended with title parsing
    #[default]
    PlexExtended,
}

impl MatcherMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatcherMode::Plex => "plex",
            MatcherMode::PlexExtended => "plex_extended",
        }
    }
}

impl fmt::Display for MatcherMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatcherMode {
    type Err = CompanionError;

    fn from_str(s: &str) -> CompanionResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plex" => Ok(MatcherMode::Plex),
            "plex_extended" => Ok(MatcherMode::PlexExtended),
            other => Err(CompanionError::invalid_config(
                "matcher_mode",
                format!("unknown matcher mode '{}'", other),
            )),
        }
    }
}

/// Log verbosity selected in the preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive accepted by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "TRACE"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ----------------------------------------------------------------------------
// Preferences
// ----------------------------------------------------------------------------

/// User-supplied preferences
///
/// Mutated only by the host's preference UI. The core reads them and writes
/// back nothing except `valid`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub username: String,
    pub password: String,
    pub activity_mode: ActivityMode,
    pub matcher_mode: MatcherMode,
    pub log_level: LogLevel,
    pub valid: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            activity_mode: ActivityMode::default(),
            matcher_mode: MatcherMode::default(),
            log_level: LogLevel::default(),
            valid: true,
        }
    }
}

impl Preferences {
    /// Preferences carrying only a username/password pair
    pub fn with_credentials<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Strip surrounding whitespace from the username
    ///
    /// Passwords are left untouched.
    pub fn normalized(mut self) -> Self {
        let trimmed = self.username.trim();
        if trimmed.len() != self.username.len() {
            self.username = trimmed.to_string();
        }
        self
    }

    pub fn matcher_flags(&self) -> MatcherFlags {
        MatcherFlags::from(self.matcher_mode)
    }
}

impl fmt::Debug for Preferences {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preferences")
            .field("username", &self.username)
            .field(
                "password",
                &if self.password.is_empty() { "" } else { "<redacted>" },
            )
            .field("activity_mode", &self.activity_mode)
            .field("matcher_mode", &self.matcher_mode)
            .field("log_level", &self.log_level)
            .field("valid", &self.valid)
            .finish()
    }
}

/// Feature flags derived from the matcher mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatcherFlags {
    pub caper_enabled: bool,
    pub extend_enabled: bool,
}

impl From<MatcherMode> for MatcherFlags {
    fn from(mode: MatcherMode) -> Self {
        let extended = mode == MatcherMode::PlexExtended;
        Self {
            caper_enabled: extended,
            extend_enabled: extended,
        }
    }
}

// ----------------------------------------------------------------------------
// Authentication State
// ----------------------------------------------------------------------------

/// Phase of the authentication state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AuthPhase {
    #[default]
    Unauthenticated,
    Authenticating,
    Authenticated,
    /// Absorbing until the credentials change
    FailedTerminal,
    /// A retry has been scheduled
    FailedRetryable,
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthPhase::Unauthenticated => write!(f, "unauthenticated"),
            AuthPhase::Authenticating => write!(f, "authenticating"),
            AuthPhase::Authenticated => write!(f, "authenticated"),
            AuthPhase::FailedTerminal => write!(f, "failed"),
            AuthPhase::FailedRetryable => write!(f, "retrying"),
        }
    }
}

/// Snapshot of the authenticator's state
///
/// `username` and `token` are set and cleared together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationState {
    username: Option<String>,
    token: Option<String>,
    pub phase: AuthPhase,
    pub valid: bool,
    pub retry_interval: Duration,
}

impl AuthenticationState {
    pub fn new(retry_interval: Duration) -> Self {
        Self {
            username: None,
            token: None,
            phase: AuthPhase::Unauthenticated,
            valid: false,
            retry_interval,
        }
    }

    /// Record a credential pair; an empty component clears both
    pub fn set_credentials(&mut self, username: Option<String>, token: Option<String>) {
        match (username, token) {
            (Some(username), Some(token)) if !username.is_empty() && !token.is_empty() => {
                self.username = Some(username);
                self.token = Some(token);
            }
            _ => self.clear_credentials(),
        }
    }

    pub fn clear_credentials(&mut self) {
        self.username = None;
        self.token = None;
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

// ----------------------------------------------------------------------------
// Validation Message
// ----------------------------------------------------------------------------

/// Two-field message returned to the host after preference validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub title: String,
    pub body: String,
}

impl ValidationMessage {
    pub fn success<B: Into<String>>(body: B) -> Self {
        Self {
            title: "Success".to_string(),
            body: body.into(),
        }
    }

    pub fn error<B: Into<String>>(body: B) -> Self {
        Self {
            title: "Error".to_string(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.title == "Success"
    }
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_pair_invariant() {
        let mut state = AuthenticationState::new(Duration::from_secs(30));
        state.set_credentials(Some("a".to_string()), Some("T1".to_string()));
        assert_eq!(state.username(), Some("a"));
        assert_eq!(state.token(), Some("T1"));

        // Half a pair clears both
        state.set_credentials(Some("a".to_string()), None);
        assert_eq!(state.username(), None);
        assert_eq!(state.token(), None);

        state.set_credentials(Some(String::new()), Some("T2".to_string()));
        assert!(!state.has_token());
    }

    #[test]
    fn test_matcher_flags() {
        let flags = MatcherFlags::from(MatcherMode::PlexExtended);
        assert!(flags.caper_enabled && flags.extend_enabled);

        let flags = MatcherFlags::from(MatcherMode::Plex);
        assert!(!flags.caper_enabled && !flags.extend_enabled);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("logging".parse::<ActivityMode>().unwrap(), ActivityMode::Logging);
        assert_eq!(
            "WebSocket".parse::<ActivityMode>().unwrap(),
            ActivityMode::WebSocket
        );
        assert!("pubsub".parse::<ActivityMode>().is_err());
        assert_eq!(
            " plex_extended ".parse::<MatcherMode>().unwrap(),
            MatcherMode::PlexExtended
        );
    }

    #[test]
    fn test_preferences_debug_redacts_password() {
        let prefs = Preferences::with_credentials("a", "hunter2");
        let rendered = format!("{:?}", prefs);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_normalized_trims_username_only() {
        let prefs = Preferences::with_credentials("  a ", " pw ").normalized();
        assert_eq!(prefs.username, "a");
        assert_eq!(prefs.password, " pw ");
        assert!(prefs.has_credentials());
    }
}
