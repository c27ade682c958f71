//! Configuration for the OTP engine.
//!
//! The engine is constructed from an explicit [`EngineConfig`] value,
//! either built in code or loaded from a TOML file. Required values
//! (the notification sender identity) are validated eagerly so a
//! misconfigured deployment fails at startup, not on the first send.

use chrono::Duration;
use serde::Deserialize;
use std::path::Path;

use crate::{OtpError, Result};

/// Notification sender identity.
///
/// Used to build the `From:` address of every outgoing notification.
/// Both fields are required; [`EngineConfig::validate`] rejects a
/// configuration that leaves them empty.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SenderConfig {
    /// Display name shown to recipients.
    #[serde(default)]
    pub name: String,
    /// Sender email address.
    #[serde(default)]
    pub email: String,
}

impl SenderConfig {
    /// Create a sender identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Format as an RFC 5322 style mailbox, e.g. `Acme <no-reply@acme.io>`.
    pub fn mailbox(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

/// OTP lifecycle configuration.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OtpConfig {
    /// Lifetime of a signup verification code, in seconds.
    #[serde(default = "default_signup_expiry")]
    pub signup_expiry_secs: i64,
    /// Lifetime of a password reset code, in seconds.
    #[serde(default = "default_reset_expiry")]
    pub reset_expiry_secs: i64,
    /// How long a verified reset stays authorized to change the
    /// password, in seconds.
    #[serde(default = "default_validated_window")]
    pub validated_window_secs: i64,
    /// Length of the rolling issuance window, in seconds.
    #[serde(default = "default_request_window")]
    pub request_window_secs: i64,
    /// Maximum issuances per rolling window, shared across purposes.
    #[serde(default = "default_max_requests")]
    pub max_requests_per_window: i64,
    /// Maximum failed guesses per issued code.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    /// Allow callers to supply the code on issue (deterministic tests).
    ///
    /// Must stay off in production; the engine refuses override codes
    /// entirely while this is false.
    #[serde(default)]
    pub allow_code_override: bool,
}

fn default_signup_expiry() -> i64 {
    3600
}

fn default_reset_expiry() -> i64 {
    300
}

fn default_validated_window() -> i64 {
    300
}

fn default_request_window() -> i64 {
    3600
}

fn default_max_requests() -> i64 {
    5
}

fn default_max_attempts() -> i64 {
    5
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            signup_expiry_secs: default_signup_expiry(),
            reset_expiry_secs: default_reset_expiry(),
            validated_window_secs: default_validated_window(),
            request_window_secs: default_request_window(),
            max_requests_per_window: default_max_requests(),
            max_attempts: default_max_attempts(),
            allow_code_override: false,
        }
    }
}

impl OtpConfig {
    /// Signup code lifetime as a duration.
    pub fn signup_expiry(&self) -> Duration {
        Duration::seconds(self.signup_expiry_secs)
    }

    /// Reset code lifetime as a duration.
    pub fn reset_expiry(&self) -> Duration {
        Duration::seconds(self.reset_expiry_secs)
    }

    /// Validated-reset window as a duration.
    pub fn validated_window(&self) -> Duration {
        Duration::seconds(self.validated_window_secs)
    }

    /// Rolling issuance window as a duration.
    pub fn request_window(&self) -> Duration {
        Duration::seconds(self.request_window_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file path; console-only when unset.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// Notification sender identity.
    #[serde(default)]
    pub sender: SenderConfig,
    /// OTP lifecycle settings.
    #[serde(default)]
    pub otp: OtpConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing sections and fields fall back to their defaults; the
    /// result is validated before being returned.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig =
            toml::from_str(&content).map_err(|e| OtpError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate required values and limits.
    ///
    /// Fails if the sender identity is missing or any limit/window is
    /// non-positive.
    pub fn validate(&self) -> Result<()> {
        if self.sender.name.trim().is_empty() {
            return Err(OtpError::Config("sender.name must be set".to_string()));
        }
        if self.sender.email.trim().is_empty() {
            return Err(OtpError::Config("sender.email must be set".to_string()));
        }
        if !self.sender.email.contains('@') {
            return Err(OtpError::Config(format!(
                "sender.email is not a valid address: {}",
                self.sender.email
            )));
        }
        if self.otp.signup_expiry_secs <= 0
            || self.otp.reset_expiry_secs <= 0
            || self.otp.validated_window_secs <= 0
            || self.otp.request_window_secs <= 0
        {
            return Err(OtpError::Config(
                "expiry and window values must be positive".to_string(),
            ));
        }
        if self.otp.max_requests_per_window <= 0 || self.otp.max_attempts <= 0 {
            return Err(OtpError::Config(
                "request and attempt limits must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
