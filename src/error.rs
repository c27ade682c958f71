//! Error types for the OTP engine.
//!
//! Every failure the engine can surface is a distinct variant so the
//! calling layer can tell "wait and retry" apart from "wrong code" and
//! "request a new code" without parsing messages.

use thiserror::Error;

/// Common error type for OTP engine operations.
#[derive(Error, Debug)]
pub enum OtpError {
    /// No account exists for the given email.
    #[error("account not found")]
    NotFound,

    /// Too many OTP issuance requests within the rolling window.
    #[error("too many code requests, try again later")]
    RateLimited,

    /// Verification was attempted but no code is currently issued.
    #[error("no active code for this account")]
    NoActiveCode,

    /// The code was presented at or after its expiry instant.
    #[error("code has expired")]
    Expired,

    /// The attempt counter for the issued code is exhausted.
    #[error("too many failed attempts, request a new code")]
    TooManyAttempts,

    /// The presented code does not match the issued one.
    #[error("invalid code")]
    InvalidCode,

    /// Password update attempted without a prior verified reset code.
    #[error("password reset was not validated")]
    NotValidated,

    /// The validated-reset window lapsed before the password update.
    #[error("password reset validation has expired")]
    ValidationExpired,

    /// The notification sender failed after state was persisted.
    #[error("failed to send notification: {0}")]
    SendFailure(String),

    /// A caller-supplied code was passed but overrides are disabled.
    #[error("code override is disabled")]
    OverrideDisabled,

    /// Code hashing or hash parsing failed.
    #[error("hash error: {0}")]
    Hash(String),

    /// Storage error, including lost optimistic-concurrency races.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Conversion from sqlx errors
impl From<sqlx::Error> for OtpError {
    fn from(e: sqlx::Error) -> Self {
        OtpError::Storage(e.to_string())
    }
}

/// Result type alias for OTP engine operations.
pub type Result<T> = std::result::Result<T, OtpError>;
