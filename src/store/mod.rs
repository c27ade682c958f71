//! Account security records and the storage seam.
//!
//! The engine owns one record per account, keyed by normalized email.
//! Storage backends implement [`AccountStore`]; the crate ships an
//! in-memory store for tests/embedding and a SQLite store.

mod memory;
mod sql;

pub use memory::MemoryStore;
pub use sql::{Database, DbPool, SqlAccountStore, MIGRATIONS};

use chrono::{DateTime, Duration, Utc};

use crate::Result;

/// Normalize an email address for use as a record key.
///
/// Every lookup and every stored key goes through this, so two spellings
/// of the same address always land on the same record.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Which OTP flow a code belongs to.
///
/// Signup verification and password reset run independent lifecycles
/// over the same record; only the issuance throttle is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    /// Account-email verification after signup.
    Signup,
    /// Password reset.
    Reset,
}

impl OtpPurpose {
    /// String form, used in logs and template selection.
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Signup => "signup",
            OtpPurpose::Reset => "reset",
        }
    }
}

impl std::fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-account security state owned by the OTP engine.
///
/// A code hash and its expiry are always set or cleared together, and
/// the matching attempt counter is zeroed whenever that happens; all
/// mutation goes through the helper methods below to keep those
/// invariants in one place.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AccountRecord {
    /// Normalized email, the record key.
    pub email: String,
    /// Login credential slot; hashing it is the embedding app's policy.
    pub password: Option<String>,
    /// Terminal flag set once signup verification succeeds.
    pub is_verified: bool,

    /// Hash of the active signup code, if any.
    pub signup_code_hash: Option<String>,
    /// Signup code expiry; the code is invalid at or after this instant.
    pub signup_code_expires_at: Option<DateTime<Utc>>,
    /// Failed signup verification attempts since the code was issued.
    pub signup_attempts: i64,

    /// Hash of the active reset code, if any.
    pub reset_code_hash: Option<String>,
    /// Reset code expiry.
    pub reset_code_expires_at: Option<DateTime<Utc>>,
    /// Failed reset verification attempts since the code was issued.
    pub reset_attempts: i64,
    /// When the reset code was successfully verified.
    pub reset_validated_at: Option<DateTime<Utc>>,
    /// End of the window during which the password may be changed.
    pub reset_validated_expires_at: Option<DateTime<Utc>>,

    /// Issuances within the current rolling window, shared across
    /// purposes.
    pub otp_request_count: i64,
    /// Anchor of the rolling window.
    pub last_otp_request_at: Option<DateTime<Utc>>,

    /// Optimistic-concurrency stamp, bumped by every successful save.
    pub version: i64,
}

impl AccountRecord {
    /// Create a fresh record for an account with no OTP state.
    pub fn new(email: impl AsRef<str>) -> Self {
        Self {
            email: normalize_email(email.as_ref()),
            password: None,
            is_verified: false,
            signup_code_hash: None,
            signup_code_expires_at: None,
            signup_attempts: 0,
            reset_code_hash: None,
            reset_code_expires_at: None,
            reset_attempts: 0,
            reset_validated_at: None,
            reset_validated_expires_at: None,
            otp_request_count: 0,
            last_otp_request_at: None,
            version: 0,
        }
    }

    /// Active code hash for a purpose.
    pub fn code_hash(&self, purpose: OtpPurpose) -> Option<&str> {
        match purpose {
            OtpPurpose::Signup => self.signup_code_hash.as_deref(),
            OtpPurpose::Reset => self.reset_code_hash.as_deref(),
        }
    }

    /// Expiry of the active code for a purpose.
    pub fn code_expires_at(&self, purpose: OtpPurpose) -> Option<DateTime<Utc>> {
        match purpose {
            OtpPurpose::Signup => self.signup_code_expires_at,
            OtpPurpose::Reset => self.reset_code_expires_at,
        }
    }

    /// Failed attempt count for a purpose.
    pub fn attempts(&self, purpose: OtpPurpose) -> i64 {
        match purpose {
            OtpPurpose::Signup => self.signup_attempts,
            OtpPurpose::Reset => self.reset_attempts,
        }
    }

    /// Install a freshly issued code: hash and expiry set together,
    /// attempts back to zero.
    pub fn set_code(&mut self, purpose: OtpPurpose, hash: String, expires_at: DateTime<Utc>) {
        match purpose {
            OtpPurpose::Signup => {
                self.signup_code_hash = Some(hash);
                self.signup_code_expires_at = Some(expires_at);
                self.signup_attempts = 0;
            }
            OtpPurpose::Reset => {
                self.reset_code_hash = Some(hash);
                self.reset_code_expires_at = Some(expires_at);
                self.reset_attempts = 0;
            }
        }
    }

    /// Drop the active code: hash and expiry cleared together, attempts
    /// back to zero.
    pub fn clear_code(&mut self, purpose: OtpPurpose) {
        match purpose {
            OtpPurpose::Signup => {
                self.signup_code_hash = None;
                self.signup_code_expires_at = None;
                self.signup_attempts = 0;
            }
            OtpPurpose::Reset => {
                self.reset_code_hash = None;
                self.reset_code_expires_at = None;
                self.reset_attempts = 0;
            }
        }
    }

    /// Count a failed guess; returns the new attempt total.
    pub fn record_failed_attempt(&mut self, purpose: OtpPurpose) -> i64 {
        match purpose {
            OtpPurpose::Signup => {
                self.signup_attempts += 1;
                self.signup_attempts
            }
            OtpPurpose::Reset => {
                self.reset_attempts += 1;
                self.reset_attempts
            }
        }
    }

    /// Open the validated-reset window after a successful reset
    /// verification.
    pub fn open_validated_window(&mut self, now: DateTime<Utc>, window: Duration) {
        self.reset_validated_at = Some(now);
        self.reset_validated_expires_at = Some(now + window);
    }

    /// Clear the validated-reset window.
    pub fn clear_validated_window(&mut self) {
        self.reset_validated_at = None;
        self.reset_validated_expires_at = None;
    }

    /// Clear everything related to a password reset in flight: the code
    /// state and the validated window.
    pub fn clear_reset_state(&mut self) {
        self.clear_code(OtpPurpose::Reset);
        self.clear_validated_window();
    }
}

/// Storage seam for account security records.
///
/// `save` is a compare-and-swap: the write only lands if the stored
/// version still matches `record.version`, and bumps both the stored
/// and in-memory stamp on success. A lost race surfaces as
/// [`crate::OtpError::Storage`] so concurrent issuance cannot
/// under-count the throttle.
#[allow(async_fn_in_trait)]
pub trait AccountStore {
    /// Insert a new record; fails if the email is already present.
    async fn create(&self, record: &AccountRecord) -> Result<()>;

    /// Look up a record by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>>;

    /// Persist a record under the version check described above.
    async fn save(&self, record: &mut AccountRecord) -> Result<()>;
}
