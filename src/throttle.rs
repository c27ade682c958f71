//! Issuance throttling.
//!
//! A lazy sliding window over the record's request counter: the count
//! logically resets once the window has fully elapsed since the anchor
//! timestamp, but storage is only touched when the next issuance lands.
//! The window is shared across signup and reset codes.

use chrono::{DateTime, Duration, Utc};

use crate::config::OtpConfig;
use crate::store::AccountRecord;
use crate::{OtpError, Result};

/// Policy limiting how often an account may request a new code.
#[derive(Debug, Clone, Copy)]
pub struct RequestThrottle {
    /// Maximum issuances per window.
    max_requests: i64,
    /// Window length.
    window: Duration,
}

impl RequestThrottle {
    /// Create a throttle with explicit limits.
    pub fn new(max_requests: i64, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Build the throttle from engine configuration.
    pub fn from_config(config: &OtpConfig) -> Self {
        Self::new(config.max_requests_per_window, config.request_window())
    }

    /// The request count that applies right now.
    ///
    /// Zero when no request was ever recorded, or when `now` is more
    /// than a full window past the anchor.
    pub fn effective_count(&self, record: &AccountRecord, now: DateTime<Utc>) -> i64 {
        match record.last_otp_request_at {
            Some(anchor) if now <= anchor + self.window => record.otp_request_count,
            _ => 0,
        }
    }

    /// Check whether another issuance is allowed.
    ///
    /// Does not mutate the record; call [`record_issue`](Self::record_issue)
    /// once the issuance actually happens.
    pub fn check(&self, record: &AccountRecord, now: DateTime<Utc>) -> Result<()> {
        if self.effective_count(record, now) >= self.max_requests {
            return Err(OtpError::RateLimited);
        }
        Ok(())
    }

    /// Count an issuance: bumps the effective count and re-anchors the
    /// window at `now`.
    pub fn record_issue(&self, record: &mut AccountRecord, now: DateTime<Utc>) {
        record.otp_request_count = self.effective_count(record, now) + 1;
        record.last_otp_request_at = Some(now);
    }
}
