//! Brute-force protection for issued codes.
//!
//! Each issued code tolerates a fixed number of failed guesses; once
//! the counter reaches the limit the code is invalidated and the caller
//! sees `TooManyAttempts` instead of `InvalidCode`.

use crate::config::OtpConfig;
use crate::{OtpError, Result};

/// Policy limiting guesses against a single issued code.
#[derive(Debug, Clone, Copy)]
pub struct AttemptGuard {
    max_attempts: i64,
}

impl AttemptGuard {
    /// Create a guard with an explicit limit.
    pub fn new(max_attempts: i64) -> Self {
        Self { max_attempts }
    }

    /// Build the guard from engine configuration.
    pub fn from_config(config: &OtpConfig) -> Self {
        Self::new(config.max_attempts)
    }

    /// Check whether another guess is allowed for the given counter.
    ///
    /// Runs before the hash comparison on every verification, so a code
    /// whose counter is exhausted is never actually compared.
    pub fn check(&self, attempts: i64) -> Result<()> {
        if attempts >= self.max_attempts {
            return Err(OtpError::TooManyAttempts);
        }
        Ok(())
    }

    /// Remaining guesses before the counter is exhausted.
    pub fn remaining(&self, attempts: i64) -> i64 {
        (self.max_attempts - attempts).max(0)
    }
}
