//! One-time code generation.
//!
//! Codes are 6-digit zero-padded decimal strings drawn uniformly from
//! a cryptographically secure source.

use rand_core::{OsRng, RngCore};

/// Number of digits in a generated code.
pub const CODE_LENGTH: usize = 6;

/// Size of the code space (10^CODE_LENGTH).
const CODE_SPACE: u32 = 1_000_000;

// Largest multiple of CODE_SPACE that fits in a u32; draws at or above
// this are rejected to keep the distribution uniform.
const REJECTION_BOUND: u32 = (u32::MAX / CODE_SPACE) * CODE_SPACE;

/// Generate a fresh 6-digit code.
///
/// Leading zeros are preserved: the value 42 becomes `"000042"`.
///
/// # Examples
///
/// ```
/// use otpgate::generate_code;
///
/// let code = generate_code();
/// assert_eq!(code.len(), 6);
/// assert!(code.chars().all(|c| c.is_ascii_digit()));
/// ```
pub fn generate_code() -> String {
    loop {
        let draw = OsRng.next_u32();
        if draw < REJECTION_BOUND {
            return format!("{:06}", draw % CODE_SPACE);
        }
    }
}
