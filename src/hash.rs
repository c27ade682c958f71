//! Code hashing and verification.
//!
//! Issued codes are stored only as Argon2id hashes. Verification goes
//! through the library's `PasswordVerifier`, which compares digests in
//! constant time; the plaintext code never touches storage.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use rand_core::OsRng;

use crate::{OtpError, Result};

/// Create the Argon2 hasher used for one-time codes.
///
/// Codes live for minutes and issuance is interactive, so this uses the
/// RFC 9106 low-memory profile rather than a full password-grade cost:
/// - Memory cost: 19 MiB (19456 KiB)
/// - Time cost: 2 iterations
/// - Parallelism: 1 thread
fn create_argon2() -> Argon2<'static> {
    let m_cost = 19456;
    let t_cost = 2;
    let p_cost = 1;

    let params = Params::new(m_cost, t_cost, p_cost, None).expect("valid Argon2 params");
    Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
}

/// Hash a one-time code.
///
/// Returns a PHC-formatted hash string that includes the salt and
/// parameters. The salt is freshly generated, so hashing the same code
/// twice produces different strings.
pub fn hash_code(code: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = create_argon2();
    let hash = argon2
        .hash_password(code.as_bytes(), &salt)
        .map_err(|e| OtpError::Hash(e.to_string()))?;

    Ok(hash.to_string())
}

/// Verify a plaintext code against a stored hash.
///
/// Returns `Ok(true)` on a match and `Ok(false)` on a mismatch. A hash
/// that cannot be parsed is an error, not a mismatch, since it means
/// stored state is corrupt.
pub fn verify_code(code: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| OtpError::Hash("invalid code hash format".to_string()))?;

    // Parameters come from the parsed hash, not from create_argon2()
    match Argon2::default().verify_password(code.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(OtpError::Hash(e.to_string())),
    }
}
