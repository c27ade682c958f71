//! OTP lifecycle engine.
//!
//! Orchestrates issuance, verification and invalidation of one-time
//! codes for signup verification and password reset, plus the
//! validated window that authorizes the actual password write.
//!
//! Per purpose, a code moves `NoCode -> Issued -> {verified | expired |
//! attempts exhausted}`; every terminal outcome clears the code state,
//! and a verified reset additionally opens the validated window.

use chrono::Utc;
use tracing::{info, warn};

use crate::attempts::AttemptGuard;
use crate::code::generate_code;
use crate::config::EngineConfig;
use crate::hash::{hash_code, verify_code};
use crate::notify::{
    Notification, NotificationSender, TEMPLATE_INFO, TEMPLATE_RESET_PASSWORD,
    TEMPLATE_SIGNUP_CONFIRMATION,
};
use crate::store::{normalize_email, AccountRecord, AccountStore, OtpPurpose};
use crate::throttle::RequestThrottle;
use crate::{OtpError, Result};

/// The OTP engine, generic over its storage and delivery backends.
pub struct OtpEngine<S, N> {
    store: S,
    sender: N,
    config: EngineConfig,
    throttle: RequestThrottle,
    guard: AttemptGuard,
}

impl<S, N> OtpEngine<S, N> {
    /// The underlying account store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl<S: AccountStore, N: NotificationSender> OtpEngine<S, N> {
    /// Construct an engine.
    ///
    /// The configuration is validated eagerly; a missing sender
    /// identity fails here rather than on the first send.
    pub fn new(store: S, sender: N, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let throttle = RequestThrottle::from_config(&config.otp);
        let guard = AttemptGuard::from_config(&config.otp);
        Ok(Self {
            store,
            sender,
            config,
            throttle,
            guard,
        })
    }

    /// Issue a signup verification code and send it to the account's
    /// email.
    pub async fn issue_signup_otp(&self, email: &str) -> Result<()> {
        self.issue(email, OtpPurpose::Signup, None).await
    }

    /// Issue a password reset code and send it to the account's email.
    pub async fn issue_reset_otp(&self, email: &str) -> Result<()> {
        self.issue(email, OtpPurpose::Reset, None).await
    }

    /// Issue with a caller-supplied code instead of a generated one.
    ///
    /// Deterministic-test hook. Refused unless `otp.allow_code_override`
    /// is enabled in configuration; the supplied code is hashed and
    /// stored exactly like a generated one.
    pub async fn issue_with_code(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<()> {
        if !self.config.otp.allow_code_override {
            return Err(OtpError::OverrideDisabled);
        }
        self.issue(email, purpose, Some(code.to_string())).await
    }

    async fn issue(
        &self,
        email: &str,
        purpose: OtpPurpose,
        override_code: Option<String>,
    ) -> Result<()> {
        let email = normalize_email(email);
        let mut record = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(OtpError::NotFound)?;
        let now = Utc::now();

        // Denied requests must not touch the counter or send anything.
        self.throttle.check(&record, now)?;

        let code = override_code.unwrap_or_else(generate_code);
        let hash = spawn_hash(code.clone()).await?;

        let expiry = match purpose {
            OtpPurpose::Signup => self.config.otp.signup_expiry(),
            OtpPurpose::Reset => self.config.otp.reset_expiry(),
        };
        record.set_code(purpose, hash, now + expiry);
        self.throttle.record_issue(&mut record, now);
        self.store.save(&mut record).await?;

        info!(
            email = %email,
            purpose = %purpose,
            requests_in_window = record.otp_request_count,
            "One-time code issued"
        );

        let (subject, template) = match purpose {
            OtpPurpose::Signup => ("Confirm your email address", TEMPLATE_SIGNUP_CONFIRMATION),
            OtpPurpose::Reset => ("Reset your password", TEMPLATE_RESET_PASSWORD),
        };
        let notification = Notification::new(&email, subject, template, self.config.sender.mailbox())
            .with_context("code", code);

        // State is already persisted; a delivery failure leaves the
        // code valid and is reported as its own kind.
        if let Err(e) = self.sender.send(&notification).await {
            warn!(email = %email, purpose = %purpose, error = %e, "Notification send failed");
            return Err(OtpError::SendFailure(e.to_string()));
        }

        Ok(())
    }

    /// Verify a signup code; marks the account verified on success.
    pub async fn verify_signup_otp(&self, email: &str, code: &str) -> Result<()> {
        let mut record = self.verify(email, OtpPurpose::Signup, code).await?;

        record.is_verified = true;
        self.store.save(&mut record).await?;

        info!(email = %record.email, "Account email verified");
        Ok(())
    }

    /// Verify a reset code; opens the validated window on success and
    /// returns the updated record.
    pub async fn verify_reset_otp(&self, email: &str, code: &str) -> Result<AccountRecord> {
        let mut record = self.verify(email, OtpPurpose::Reset, code).await?;

        let now = Utc::now();
        record.open_validated_window(now, self.config.otp.validated_window());
        self.store.save(&mut record).await?;

        info!(email = %record.email, "Password reset validated");
        Ok(record)
    }

    /// Shared verification path. On success the code state is cleared
    /// but the record is NOT yet saved; the caller applies its
    /// purpose-specific success mutation and persists once.
    async fn verify(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<AccountRecord> {
        let email = normalize_email(email);
        let mut record = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(OtpError::NotFound)?;
        let now = Utc::now();

        // Hash and expiry are set together, so either field works as
        // the "is a code issued" probe. Once a prior call cleared the
        // code (expiry or exhaustion), this is the error later calls
        // keep getting.
        let (Some(hash), Some(expires_at)) = (
            record.code_hash(purpose).map(str::to_string),
            record.code_expires_at(purpose),
        ) else {
            return Err(OtpError::NoActiveCode);
        };

        if now >= expires_at {
            record.clear_code(purpose);
            self.store.save(&mut record).await?;
            info!(email = %email, purpose = %purpose, "Expired code cleared");
            return Err(OtpError::Expired);
        }

        // Exhaustion check runs before the hash comparison.
        if let Err(e) = self.guard.check(record.attempts(purpose)) {
            record.clear_code(purpose);
            self.store.save(&mut record).await?;
            warn!(email = %email, purpose = %purpose, "Attempt limit hit, code invalidated");
            return Err(e);
        }

        let matched = spawn_verify(code.to_string(), hash).await?;

        if !matched {
            let attempts = record.record_failed_attempt(purpose);
            self.store.save(&mut record).await?;
            warn!(
                email = %email,
                purpose = %purpose,
                attempts,
                remaining = self.guard.remaining(attempts),
                "Code mismatch"
            );
            return Err(OtpError::InvalidCode);
        }

        record.clear_code(purpose);
        Ok(record)
    }

    /// Set a new password inside the validated-reset window.
    ///
    /// The value is written as given; hashing the login credential is
    /// the embedding application's policy. Success clears every
    /// reset-related field.
    pub async fn update_password(&self, email: &str, new_password: &str) -> Result<()> {
        let email = normalize_email(email);
        let mut record = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(OtpError::NotFound)?;
        let now = Utc::now();

        let (Some(_), Some(window_ends)) =
            (record.reset_validated_at, record.reset_validated_expires_at)
        else {
            return Err(OtpError::NotValidated);
        };

        if now >= window_ends {
            // Stale authorization is cleaned up even though the call
            // fails.
            record.clear_validated_window();
            self.store.save(&mut record).await?;
            info!(email = %email, "Lapsed reset validation cleared");
            return Err(OtpError::ValidationExpired);
        }

        record.password = Some(new_password.to_string());
        record.clear_reset_state();
        self.store.save(&mut record).await?;

        info!(email = %email, "Password updated");
        Ok(())
    }

    /// Send an arbitrary template to an address. No OTP state involved.
    pub async fn send_custom_template(&self, email: &str, template: &str) -> Result<()> {
        let email = normalize_email(email);
        let notification =
            Notification::new(&email, template, template, self.config.sender.mailbox());

        self.sender
            .send(&notification)
            .await
            .map_err(|e| OtpError::SendFailure(e.to_string()))
    }

    /// Send an informational message to an address. No OTP state
    /// involved.
    pub async fn send_info(&self, email: &str, title: &str, message: &str) -> Result<()> {
        let email = normalize_email(email);
        let notification =
            Notification::new(&email, title, TEMPLATE_INFO, self.config.sender.mailbox())
                .with_context("title", title)
                .with_context("message", message);

        self.sender
            .send(&notification)
            .await
            .map_err(|e| OtpError::SendFailure(e.to_string()))
    }
}

/// Run Argon2 hashing off the async worker threads.
async fn spawn_hash(code: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_code(&code))
        .await
        .map_err(|e| OtpError::Hash(e.to_string()))?
}

/// Run Argon2 verification off the async worker threads.
async fn spawn_verify(code: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_code(&code, &hash))
        .await
        .map_err(|e| OtpError::Hash(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SenderConfig;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Sender that records every notification instead of delivering.
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<Notification>>,
        fail: AtomicBool,
    }

    impl RecordingSender {
        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        fn last(&self) -> Option<Notification> {
            self.sent.lock().unwrap().last().cloned()
        }
    }

    impl NotificationSender for &RecordingSender {
        async fn send(
            &self,
            notification: &Notification,
        ) -> std::result::Result<(), crate::notify::SendError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(crate::notify::SendError("delivery refused".to_string()));
            }
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig {
            sender: SenderConfig::new("Internly", "no-reply@internly.example"),
            ..Default::default()
        };
        config.otp.allow_code_override = true;
        config
    }

    async fn engine_with_account<'a>(
        sender: &'a RecordingSender,
        email: &str,
    ) -> OtpEngine<MemoryStore, &'a RecordingSender> {
        let store = MemoryStore::new();
        store.create(&AccountRecord::new(email)).await.unwrap();
        OtpEngine::new(store, sender, test_config()).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let sender = RecordingSender::default();
        let result = OtpEngine::new(MemoryStore::new(), &sender, EngineConfig::default());
        assert!(matches!(result, Err(OtpError::Config(_))));
    }

    #[tokio::test]
    async fn test_issue_unknown_account() {
        let sender = RecordingSender::default();
        let engine = engine_with_account(&sender, "user@example.com").await;

        let result = engine.issue_signup_otp("nobody@example.com").await;
        assert!(matches!(result, Err(OtpError::NotFound)));
        assert_eq!(sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_issue_stores_hash_not_plaintext() {
        let sender = RecordingSender::default();
        let engine = engine_with_account(&sender, "user@example.com").await;

        engine
            .issue_with_code("user@example.com", OtpPurpose::Signup, "042199")
            .await
            .unwrap();

        let record = engine
            .store()
            .find_by_email("user@example.com")
            .await
            .unwrap()
            .unwrap();
        let hash = record.code_hash(OtpPurpose::Signup).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("042199"));
        assert_eq!(record.attempts(OtpPurpose::Signup), 0);
        assert_eq!(record.otp_request_count, 1);

        // The plaintext only travels in the notification context
        let notification = sender.last().unwrap();
        assert_eq!(notification.template, TEMPLATE_SIGNUP_CONFIRMATION);
        assert_eq!(
            notification.context.get("code"),
            Some(&serde_json::Value::from("042199"))
        );
        assert_eq!(notification.from, "Internly <no-reply@internly.example>");
    }

    #[tokio::test]
    async fn test_issue_override_disabled() {
        let sender = RecordingSender::default();
        let store = MemoryStore::new();
        store
            .create(&AccountRecord::new("user@example.com"))
            .await
            .unwrap();

        let mut config = test_config();
        config.otp.allow_code_override = false;
        let engine = OtpEngine::new(store, &sender, config).unwrap();

        let result = engine
            .issue_with_code("user@example.com", OtpPurpose::Reset, "123456")
            .await;
        assert!(matches!(result, Err(OtpError::OverrideDisabled)));
        assert_eq!(sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_issue_send_failure_keeps_state() {
        let sender = RecordingSender::default();
        let engine = engine_with_account(&sender, "user@example.com").await;

        sender.fail.store(true, Ordering::SeqCst);
        let result = engine.issue_signup_otp("user@example.com").await;
        assert!(matches!(result, Err(OtpError::SendFailure(_))));

        // Code and counter were persisted before the send
        let record = engine
            .store()
            .find_by_email("user@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(record.code_hash(OtpPurpose::Signup).is_some());
        assert_eq!(record.otp_request_count, 1);
    }

    #[tokio::test]
    async fn test_verify_no_active_code() {
        let sender = RecordingSender::default();
        let engine = engine_with_account(&sender, "user@example.com").await;

        let result = engine.verify_signup_otp("user@example.com", "123456").await;
        assert!(matches!(result, Err(OtpError::NoActiveCode)));
    }

    #[tokio::test]
    async fn test_verify_wrong_then_right() {
        let sender = RecordingSender::default();
        let engine = engine_with_account(&sender, "user@example.com").await;

        engine
            .issue_with_code("user@example.com", OtpPurpose::Signup, "042199")
            .await
            .unwrap();

        let result = engine.verify_signup_otp("user@example.com", "999999").await;
        assert!(matches!(result, Err(OtpError::InvalidCode)));

        let record = engine
            .store()
            .find_by_email("user@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.attempts(OtpPurpose::Signup), 1);

        engine
            .verify_signup_otp("User@Example.com", "042199")
            .await
            .unwrap();

        let record = engine
            .store()
            .find_by_email("user@example.com")
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_verified);
        assert!(record.code_hash(OtpPurpose::Signup).is_none());
        assert!(record.code_expires_at(OtpPurpose::Signup).is_none());
        assert_eq!(record.attempts(OtpPurpose::Signup), 0);
    }

    #[tokio::test]
    async fn test_send_info_pass_through() {
        let sender = RecordingSender::default();
        let engine = engine_with_account(&sender, "user@example.com").await;

        engine
            .send_info("User@Example.com", "Welcome", "Your application was received")
            .await
            .unwrap();

        let notification = sender.last().unwrap();
        assert_eq!(notification.to, "user@example.com");
        assert_eq!(notification.template, TEMPLATE_INFO);
        assert_eq!(notification.subject, "Welcome");
        assert_eq!(
            notification.context.get("message"),
            Some(&serde_json::Value::from("Your application was received"))
        );
    }

    #[tokio::test]
    async fn test_send_custom_template_pass_through() {
        let sender = RecordingSender::default();
        let engine = engine_with_account(&sender, "user@example.com").await;

        engine
            .send_custom_template("user@example.com", "application-accepted")
            .await
            .unwrap();

        let notification = sender.last().unwrap();
        assert_eq!(notification.template, "application-accepted");

        sender.fail.store(true, Ordering::SeqCst);
        let result = engine
            .send_custom_template("user@example.com", "application-accepted")
            .await;
        assert!(matches!(result, Err(OtpError::SendFailure(_))));
    }
}
