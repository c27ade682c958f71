//! Test helpers for the engine integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use otpgate::{
    AccountRecord, AccountStore, EngineConfig, MemoryStore, Notification, NotificationSender,
    OtpEngine, SendError, SenderConfig,
};

/// Sender that records every notification instead of delivering it,
/// and can be switched into a failing mode.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<Notification>>,
    fail: AtomicBool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of notifications accepted so far.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// The most recently accepted notification.
    pub fn last(&self) -> Option<Notification> {
        self.sent.lock().unwrap().last().cloned()
    }

    /// Make subsequent sends fail.
    #[allow(dead_code)]
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

impl NotificationSender for &RecordingSender {
    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError("delivery refused".to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Engine configuration for tests: valid sender identity, code
/// overrides enabled for determinism.
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig {
        sender: SenderConfig::new("Internly", "no-reply@internly.example"),
        ..Default::default()
    };
    config.otp.allow_code_override = true;
    config
}

/// Build an engine over an in-memory store seeded with one account.
pub async fn engine_with_account<'a>(
    sender: &'a RecordingSender,
    email: &str,
) -> OtpEngine<MemoryStore, &'a RecordingSender> {
    let store = MemoryStore::new();
    store.create(&AccountRecord::new(email)).await.unwrap();
    OtpEngine::new(store, sender, test_config()).unwrap()
}

/// Load an account record straight from the engine's store.
pub async fn load_record<S: AccountStore, N>(engine: &OtpEngine<S, N>, email: &str) -> AccountRecord {
    engine
        .store()
        .find_by_email(email)
        .await
        .unwrap()
        .expect("account should exist")
}

/// Mutate a stored record in place (used to backdate timestamps).
pub async fn update_record<S: AccountStore, N>(
    engine: &OtpEngine<S, N>,
    email: &str,
    mutate: impl FnOnce(&mut AccountRecord),
) {
    let mut record = load_record(engine, email).await;
    mutate(&mut record);
    engine.store().save(&mut record).await.unwrap();
}
