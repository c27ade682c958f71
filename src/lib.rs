//! otpgate - One-time-passcode engine.
//!
//! Issues and verifies short-lived 6-digit codes for account-email
//! verification and password reset, and gates the two-phase
//! password-reset protocol built on top of them.

pub mod attempts;
pub mod code;
pub mod config;
pub mod engine;
pub mod error;
pub mod hash;
pub mod logging;
pub mod notify;
pub mod store;
pub mod throttle;

pub use attempts::AttemptGuard;
pub use code::{generate_code, CODE_LENGTH};
pub use config::{EngineConfig, LoggingConfig, OtpConfig, SenderConfig};
pub use engine::OtpEngine;
pub use error::{OtpError, Result};
pub use hash::{hash_code, verify_code};
pub use notify::{
    Notification, NotificationSender, SendError, TEMPLATE_INFO, TEMPLATE_RESET_PASSWORD,
    TEMPLATE_SIGNUP_CONFIRMATION,
};
pub use store::{
    normalize_email, AccountRecord, AccountStore, Database, MemoryStore, OtpPurpose,
    SqlAccountStore,
};
pub use throttle::RequestThrottle;
