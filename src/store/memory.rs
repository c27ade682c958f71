//! In-memory account store.
//!
//! Backs the engine in tests and in single-process embeddings where no
//! database is wanted. Honors the same versioned-save contract as the
//! SQLite store.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{normalize_email, AccountRecord, AccountStore};
use crate::{OtpError, Result};

/// Account store backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, AccountRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}

impl AccountStore for MemoryStore {
    async fn create(&self, record: &AccountRecord) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let key = normalize_email(&record.email);
        if records.contains_key(&key) {
            return Err(OtpError::Storage(format!("account already exists: {key}")));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<AccountRecord>> {
        let records = self.records.read().unwrap();
        Ok(records.get(&normalize_email(email)).cloned())
    }

    async fn save(&self, record: &mut AccountRecord) -> Result<()> {
        let mut records = self.records.write().unwrap();
        let key = normalize_email(&record.email);

        let stored = records
            .get_mut(&key)
            .ok_or_else(|| OtpError::Storage(format!("account missing on save: {key}")))?;

        if stored.version != record.version {
            return Err(OtpError::Storage(format!(
                "version conflict for {key}: stored {} vs {}",
                stored.version, record.version
            )));
        }

        record.version += 1;
        *stored = record.clone();
        Ok(())
    }
}
