// In-memory хранилище для тестов и эфемерных сессий

use crate::storage::models::StoredIdentity;
use crate::storage::SecureStorage;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};

/// In-memory хранилище
#[derive(Default)]
pub struct MemoryStorage {
    identity: Mutex<Option<StoredIdentity>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Есть ли сохраненная identity (для тестов)
    pub fn has_identity(&self) -> bool {
        self.identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait]
impl SecureStorage for MemoryStorage {
    async fn load_identity(&self) -> Result<Option<StoredIdentity>> {
        Ok(self
            .identity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn save_identity(&self, identity: &StoredIdentity) -> Result<()> {
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner) = Some(identity.clone());
        Ok(())
    }

    async fn delete_identity(&self) -> Result<()> {
        *self.identity.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
