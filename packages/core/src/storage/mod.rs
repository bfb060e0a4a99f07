// Модуль хранилища identity устройства

pub mod file;
pub mod memory;
pub mod models;

use crate::utils::error::Result;
use async_trait::async_trait;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use models::StoredIdentity;

/// Защищенное хранилище ключевого материала устройства.
///
/// Любая ошибка чтения/записи возвращается как `MessengerError::Persistence`.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    async fn load_identity(&self) -> Result<Option<StoredIdentity>>;
    async fn save_identity(&self, identity: &StoredIdentity) -> Result<()>;
    async fn delete_identity(&self) -> Result<()>;
}
