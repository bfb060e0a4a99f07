// Модели данных для хранилища

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Ключевая пара устройства в том виде, в котором ее сохраняет хранилище
#[derive(Clone)]
pub struct StoredIdentity {
    pub public_key: Vec<u8>,
    pub private_key: Zeroizing<Vec<u8>>,
    pub created_at: i64,
}

impl std::fmt::Debug for StoredIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredIdentity")
            .field("public_key", &crate::utils::b64::encode(&self.public_key))
            .field(
                "private_key",
                &crate::utils::logging::RedactedBytes(&self.private_key),
            )
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Формат файла identity на диске (приватный ключ ЗАШИФРОВАН!)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedIdentityFile {
    pub version: u32,
    /// Base64 публичного ключа (не шифруется)
    pub public_key: String,
    /// Base64 соли PBKDF2
    pub salt: String,
    /// Base64 (nonce || AES-256-GCM ciphertext) приватного ключа
    pub sealed_private_key: String,
    pub created_at: i64,
}
