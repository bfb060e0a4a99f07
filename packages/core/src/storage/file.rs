// Файловое хранилище identity: приватный ключ запечатан PBKDF2 + AES-256-GCM

use crate::crypto::master_key;
use crate::storage::models::{SealedIdentityFile, StoredIdentity};
use crate::storage::SecureStorage;
use crate::utils::b64;
use crate::utils::error::{MessengerError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::Zeroizing;

const FILE_FORMAT_VERSION: u32 = 1;

pub struct FileStorage {
    path: PathBuf,
    passphrase: Zeroizing<String>,
    pbkdf2_iterations: u32,
}

impl FileStorage {
    /// `passphrase` - секрет устройства из системного keychain
    pub fn new(path: impl Into<PathBuf>, passphrase: impl Into<String>, pbkdf2_iterations: u32) -> Self {
        Self {
            path: path.into(),
            passphrase: Zeroizing::new(passphrase.into()),
            pbkdf2_iterations,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PBKDF2 - CPU-bound, уводим с async потока
    async fn derive_key(&self, salt: Vec<u8>) -> Result<Zeroizing<[u8; 32]>> {
        let passphrase = self.passphrase.clone();
        let iterations = self.pbkdf2_iterations;
        tokio::task::spawn_blocking(move || {
            master_key::derive_master_key(&passphrase, &salt, iterations)
        })
        .await
        .map_err(|e| MessengerError::Internal(format!("Key derivation task failed: {}", e)))?
    }
}

fn persistence<E: std::fmt::Display>(context: &str) -> impl FnOnce(E) -> MessengerError + '_ {
    move |e| MessengerError::Persistence(format!("{}: {}", context, e))
}

#[async_trait]
impl SecureStorage for FileStorage {
    async fn load_identity(&self) -> Result<Option<StoredIdentity>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(persistence("Failed to read identity file")(e)),
        };

        let file: SealedIdentityFile =
            serde_json::from_slice(&raw).map_err(persistence("Corrupt identity file"))?;
        if file.version != FILE_FORMAT_VERSION {
            return Err(MessengerError::Persistence(format!(
                "Unsupported identity file version {}",
                file.version
            )));
        }

        let salt = b64::decode(&file.salt).map_err(persistence("Corrupt salt"))?;
        let sealed = b64::decode(&file.sealed_private_key).map_err(persistence("Corrupt sealed key"))?;
        let public_key = b64::decode(&file.public_key).map_err(persistence("Corrupt public key"))?;

        let key = self.derive_key(salt).await?;
        let private_key = master_key::open(&key, &sealed)?;

        debug!(target: "storage::file", path = %self.path.display(), "Identity loaded");

        Ok(Some(StoredIdentity {
            public_key,
            private_key,
            created_at: file.created_at,
        }))
    }

    async fn save_identity(&self, identity: &StoredIdentity) -> Result<()> {
        let salt = master_key::generate_salt();
        let key = self.derive_key(salt.to_vec()).await?;
        let sealed = master_key::seal(&key, &identity.private_key)?;

        let file = SealedIdentityFile {
            version: FILE_FORMAT_VERSION,
            public_key: b64::encode(&identity.public_key),
            salt: b64::encode(&salt),
            sealed_private_key: b64::encode(&sealed),
            created_at: identity.created_at,
        };
        let json = serde_json::to_vec_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(persistence("Failed to create identity directory"))?;
            }
        }

        // Пишем во временный файл и переименовываем, чтобы не оставить половину файла
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(persistence("Failed to write identity file"))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(persistence("Failed to replace identity file"))?;

        debug!(target: "storage::file", path = %self.path.display(), "Identity saved");
        Ok(())
    }

    async fn delete_identity(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(persistence("Failed to delete identity file")(e)),
        }
    }
}
