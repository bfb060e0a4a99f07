// Управление ключами
// Identity устройства, escrow ключ платформы и кеш публичных ключей собеседников

use crate::api::trust::EscrowKeySource;
use crate::crypto::{CryptoProvider, PUBLIC_KEY_LENGTH};
use crate::storage::{SecureStorage, StoredIdentity};
use crate::utils::b64;
use crate::utils::error::{MessengerError, Result};
use crate::utils::logging::RedactedBytes;
use crate::utils::time::current_timestamp;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Метка, из которой выводится запасной escrow ключ
const FALLBACK_ESCROW_LABEL: &[u8] = b"courier-escrow-fallback-v1";

/// Насколько можно доверять escrow ключу
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    /// Escrow ключ еще не получен
    Unresolved,
    /// Ключ получен от trust endpoint
    Verified,
    /// Endpoint недоступен, используется детерминированный запасной ключ.
    /// Его приватная часть выводима из публичной метки, так что слот
    /// `forAdmin` в таком режиме не секретен.
    Degraded,
}

/// Ключевая пара устройства
struct DeviceIdentity<P: CryptoProvider> {
    private_key: P::KemPrivateKey,
    public_key: P::KemPublicKey,
}

struct KeyState<P: CryptoProvider> {
    identity: Option<DeviceIdentity<P>>,
    escrow_key: Option<P::KemPublicKey>,
    trust: TrustLevel,
}

impl<P: CryptoProvider> Default for KeyState<P> {
    fn default() -> Self {
        Self {
            identity: None,
            escrow_key: None,
            trust: TrustLevel::Unresolved,
        }
    }
}

/// Ключи, нужные для запечатывания сообщения
pub(crate) struct SealingKeys<P: CryptoProvider> {
    pub own_public: P::KemPublicKey,
    pub escrow_public: P::KemPublicKey,
}

/// Менеджер криптографических ключей (Identity & Key Store)
pub struct KeyManager<P: CryptoProvider> {
    storage: Arc<dyn SecureStorage>,
    escrow_source: Arc<dyn EscrowKeySource>,

    /// Сериализует initialize()/clear_keys(): второй вызов ждет первый
    lifecycle: tokio::sync::Mutex<()>,

    state: RwLock<KeyState<P>>,

    /// peerId -> Base64 публичного ключа. Только кеш, не подтвержденная identity.
    peer_keys: RwLock<HashMap<String, String>>,
}

impl<P: CryptoProvider> KeyManager<P> {
    pub fn new(storage: Arc<dyn SecureStorage>, escrow_source: Arc<dyn EscrowKeySource>) -> Self {
        Self {
            storage,
            escrow_source,
            lifecycle: tokio::sync::Mutex::new(()),
            state: RwLock::new(KeyState::default()),
            peer_keys: RwLock::new(HashMap::new()),
        }
    }

    /// Загрузить или создать identity устройства, затем получить escrow ключ.
    ///
    /// Параллельные вызовы безопасны: второй ждет завершения первого и
    /// не генерирует конкурирующую identity. Ошибки хранилища пробрасываются.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        if self.is_ready() {
            debug!(target: "crypto::keys", "Key store already initialized");
            return Ok(());
        }

        if !self.has_identity() {
            let identity = self.load_or_generate_identity().await?;
            self.write_state().identity = Some(identity);
        }

        let (escrow_key, trust) = self.resolve_escrow_key().await?;
        {
            let mut state = self.write_state();
            state.escrow_key = Some(escrow_key);
            state.trust = trust;
        }

        info!(target: "crypto::keys", trust = ?trust, "Key store ready");
        Ok(())
    }

    async fn load_or_generate_identity(&self) -> Result<DeviceIdentity<P>> {
        if let Some(stored) = self.storage.load_identity().await? {
            let private_key = P::kem_private_key_from_bytes(stored.private_key.to_vec());
            let public_key = P::from_private_key_to_public_key(&private_key)?;
            if public_key.as_ref() != stored.public_key.as_slice() {
                return Err(MessengerError::Persistence(
                    "Stored public key does not match private key".to_string(),
                ));
            }
            debug!(target: "crypto::keys", "Loaded persisted device identity");
            return Ok(DeviceIdentity {
                private_key,
                public_key,
            });
        }

        let (private_key, public_key) = P::generate_kem_keys()?;
        let stored = StoredIdentity {
            public_key: public_key.as_ref().to_vec(),
            private_key: zeroize::Zeroizing::new(private_key.as_ref().to_vec()),
            created_at: current_timestamp(),
        };
        self.storage.save_identity(&stored).await?;

        info!(
            target: "crypto::keys",
            private_key = %RedactedBytes(private_key.as_ref()),
            "Generated new device identity"
        );
        Ok(DeviceIdentity {
            private_key,
            public_key,
        })
    }

    async fn resolve_escrow_key(&self) -> Result<(P::KemPublicKey, TrustLevel)> {
        let fetched = self
            .escrow_source
            .fetch_escrow_key()
            .await
            .and_then(|encoded| {
                b64::decode_array::<PUBLIC_KEY_LENGTH>(&encoded).map_err(|e| {
                    MessengerError::Validation(format!("Malformed escrow key: {}", e))
                })
            });

        match fetched {
            Ok(bytes) => Ok((P::kem_public_key_from_bytes(bytes.to_vec()), TrustLevel::Verified)),
            Err(e) => {
                warn!(
                    target: "crypto::keys",
                    error = %e,
                    "Escrow key fetch failed, using fallback key (reduced trust)"
                );
                Ok((fallback_escrow_key::<P>()?, TrustLevel::Degraded))
            }
        }
    }

    /// Base64 публичного ключа устройства
    pub fn public_key(&self) -> Option<String> {
        self.read_state()
            .identity
            .as_ref()
            .map(|identity| b64::encode(identity.public_key.as_ref()))
    }

    /// Готов только когда есть и ключевая пара, и escrow ключ
    pub fn is_ready(&self) -> bool {
        let state = self.read_state();
        state.identity.is_some() && state.escrow_key.is_some()
    }

    pub fn trust_level(&self) -> TrustLevel {
        self.read_state().trust
    }

    pub fn escrow_public_key(&self) -> Option<String> {
        self.read_state()
            .escrow_key
            .as_ref()
            .map(|key| b64::encode(key.as_ref()))
    }

    pub fn cache_public_key(&self, peer_id: &str, public_key: &str) {
        self.peer_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer_id.to_string(), public_key.to_string());
    }

    pub fn cached_public_key(&self, peer_id: &str) -> Option<String> {
        self.peer_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(peer_id)
            .cloned()
    }

    /// Стереть identity из хранилища и памяти (logout)
    pub async fn clear_keys(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        // Память чистим первой: даже если хранилище упадет, ключи не останутся доступны
        *self.write_state() = KeyState::default();
        self.peer_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        self.storage.delete_identity().await?;
        info!(target: "crypto::keys", "Device identity cleared");
        Ok(())
    }

    pub(crate) fn private_key(&self) -> Option<P::KemPrivateKey> {
        self.read_state()
            .identity
            .as_ref()
            .map(|identity| identity.private_key.clone())
    }

    pub(crate) fn sealing_keys(&self) -> Option<SealingKeys<P>> {
        let state = self.read_state();
        match (&state.identity, &state.escrow_key) {
            (Some(identity), Some(escrow)) => Some(SealingKeys {
                own_public: identity.public_key.clone(),
                escrow_public: escrow.clone(),
            }),
            _ => None,
        }
    }

    fn has_identity(&self) -> bool {
        self.read_state().identity.is_some()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, KeyState<P>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, KeyState<P>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Детерминированный запасной escrow ключ (когда trust endpoint недоступен)
pub fn fallback_escrow_key<P: CryptoProvider>() -> Result<P::KemPublicKey> {
    let seed = Sha256::digest(FALLBACK_ESCROW_LABEL);
    let private_key = P::kem_private_key_from_bytes(seed.to_vec());
    Ok(P::from_private_key_to_public_key(&private_key)?)
}
