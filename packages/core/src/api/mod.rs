// Публичный API для мессенджера
// Контекстный объект: создается один раз при старте сессии, очищается при logout

pub mod messaging;
pub mod trust;

use crate::config::Config;
use crate::crypto::keys::{KeyManager, TrustLevel};
use crate::crypto::{ClassicSuiteProvider, CryptoProvider, MessageCipher};
use crate::protocol::messages::{ChatEvent, Frame, MessagePayload, ReadPayload, Timestamp, TypingPayload};
use crate::protocol::transport::{Connector, WebSocketConnector};
use crate::state::connection::{ConnectionManager, ConnectionState};
use crate::state::subscriptions::{Subscription, SubscriptionRegistry};
use crate::storage::{FileStorage, SecureStorage};
use crate::utils::b64;
use crate::utils::error::{MessengerError, Result};
use crate::utils::time::now_rfc3339;
use crate::utils::validation::{validate_chat_id, validate_message_text, validate_public_key};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use messaging::{FailedSend, InboundPipeline, LocalUser, NoopOfflineQueue, OfflineQueue, DECRYPTION_PLACEHOLDER};
pub use trust::{EscrowKeySource, HttpTrustEndpoint};

/// Внешние зависимости мессенджера
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn SecureStorage>,
    pub escrow: Arc<dyn EscrowKeySource>,
    pub connector: Arc<dyn Connector>,
    pub offline_queue: Arc<dyn OfflineQueue>,
}

impl Collaborators {
    /// Реальные реализации: файл с identity, HTTP trust endpoint, WebSocket
    pub fn production(config: &Config, passphrase: impl Into<String>) -> Result<Self> {
        Ok(Self {
            storage: Arc::new(FileStorage::new(
                config.identity_path.clone(),
                passphrase,
                config.pbkdf2_iterations,
            )),
            escrow: Arc::new(HttpTrustEndpoint::new(config)?),
            connector: Arc::new(WebSocketConnector::new()),
            offline_queue: Arc::new(NoopOfflineQueue),
        })
    }
}

/// Результат успешной отправки
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOutcome {
    pub message_id: String,
    /// false если сообщение ушло открытым текстом (нет ключа собеседника или identity)
    pub encrypted: bool,
}

/// Главный API для мессенджера
pub struct Messenger<P: CryptoProvider = ClassicSuiteProvider> {
    config: Config,
    local_user: LocalUser,
    keys: Arc<KeyManager<P>>,
    registry: SubscriptionRegistry,
    pipeline: Arc<InboundPipeline<P>>,
    connection: ConnectionManager,
    offline_queue: Arc<dyn OfflineQueue>,
}

impl<P: CryptoProvider> Messenger<P> {
    pub fn new(config: Config, local_user: LocalUser, collaborators: Collaborators) -> Self {
        let keys = Arc::new(KeyManager::new(collaborators.storage, collaborators.escrow));
        let registry = SubscriptionRegistry::new();
        let pipeline = Arc::new(InboundPipeline::new(
            local_user.clone(),
            Arc::clone(&keys),
            registry.clone(),
        ));
        let connection = ConnectionManager::new(&config, collaborators.connector, pipeline.clone());

        Self {
            config,
            local_user,
            keys,
            registry,
            pipeline,
            connection,
            offline_queue: collaborators.offline_queue,
        }
    }

    /// Загрузить или создать identity и получить escrow ключ.
    ///
    /// Если сокет уже открыт, ключ анонсируется сразу: `on_open` мог сработать
    /// раньше, чем identity была готова.
    pub async fn initialize(&self) -> Result<()> {
        self.keys.initialize().await?;
        if self.keys.trust_level() == TrustLevel::Degraded {
            info!(target: "api::messenger", "Messenger initialized with degraded escrow trust");
        }
        if self.connection.is_open() {
            if let Err(e) = self.announce_public_key() {
                warn!(target: "api::messenger", error = %e, "Failed to announce public key after initialize");
            }
        }
        Ok(())
    }

    /// Отправить наш публичный ключ в открытый сокет
    pub fn announce_public_key(&self) -> Result<()> {
        let frame = self
            .pipeline
            .announcement()
            .ok_or_else(|| MessengerError::NotReady("local identity is not initialized".to_string()))?;
        self.connection.send_frame(&frame)
    }

    /// Подключиться с bearer token. `false` если сокет не открылся.
    pub async fn connect(&self, token: &str) -> bool {
        self.connection.connect(token).await
    }

    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Отправить сообщение.
    ///
    /// С ключом собеседника и готовой identity сообщение шифруется, иначе уходит
    /// открытым текстом. Если сокет не Open, отправка передается в offline queue
    /// и возвращается `NotConnected`.
    pub fn send_message(&self, chat_id: &str, text: &str, peer_public_key: Option<&str>) -> Result<SendOutcome> {
        validate_chat_id(chat_id)?;
        validate_message_text(text, &self.config)?;
        if let Some(key) = peer_public_key {
            validate_public_key(key)?;
        }

        if !self.connection.is_open() {
            self.enqueue_failed(chat_id, text, peer_public_key, &MessengerError::NotConnected);
            return Err(MessengerError::NotConnected);
        }

        let message_id = Uuid::new_v4().to_string();
        let mut payload = MessagePayload {
            chat_id: chat_id.to_string(),
            id: Some(message_id.clone()),
            sender_id: Some(self.local_user.id.clone()),
            sender_name: Some(self.local_user.display_name.clone()),
            timestamp: Some(Timestamp::Text(now_rfc3339())),
            ..MessagePayload::default()
        };

        let encrypted = match (peer_public_key, self.keys.sealing_keys()) {
            (Some(peer_key), Some(sealing)) => {
                let recipient = P::kem_public_key_from_bytes(
                    b64::decode(peer_key).map_err(MessengerError::Validation)?,
                );
                let envelope = MessageCipher::<P>::encrypt(
                    text.as_bytes(),
                    &sealing.own_public,
                    &recipient,
                    &sealing.escrow_public,
                )?;
                payload.encrypted = true;
                payload.encrypted_payload = Some(envelope);
                true
            }
            _ => {
                debug!(target: "api::outbound", chat_id, "Sending plaintext: no peer key or identity not ready");
                payload.content = Some(text.to_string());
                false
            }
        };

        if let Err(e) = self.connection.send_frame(&Frame::Message(payload)) {
            self.enqueue_failed(chat_id, text, peer_public_key, &e);
            return Err(e);
        }

        Ok(SendOutcome {
            message_id,
            encrypted,
        })
    }

    pub fn send_typing(&self, chat_id: &str, is_typing: bool) -> Result<()> {
        validate_chat_id(chat_id)?;
        self.connection.send_frame(&Frame::Typing(TypingPayload {
            chat_id: chat_id.to_string(),
            is_typing,
            user_id: Some(self.local_user.id.clone()),
        }))
    }

    pub fn mark_as_read(&self, chat_id: &str, message_ids: Vec<String>) -> Result<()> {
        validate_chat_id(chat_id)?;
        self.connection.send_frame(&Frame::Read(ReadPayload {
            chat_id: chat_id.to_string(),
            message_ids,
        }))
    }

    pub fn subscribe<F>(&self, chat_id: &str, handler: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        self.registry.subscribe(chat_id, handler)
    }

    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        self.registry.subscribe_all(handler)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn key_store(&self) -> &KeyManager<P> {
        &self.keys
    }

    pub fn local_user(&self) -> &LocalUser {
        &self.local_user
    }

    pub fn decrypt_failures(&self) -> u64 {
        self.pipeline.decrypt_failures()
    }

    /// Закрыть соединение, снять подписки и стереть identity
    pub async fn logout(&self) -> Result<()> {
        self.connection.disconnect();
        self.registry.clear();
        self.keys.clear_keys().await?;
        info!(target: "api::messenger", "Logged out");
        Ok(())
    }

    fn enqueue_failed(&self, chat_id: &str, text: &str, peer_public_key: Option<&str>, reason: &MessengerError) {
        self.offline_queue.enqueue(FailedSend {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            peer_public_key: peer_public_key.map(str::to_string),
            reason: reason.to_string(),
        });
    }
}
