// Входящий конвейер и отложенная отправка
// Классификация фреймов, расшифровка и доставка подписчикам

use crate::crypto::keys::KeyManager;
use crate::crypto::{CryptoProvider, EncryptedEnvelope, MessageCipher};
use crate::error::CryptoError;
use crate::protocol::messages::{
    ChatEvent, ChatMessage, Frame, MessagePayload, PublicKeyPayload, Timestamp,
};
use crate::protocol::wire::decode_frame;
use crate::state::connection::ConnectionEvents;
use crate::state::subscriptions::SubscriptionRegistry;
use crate::utils::time::{display_from_millis, display_from_rfc3339, display_now};
use crate::utils::validation::validate_public_key;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Текст сообщения, которое не удалось расшифровать
pub const DECRYPTION_PLACEHOLDER: &str = "[Unable to decrypt message]";

/// Текущий пользователь
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    pub display_name: String,
}

impl LocalUser {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

// ============================================================================
// Offline queue
// ============================================================================

/// Отправка, не дошедшая до сокета
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedSend {
    pub chat_id: String,
    pub text: String,
    pub peer_public_key: Option<String>,
    pub reason: String,
}

/// Внешняя очередь повторной отправки. Сам мессенджер ничего не повторяет.
pub trait OfflineQueue: Send + Sync {
    fn enqueue(&self, failed: FailedSend);
}

/// Очередь, которая только пишет в лог
#[derive(Debug, Default, Clone)]
pub struct NoopOfflineQueue;

impl OfflineQueue for NoopOfflineQueue {
    fn enqueue(&self, failed: FailedSend) {
        debug!(
            target: "api::outbound",
            chat_id = %failed.chat_id,
            reason = %failed.reason,
            "Send failed, no offline queue configured"
        );
    }
}

// ============================================================================
// Inbound pipeline
// ============================================================================

/// Обрабатывает фреймы от ConnectionManager
pub struct InboundPipeline<P: CryptoProvider> {
    local_user: LocalUser,
    keys: Arc<KeyManager<P>>,
    registry: SubscriptionRegistry,
    decrypt_failures: AtomicU64,
    dropped_frames: AtomicU64,
}

impl<P: CryptoProvider> InboundPipeline<P> {
    pub fn new(local_user: LocalUser, keys: Arc<KeyManager<P>>, registry: SubscriptionRegistry) -> Self {
        Self {
            local_user,
            keys,
            registry,
            decrypt_failures: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Сколько входящих сообщений не удалось расшифровать
    pub fn decrypt_failures(&self) -> u64 {
        self.decrypt_failures.load(Ordering::Relaxed)
    }

    /// Сколько фреймов отброшено (не разобрались или невалидный ключ)
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Фрейм с нашим публичным ключом; `None` пока identity не готова
    pub fn announcement(&self) -> Option<Frame> {
        let public_key = self.keys.public_key()?;
        Some(Frame::PublicKey(PublicKeyPayload {
            user_id: self.local_user.id.clone(),
            public_key,
        }))
    }

    /// Обработать разобранный фрейм. Возвращает событие, если оно было доставлено подписчикам.
    pub fn handle_frame(&self, frame: Frame) -> Option<ChatEvent> {
        let event = match frame {
            Frame::PublicKey(payload) => {
                self.handle_public_key(payload);
                return None;
            }
            Frame::Message(payload) => ChatEvent::Message(self.classify_message(payload)),
            Frame::Typing(payload) => ChatEvent::Typing {
                chat_id: payload.chat_id,
                user_id: payload.user_id,
                is_typing: payload.is_typing,
            },
            Frame::Read(payload) => ChatEvent::Read {
                chat_id: payload.chat_id,
                message_ids: payload.message_ids,
            },
        };

        let delivered = self.registry.dispatch(&event);
        trace!(target: "api::inbound", chat_id = %event.chat_id(), delivered, "Event dispatched");
        Some(event)
    }

    fn handle_public_key(&self, payload: PublicKeyPayload) {
        if let Err(e) = validate_public_key(&payload.public_key) {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            warn!(target: "api::inbound", user_id = %payload.user_id, error = %e, "Dropping malformed public key");
            return;
        }
        if payload.user_id == self.local_user.id {
            return;
        }
        debug!(target: "api::inbound", user_id = %payload.user_id, "Cached peer public key");
        self.keys.cache_public_key(&payload.user_id, &payload.public_key);
    }

    fn classify_message(&self, payload: MessagePayload) -> ChatMessage {
        let sender_id = payload.sender_id.unwrap_or_default();
        let encrypted = payload.encrypted || payload.encrypted_payload.is_some();

        let content = if encrypted {
            let as_sender = !sender_id.is_empty() && sender_id == self.local_user.id;
            match payload.encrypted_payload {
                Some(envelope) => self.decrypt_content(&envelope, as_sender),
                None => self.decryption_failed(&CryptoError::InvalidInputError(
                    "encrypted message without encryptedPayload".to_string(),
                )),
            }
        } else {
            payload.content.unwrap_or_default()
        };

        let timestamp_display = match payload.timestamp {
            Some(Timestamp::Text(raw)) => display_from_rfc3339(&raw),
            Some(Timestamp::Millis(millis)) => display_from_millis(millis),
            None => display_now(),
        };

        ChatMessage {
            id: payload.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            chat_id: payload.chat_id,
            sender_id,
            sender_name: payload.sender_name.unwrap_or_default(),
            content,
            timestamp_display,
            read: false,
            encrypted,
        }
    }

    fn decrypt_content(&self, envelope: &EncryptedEnvelope, as_sender: bool) -> String {
        let Some(private_key) = self.keys.private_key() else {
            return self.decryption_failed(&CryptoError::Other("identity not initialized".to_string()));
        };

        let result = MessageCipher::<P>::decrypt(envelope, &private_key, as_sender).and_then(|bytes| {
            String::from_utf8(bytes)
                .map_err(|_| CryptoError::AeadDecryptionError("plaintext is not UTF-8".to_string()))
        });

        match result {
            Ok(text) => text,
            Err(e) => self.decryption_failed(&e),
        }
    }

    fn decryption_failed(&self, error: &CryptoError) -> String {
        let total = self.decrypt_failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(target: "api::inbound", error = %error, total_failures = total, "Message could not be decrypted");
        DECRYPTION_PLACEHOLDER.to_string()
    }
}

impl<P: CryptoProvider> ConnectionEvents for InboundPipeline<P> {
    fn on_open(&self) -> Option<Frame> {
        self.announcement()
    }

    fn on_frame(&self, text: &str) {
        match decode_frame(text) {
            Ok(frame) => {
                self.handle_frame(frame);
            }
            Err(e) => {
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                warn!(target: "api::inbound", error = %e, "Dropping unparsable frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::trust::EscrowKeySource;
    use crate::crypto::suites::classic::ClassicSuiteProvider;
    use crate::storage::MemoryStorage;
    use crate::utils::b64;
    use crate::utils::error::{MessengerError, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Unreachable;

    #[async_trait]
    impl EscrowKeySource for Unreachable {
        async fn fetch_escrow_key(&self) -> Result<String> {
            Err(MessengerError::Network("offline".to_string()))
        }
    }

    async fn pipeline() -> (InboundPipeline<ClassicSuiteProvider>, SubscriptionRegistry) {
        let keys = Arc::new(KeyManager::new(Arc::new(MemoryStorage::new()), Arc::new(Unreachable)));
        keys.initialize().await.unwrap();
        let registry = SubscriptionRegistry::new();
        let pipeline = InboundPipeline::new(LocalUser::new("me", "Me"), keys, registry.clone());
        (pipeline, registry)
    }

    fn collect(registry: &SubscriptionRegistry, chat_id: &str) -> Arc<Mutex<Vec<ChatEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        // Handle не нужен: тест не отписывается
        let _ = registry.subscribe(chat_id, move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[tokio::test]
    async fn test_plaintext_message_is_delivered() {
        let (pipeline, registry) = pipeline().await;
        let events = collect(&registry, "chat-1");

        pipeline.on_frame(
            r#"{"type":"message","payload":{"chatId":"chat-1","id":"m1","senderId":"bob","senderName":"Bob","timestamp":"2024-05-01T10:15:00Z","content":"hello"}}"#,
        );

        let events = events.lock().unwrap();
        let ChatEvent::Message(message) = &events[0] else {
            panic!("expected message event");
        };
        assert_eq!(message.id, "m1");
        assert_eq!(message.content, "hello");
        assert_eq!(message.sender_name, "Bob");
        assert!(!message.encrypted);
        assert_eq!(message.timestamp_display.len(), 5);
    }

    #[tokio::test]
    async fn test_undecryptable_message_gets_placeholder() {
        let (pipeline, registry) = pipeline().await;
        let events = collect(&registry, "chat-1");

        // Конверт запечатан для чужих ключей
        let (_, stranger) = ClassicSuiteProvider::generate_kem_keys().unwrap();
        let envelope =
            MessageCipher::<ClassicSuiteProvider>::encrypt(b"secret", &stranger, &stranger, &stranger).unwrap();
        pipeline.handle_frame(Frame::Message(MessagePayload {
            chat_id: "chat-1".to_string(),
            sender_id: Some("bob".to_string()),
            encrypted: true,
            encrypted_payload: Some(envelope),
            ..MessagePayload::default()
        }));

        // Флаг encrypted без конверта
        pipeline.on_frame(r#"{"type":"message","payload":{"chatId":"chat-1","encrypted":true}}"#);

        assert_eq!(pipeline.decrypt_failures(), 2);
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        for event in events.iter() {
            let ChatEvent::Message(message) = event else {
                panic!("expected message event");
            };
            assert_eq!(message.content, DECRYPTION_PLACEHOLDER);
            assert!(message.encrypted);
        }
    }

    #[tokio::test]
    async fn test_public_key_frames_update_cache() {
        let (pipeline, _registry) = pipeline().await;
        let key = b64::encode(&[9u8; 32]);

        pipeline.on_frame(&format!(
            r#"{{"type":"public_key","payload":{{"userId":"bob","publicKey":"{}"}}}}"#,
            key
        ));
        pipeline.on_frame(r#"{"type":"public_key","payload":{"userId":"eve","publicKey":"short"}}"#);

        assert_eq!(pipeline.keys.cached_public_key("bob"), Some(key));
        assert_eq!(pipeline.keys.cached_public_key("eve"), None);
        assert_eq!(pipeline.dropped_frames(), 1);
    }

    #[tokio::test]
    async fn test_garbage_frame_is_dropped() {
        let (pipeline, registry) = pipeline().await;
        let events = collect(&registry, "chat-1");

        pipeline.on_frame("{not json");
        pipeline.on_frame(r#"{"type":"typing","payload":{"chatId":"chat-1","isTyping":true}}"#);

        assert_eq!(pipeline.dropped_frames(), 1);
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_announcement_carries_own_key() {
        let (pipeline, _registry) = pipeline().await;
        let Some(Frame::PublicKey(payload)) = pipeline.on_open() else {
            panic!("expected public key announcement");
        };
        assert_eq!(payload.user_id, "me");
        assert_eq!(Some(payload.public_key), pipeline.keys.public_key());
    }
}
