// Типы сообщений протокола
// Соответствуют WebSocket API: {"type": ..., "payload": {...}}

use crate::crypto::EncryptedEnvelope;
use serde::{Deserialize, Serialize};

/// Фрейм WebSocket протокола (в обе стороны)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Frame {
    Message(MessagePayload),
    PublicKey(PublicKeyPayload),
    Typing(TypingPayload),
    Read(ReadPayload),
}

/// Время сообщения: сервер присылает либо RFC 3339 строку, либо Unix millis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

/// Сообщение чата. Либо `content` (открытый текст), либо
/// `encrypted: true` + `encryptedPayload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub chat_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_payload: Option<EncryptedEnvelope>,
}

/// Анонс публичного ключа пользователя
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyPayload {
    pub user_id: String,
    /// Base64 X25519 public key (44 chars)
    pub public_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub chat_id: String,
    pub is_typing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Read receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadPayload {
    pub chat_id: String,
    pub message_ids: Vec<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ============================================================================
// Application-level types
// ============================================================================

/// Сообщение чата после классификации и расшифровки
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    /// Открытый текст, либо placeholder если расшифровать не удалось
    pub content: String,
    /// "HH:MM" в локальном времени
    pub timestamp_display: String,
    pub read: bool,
    pub encrypted: bool,
}

/// Событие, доставляемое подписчикам чата
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(ChatMessage),
    Typing {
        chat_id: String,
        user_id: Option<String>,
        is_typing: bool,
    },
    Read {
        chat_id: String,
        message_ids: Vec<String>,
    },
}

impl ChatEvent {
    pub fn chat_id(&self) -> &str {
        match self {
            ChatEvent::Message(message) => &message.chat_id,
            ChatEvent::Typing { chat_id, .. } | ChatEvent::Read { chat_id, .. } => chat_id,
        }
    }
}
