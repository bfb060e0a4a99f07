// Валидация исходящих данных

use crate::config::Config;
use crate::crypto::PUBLIC_KEY_LENGTH;
use crate::utils::b64;
use crate::utils::error::{MessengerError, Result};

pub fn validate_chat_id(chat_id: &str) -> Result<()> {
    if chat_id.trim().is_empty() {
        return Err(MessengerError::Validation(
            "Chat id cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Текст ограничен по количеству символов, а не байт
pub fn validate_message_text(text: &str, config: &Config) -> Result<()> {
    let chars = text.chars().count();
    if chars > config.max_message_chars {
        return Err(MessengerError::Validation(format!(
            "Message too long: {} characters (max {})",
            chars, config.max_message_chars
        )));
    }
    Ok(())
}

/// Публичный ключ X25519 в Base64 (32 байта)
pub fn validate_public_key(key: &str) -> Result<()> {
    b64::decode_array::<PUBLIC_KEY_LENGTH>(key)
        .map(|_| ())
        .map_err(|e| MessengerError::Validation(format!("Invalid public key: {}", e)))
}
