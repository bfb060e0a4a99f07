// Wire format (JSON text фреймы)
// Используется для передачи сообщений через WebSocket

use crate::protocol::messages::Frame;
use crate::utils::error::{MessengerError, Result};

/// Упаковать фрейм в JSON текст
pub fn encode_frame(frame: &Frame) -> Result<String> {
    serde_json::to_string(frame)
        .map_err(|e| MessengerError::Serialization(format!("Frame encode error: {}", e)))
}

/// Распаковать JSON текст во фрейм
pub fn decode_frame(text: &str) -> Result<Frame> {
    serde_json::from_str(text)
        .map_err(|e| MessengerError::Serialization(format!("Frame decode error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::ReadPayload;

    #[test]
    fn test_encode_decode_read_frame() {
        let frame = Frame::Read(ReadPayload {
            chat_id: "chat-1".to_string(),
            message_ids: vec!["m1".to_string()],
        });
        let text = encode_frame(&frame).unwrap();
        assert!(text.contains(r#""type":"read""#));
        assert_eq!(decode_frame(&text).unwrap(), frame);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode_frame("not json"),
            Err(MessengerError::Serialization(_))
        ));
    }
}
