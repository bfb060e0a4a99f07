// Base64 утилиты

use base64::{engine::general_purpose, Engine};

pub fn encode(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(data)
}

pub fn decode(data: &str) -> Result<Vec<u8>, String> {
    general_purpose::STANDARD
        .decode(data)
        .map_err(|e| format!("Base64 decode failed: {}", e))
}

/// Декодировать строку ровно в `N` байт (публичные ключи, секреты)
pub fn decode_array<const N: usize>(data: &str) -> Result<[u8; N], String> {
    let bytes = decode(data)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| format!("Expected {} bytes, got {}", N, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_array_length() {
        let encoded = encode(&[7u8; 32]);
        assert_eq!(decode_array::<32>(&encoded).unwrap(), [7u8; 32]);
        assert!(decode_array::<16>(&encoded).is_err());
        assert!(decode("not base64!").is_err());
    }
}
