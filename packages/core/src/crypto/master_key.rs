// Шифрование приватного ключа устройства перед записью на диск
// PBKDF2 для деривации ключа + AES-256-GCM для шифрования

use crate::utils::error::{MessengerError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

// Compile-time константы для размеров массивов
pub const SALT_LENGTH: usize = 32;
const KEY_LENGTH: usize = 32;
const GCM_NONCE_LENGTH: usize = 12;

/// Деривировать мастер-ключ из парольной фразы с использованием PBKDF2
///
/// # Arguments
/// * `passphrase` - Секрет устройства (из системного keychain)
/// * `salt` - Соль (32 байта)
/// * `iterations` - Количество итераций PBKDF2
///
/// # Returns
/// 256-битный ключ для AES-256-GCM
pub fn derive_master_key(
    passphrase: &str,
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<[u8; KEY_LENGTH]>> {
    if salt.len() != SALT_LENGTH {
        return Err(MessengerError::Persistence(format!(
            "Invalid salt length: expected {}, got {}",
            SALT_LENGTH,
            salt.len()
        )));
    }

    if passphrase.is_empty() {
        return Err(MessengerError::Persistence(
            "Passphrase cannot be empty".to_string(),
        ));
    }

    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);

    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut *key);

    Ok(key)
}

/// Генерировать случайную соль
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Зашифровать данные: результат = nonce || ciphertext || tag
pub fn seal(master_key: &[u8; KEY_LENGTH], data: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(master_key.into());

    // Генерируем случайный nonce
    let mut nonce_bytes = [0u8; GCM_NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, data)
        .map_err(|e| MessengerError::Persistence(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(GCM_NONCE_LENGTH + ciphertext.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Расшифровать данные, зашифрованные через [`seal`]
pub fn open(master_key: &[u8; KEY_LENGTH], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if data.len() < GCM_NONCE_LENGTH {
        return Err(MessengerError::Persistence(
            "Invalid ciphertext: too short".to_string(),
        ));
    }

    // Извлекаем nonce и ciphertext
    let (nonce_bytes, ciphertext) = data.split_at(GCM_NONCE_LENGTH);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(master_key.into());

    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| MessengerError::Persistence(format!("Decryption failed: {}", e)))?;

    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Тестам не нужна полная стоимость PBKDF2
    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn test_derive_master_key() {
        let salt = generate_salt();
        let key1 = derive_master_key("device_secret", &salt, TEST_ITERATIONS).unwrap();
        let key2 = derive_master_key("device_secret", &salt, TEST_ITERATIONS).unwrap();

        // Одинаковая фраза и соль должны давать одинаковый ключ
        assert_eq!(&*key1, &*key2);

        let other_salt = generate_salt();
        let key3 = derive_master_key("device_secret", &other_salt, TEST_ITERATIONS).unwrap();
        assert_ne!(&*key1, &*key3);
    }

    #[test]
    fn test_derive_rejects_bad_input() {
        assert!(derive_master_key("", &generate_salt(), TEST_ITERATIONS).is_err());
        assert!(derive_master_key("secret", &[0u8; 8], TEST_ITERATIONS).is_err());
    }

    #[test]
    fn test_seal_open_roundtrip_and_wrong_key() {
        let salt = generate_salt();
        let key = derive_master_key("correct", &salt, TEST_ITERATIONS).unwrap();
        let wrong = derive_master_key("wrong", &salt, TEST_ITERATIONS).unwrap();

        let sealed = seal(&key, &[9u8; 32]).unwrap();
        // nonce + ciphertext + 16-byte tag
        assert_eq!(sealed.len(), GCM_NONCE_LENGTH + 32 + 16);

        assert_eq!(&**open(&key, &sealed).unwrap(), &[9u8; 32]);
        assert!(open(&wrong, &sealed).is_err());
        assert!(open(&key, &sealed[..4]).is_err());
    }
}
