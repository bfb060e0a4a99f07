use crate::crypto::provider::CryptoProvider;
use crate::crypto::{NONCE_LENGTH, PUBLIC_KEY_LENGTH, SESSION_KEY_LENGTH};
use crate::error::CryptoError;
use chacha20poly1305::{
    aead::{Aead, Payload},
    ChaCha20Poly1305, Key as AeadKeyChacha, KeyInit, Nonce,
};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand_core::RngCore;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as KemPublicKeyDalek, StaticSecret};
use zeroize::Zeroizing;

/// Concrete implementation of `CryptoProvider` for the classic suite.
pub struct ClassicSuiteProvider;

fn to_array_32(bytes: &[u8], what: &str) -> Result<[u8; 32], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidInputError(format!("Invalid {} length", what)))
}

fn check_aead_params(key: &[u8], nonce: &[u8]) -> Result<(), CryptoError> {
    if key.len() != SESSION_KEY_LENGTH {
        return Err(CryptoError::InvalidInputError(format!(
            "AEAD key must be {} bytes, got {}",
            SESSION_KEY_LENGTH,
            key.len()
        )));
    }
    if nonce.len() != NONCE_LENGTH {
        return Err(CryptoError::InvalidInputError(format!(
            "AEAD nonce must be {} bytes, got {}",
            NONCE_LENGTH,
            nonce.len()
        )));
    }
    Ok(())
}

impl CryptoProvider for ClassicSuiteProvider {
    type KemPublicKey = Vec<u8>;
    type KemPrivateKey = Zeroizing<Vec<u8>>;
    type AeadKey = Zeroizing<Vec<u8>>;

    fn generate_kem_keys() -> Result<(Self::KemPrivateKey, Self::KemPublicKey), CryptoError> {
        let private_key = StaticSecret::random_from_rng(OsRng);
        let public_key = KemPublicKeyDalek::from(&private_key);
        Ok((
            Zeroizing::new(private_key.to_bytes().to_vec()),
            public_key.to_bytes().to_vec(),
        ))
    }

    fn from_private_key_to_public_key(
        private_key: &Self::KemPrivateKey,
    ) -> Result<Self::KemPublicKey, CryptoError> {
        let bytes = Zeroizing::new(to_array_32(private_key, "KEM private key")?);
        let static_secret = StaticSecret::from(*bytes);
        let public_key = KemPublicKeyDalek::from(&static_secret);
        Ok(public_key.to_bytes().to_vec())
    }

    fn kem_public_key_from_bytes(bytes: Vec<u8>) -> Self::KemPublicKey {
        // For ClassicSuiteProvider, KemPublicKey is Vec<u8>, so just return it
        bytes
    }

    fn kem_private_key_from_bytes(bytes: Vec<u8>) -> Self::KemPrivateKey {
        Zeroizing::new(bytes)
    }

    fn aead_key_from_bytes(bytes: Vec<u8>) -> Self::AeadKey {
        Zeroizing::new(bytes)
    }

    fn kem_encapsulate(
        public_key: &Self::KemPublicKey,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let pk_bytes = to_array_32(public_key, "KEM public key")
            .map_err(|e| CryptoError::KemEncapsulationError(e.to_string()))?;
        let recipient_public_key = KemPublicKeyDalek::from(pk_bytes);
        let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);

        // Get ephemeral public key before consuming ephemeral_secret
        let ephemeral_public_key = KemPublicKeyDalek::from(&ephemeral_secret);

        // Now consume ephemeral_secret in DH
        let shared_secret = ephemeral_secret.diffie_hellman(&recipient_public_key);
        if !shared_secret.was_contributory() {
            return Err(CryptoError::KemEncapsulationError(
                "Low-order recipient public key".to_string(),
            ));
        }

        Ok((
            ephemeral_public_key.to_bytes().to_vec(),
            shared_secret.to_bytes().to_vec(),
        ))
    }

    fn kem_decapsulate(
        private_key: &Self::KemPrivateKey,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let bytes = Zeroizing::new(
            to_array_32(private_key, "KEM private key")
                .map_err(|e| CryptoError::KemDecapsulationError(e.to_string()))?,
        );
        let static_secret = StaticSecret::from(*bytes);

        let ct_bytes = to_array_32(ciphertext, "KEM ciphertext")
            .map_err(|e| CryptoError::KemDecapsulationError(e.to_string()))?;
        let ephemeral_public_key = KemPublicKeyDalek::from(ct_bytes);

        let shared_secret = static_secret.diffie_hellman(&ephemeral_public_key);
        if !shared_secret.was_contributory() {
            return Err(CryptoError::KemDecapsulationError(
                "Low-order ephemeral public key".to_string(),
            ));
        }
        Ok(shared_secret.to_bytes().to_vec())
    }

    fn aead_encrypt(
        key: &Self::AeadKey,
        nonce: &[u8],
        plaintext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        check_aead_params(key, nonce)?;
        let cipher = ChaCha20Poly1305::new(AeadKeyChacha::from_slice(key));
        let nonce_ref = Nonce::from_slice(nonce);

        let payload = Payload {
            msg: plaintext,
            aad: associated_data.unwrap_or_default(),
        };

        cipher
            .encrypt(nonce_ref, payload)
            .map_err(|e| CryptoError::AeadEncryptionError(e.to_string()))
    }

    fn aead_decrypt(
        key: &Self::AeadKey,
        nonce: &[u8],
        ciphertext: &[u8],
        associated_data: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        check_aead_params(key, nonce)?;
        let cipher = ChaCha20Poly1305::new(AeadKeyChacha::from_slice(key));
        let nonce_ref = Nonce::from_slice(nonce);

        let payload = Payload {
            msg: ciphertext,
            aad: associated_data.unwrap_or_default(),
        };

        cipher
            .decrypt(nonce_ref, payload)
            .map_err(|e| CryptoError::AeadDecryptionError(e.to_string()))
    }

    fn hkdf_derive_key(
        salt: &[u8],
        ikm: &[u8],
        info: &[u8],
        len: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        let hkdf = Hkdf::<Sha256>::new(Some(salt), ikm);
        let mut okm = vec![0u8; len];
        hkdf.expand(info, &mut okm)
            .map_err(|e| CryptoError::KeyDerivationError(e.to_string()))?;
        Ok(okm)
    }

    fn generate_nonce(len: usize) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = vec![0u8; len];
        OsRng.try_fill_bytes(&mut nonce_bytes)?;
        Ok(nonce_bytes)
    }
}
