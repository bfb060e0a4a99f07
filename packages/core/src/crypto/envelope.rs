//! Message envelope protocol.
//!
//! Every message gets a fresh random session secret and IV. The payload is
//! sealed with ChaCha20-Poly1305 under that secret, and the secret itself is
//! wrapped three times: for the sender, for the recipient and for the platform
//! escrow key. Each wrapped slot is an ECIES-style box:
//!
//! ```text
//! slot = base64( ephemeral_public(32) || nonce(12) || AEAD(wrap_key, session_secret)(32 + 16) )
//! wrap_key = HKDF-SHA256(salt = ephemeral_public || holder_public,
//!                        ikm  = X25519(ephemeral_secret, holder_public),
//!                        info = "courier-session-key-wrap-v1")
//! ```
//!
//! The holder's public key is also the AEAD associated data, so a slot only
//! opens for the private key whose public half it was sealed to.

use crate::crypto::provider::CryptoProvider;
use crate::crypto::{NONCE_LENGTH, PUBLIC_KEY_LENGTH, SESSION_KEY_LENGTH, TAG_LENGTH};
use crate::error::CryptoError;
use crate::utils::b64;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use tracing::trace;

const WRAP_INFO: &[u8] = b"courier-session-key-wrap-v1";

const WRAPPED_SLOT_LENGTH: usize = PUBLIC_KEY_LENGTH + NONCE_LENGTH + SESSION_KEY_LENGTH + TAG_LENGTH;

/// Encrypted message as it travels in `encryptedPayload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// Base64 ChaCha20-Poly1305 ciphertext (with tag)
    pub ciphertext: String,
    /// Base64 12-byte IV
    pub iv: String,
    pub session_key: WrappedSessionKey,
}

/// The session secret sealed separately for each of the three holders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedSessionKey {
    pub for_sender: String,
    pub for_recipient: String,
    pub for_admin: String,
}

/// Which wrapped slot to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeSlot {
    Sender,
    Recipient,
    Admin,
}

impl EnvelopeSlot {
    fn select(self, keys: &WrappedSessionKey) -> &str {
        match self {
            EnvelopeSlot::Sender => &keys.for_sender,
            EnvelopeSlot::Recipient => &keys.for_recipient,
            EnvelopeSlot::Admin => &keys.for_admin,
        }
    }
}

/// Stateless envelope encryption over a [`CryptoProvider`].
pub struct MessageCipher<P: CryptoProvider> {
    _phantom: PhantomData<P>,
}

impl<P: CryptoProvider> MessageCipher<P> {
    /// Encrypts `plaintext` into a fresh envelope readable by the sender,
    /// the recipient and the escrow holder.
    pub fn encrypt(
        plaintext: &[u8],
        sender_public: &P::KemPublicKey,
        recipient_public: &P::KemPublicKey,
        escrow_public: &P::KemPublicKey,
    ) -> Result<EncryptedEnvelope, CryptoError> {
        let session_secret = P::aead_key_from_bytes(P::generate_nonce(SESSION_KEY_LENGTH)?);
        let iv = P::generate_nonce(NONCE_LENGTH)?;

        let ciphertext = P::aead_encrypt(&session_secret, &iv, plaintext, None)?;

        let session_key = WrappedSessionKey {
            for_sender: Self::seal_session_key(&session_secret, sender_public)?,
            for_recipient: Self::seal_session_key(&session_secret, recipient_public)?,
            for_admin: Self::seal_session_key(&session_secret, escrow_public)?,
        };

        trace!(
            target: "crypto::envelope",
            plaintext_len = plaintext.len(),
            "Message sealed"
        );

        Ok(EncryptedEnvelope {
            ciphertext: b64::encode(&ciphertext),
            iv: b64::encode(&iv),
            session_key,
        })
    }

    /// Decrypts an envelope with the local private key, opening the sender
    /// slot when the local identity wrote the message and the recipient slot otherwise.
    pub fn decrypt(
        envelope: &EncryptedEnvelope,
        private_key: &P::KemPrivateKey,
        as_sender: bool,
    ) -> Result<Vec<u8>, CryptoError> {
        let slot = if as_sender {
            EnvelopeSlot::Sender
        } else {
            EnvelopeSlot::Recipient
        };
        Self::open(envelope, private_key, slot)
    }

    /// Recovers a message through the `forAdmin` slot with the escrow private key.
    pub fn open_as_escrow(
        envelope: &EncryptedEnvelope,
        escrow_private: &P::KemPrivateKey,
    ) -> Result<Vec<u8>, CryptoError> {
        Self::open(envelope, escrow_private, EnvelopeSlot::Admin)
    }

    pub fn open(
        envelope: &EncryptedEnvelope,
        private_key: &P::KemPrivateKey,
        slot: EnvelopeSlot,
    ) -> Result<Vec<u8>, CryptoError> {
        let session_secret = Self::open_session_key(slot.select(&envelope.session_key), private_key)?;

        let iv = b64::decode(&envelope.iv).map_err(CryptoError::InvalidInputError)?;
        if iv.len() != NONCE_LENGTH {
            return Err(CryptoError::InvalidInputError(format!(
                "IV must be {} bytes, got {}",
                NONCE_LENGTH,
                iv.len()
            )));
        }
        let ciphertext = b64::decode(&envelope.ciphertext).map_err(CryptoError::InvalidInputError)?;

        P::aead_decrypt(&session_secret, &iv, &ciphertext, None)
    }

    fn seal_session_key(
        session_secret: &P::AeadKey,
        holder_public: &P::KemPublicKey,
    ) -> Result<String, CryptoError> {
        let (ephemeral_public, shared_secret) = P::kem_encapsulate(holder_public)?;
        let wrap_key = Self::derive_wrap_key(&shared_secret, &ephemeral_public, holder_public.as_ref())?;
        let nonce = P::generate_nonce(NONCE_LENGTH)?;

        let sealed = P::aead_encrypt(
            &wrap_key,
            &nonce,
            session_secret.as_ref(),
            Some(holder_public.as_ref()),
        )?;

        let mut blob = Vec::with_capacity(WRAPPED_SLOT_LENGTH);
        blob.extend_from_slice(&ephemeral_public);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(b64::encode(&blob))
    }

    fn open_session_key(
        wrapped: &str,
        private_key: &P::KemPrivateKey,
    ) -> Result<P::AeadKey, CryptoError> {
        let blob = b64::decode(wrapped).map_err(CryptoError::UnwrapError)?;
        if blob.len() != WRAPPED_SLOT_LENGTH {
            return Err(CryptoError::UnwrapError(format!(
                "Wrapped key must be {} bytes, got {}",
                WRAPPED_SLOT_LENGTH,
                blob.len()
            )));
        }

        let (ephemeral_public, rest) = blob.split_at(PUBLIC_KEY_LENGTH);
        let (nonce, sealed) = rest.split_at(NONCE_LENGTH);

        let own_public = P::from_private_key_to_public_key(private_key)?;
        let shared_secret = P::kem_decapsulate(private_key, ephemeral_public)
            .map_err(|e| CryptoError::UnwrapError(e.to_string()))?;
        let wrap_key = Self::derive_wrap_key(&shared_secret, ephemeral_public, own_public.as_ref())?;

        let secret = P::aead_decrypt(&wrap_key, nonce, sealed, Some(own_public.as_ref()))
            .map_err(|_| CryptoError::UnwrapError("Session key is not sealed to this identity".to_string()))?;
        Ok(P::aead_key_from_bytes(secret))
    }

    fn derive_wrap_key(
        shared_secret: &[u8],
        ephemeral_public: &[u8],
        holder_public: &[u8],
    ) -> Result<P::AeadKey, CryptoError> {
        let mut salt = Vec::with_capacity(ephemeral_public.len() + holder_public.len());
        salt.extend_from_slice(ephemeral_public);
        salt.extend_from_slice(holder_public);
        let okm = P::hkdf_derive_key(&salt, shared_secret, WRAP_INFO, SESSION_KEY_LENGTH)?;
        Ok(P::aead_key_from_bytes(okm))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::suites::classic::ClassicSuiteProvider;

    type Cipher = MessageCipher<ClassicSuiteProvider>;

    #[test]
    fn test_wrapped_slot_layout() {
        let (_, sender) = ClassicSuiteProvider::generate_kem_keys().unwrap();
        let (_, recipient) = ClassicSuiteProvider::generate_kem_keys().unwrap();
        let (_, escrow) = ClassicSuiteProvider::generate_kem_keys().unwrap();

        let envelope = Cipher::encrypt(b"hi", &sender, &recipient, &escrow).unwrap();
        for slot in [
            &envelope.session_key.for_sender,
            &envelope.session_key.for_recipient,
            &envelope.session_key.for_admin,
        ] {
            assert_eq!(b64::decode(slot).unwrap().len(), WRAPPED_SLOT_LENGTH);
        }
        assert_eq!(b64::decode(&envelope.iv).unwrap().len(), NONCE_LENGTH);
        // Все три обертки независимы
        assert_ne!(envelope.session_key.for_sender, envelope.session_key.for_recipient);
    }

    #[test]
    fn test_envelope_wire_field_names() {
        let envelope = EncryptedEnvelope {
            ciphertext: "c".to_string(),
            iv: "i".to_string(),
            session_key: WrappedSessionKey {
                for_sender: "s".to_string(),
                for_recipient: "r".to_string(),
                for_admin: "a".to_string(),
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["sessionKey"]["forSender"], "s");
        assert_eq!(json["sessionKey"]["forRecipient"], "r");
        assert_eq!(json["sessionKey"]["forAdmin"], "a");
    }

    #[test]
    fn test_truncated_slot_is_unwrap_error() {
        let (private, public) = ClassicSuiteProvider::generate_kem_keys().unwrap();
        let mut envelope = Cipher::encrypt(b"hi", &public, &public, &public).unwrap();
        envelope.session_key.for_sender = b64::encode(&[1u8; 10]);

        let result = Cipher::decrypt(&envelope, &private, true);
        assert!(matches!(result, Err(CryptoError::UnwrapError(_))));
    }
}
