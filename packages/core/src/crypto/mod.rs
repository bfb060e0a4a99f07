//! Криптографический модуль
//!
//! # Архитектура
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Messenger (api::Messenger)                 │
//! └─────────────────────────────────────────────────────────────┘
//!                │                           │
//!                ▼                           ▼
//! ┌───────────────────────────┐  ┌──────────────────────────────┐
//! │   KeyManager (keys)       │  │  MessageCipher (envelope)    │
//! │  - Identity устройства    │  │  - Session secret на каждое  │
//! │  - Escrow ключ платформы  │  │    сообщение                 │
//! │  - Кеш ключей собеседников│  │  - 3 обертки: sender /       │
//! │                           │  │    recipient / admin         │
//! └───────────────────────────┘  └──────────────────────────────┘
//!                │                           │
//!                └─────────────┬─────────────┘
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              CryptoProvider (Crypto-Agility)                │
//! │  - KEM (X25519 ephemeral ECDH)                              │
//! │  - AEAD (ChaCha20-Poly1305)                                 │
//! │  - KDF (HKDF-SHA256)                                        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Модули
//!
//! - [`provider`]: CryptoProvider trait для crypto-agility
//! - [`suites`]: Реализации CryptoProvider (Classic)
//! - [`envelope`]: Формат конверта и протокол шифрования сообщений
//! - [`keys`]: KeyManager для identity устройства и escrow ключа
//! - `master_key`: Шифрование identity на диске

/// CryptoProvider trait для crypto-agility
pub mod provider;

/// Криптографические наборы
pub mod suites;

pub mod envelope;

pub mod keys;

pub mod master_key;

// ============================================================================
// Re-exports для удобства
// ============================================================================

pub use envelope::{EncryptedEnvelope, MessageCipher, WrappedSessionKey};
pub use keys::{KeyManager, TrustLevel};
pub use provider::CryptoProvider;
pub use suites::ClassicSuiteProvider;

/// Длина публичного ключа X25519 (в байтах)
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Длина session secret на одно сообщение (в байтах)
pub const SESSION_KEY_LENGTH: usize = 32;

/// Длина nonce/IV для ChaCha20-Poly1305 (в байтах)
pub const NONCE_LENGTH: usize = 12;

/// Длина Poly1305 authentication tag (в байтах)
pub const TAG_LENGTH: usize = 16;
