//! Криптографические наборы (реализации [`CryptoProvider`](crate::crypto::CryptoProvider))
//!
//! - [`classic`]: X25519 + ChaCha20-Poly1305 + HKDF-SHA256

pub mod classic;

pub use classic::ClassicSuiteProvider;
