// Courier Messenger Core
// Realtime pairwise messaging engine with three-way escrowed end-to-end encryption

#![warn(clippy::all)]

// Модули
pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod state;
pub mod storage;
pub mod utils;

// Re-exports для удобства
pub use api::{Collaborators, LocalUser, Messenger, SendOutcome};
pub use config::Config;
pub use crypto::{ClassicSuiteProvider, CryptoProvider, EncryptedEnvelope, KeyManager, MessageCipher, TrustLevel};
pub use error::CryptoError;
pub use protocol::{ChatEvent, ChatMessage, Frame};
pub use state::{ConnectionState, Subscription};
pub use utils::error::{MessengerError, Result};
