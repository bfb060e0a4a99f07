// Типы ошибок

use crate::error::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessengerError {
    #[error("Cryptography error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Identity not ready: {0}")]
    NotReady(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for MessengerError {
    fn from(error: serde_json::Error) -> Self {
        MessengerError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MessengerError>;
