// Trust endpoint
// Источник escrow ключа платформы

use crate::config::Config;
use crate::utils::error::{MessengerError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Откуда KeyManager берет публичный escrow ключ (Base64)
#[async_trait]
pub trait EscrowKeySource: Send + Sync {
    async fn fetch_escrow_key(&self) -> Result<String>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EscrowKeyResponse {
    public_key: String,
}

/// `GET {base}/admin/public-key` -> `{"publicKey": "..."}`
pub struct HttpTrustEndpoint {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTrustEndpoint {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| MessengerError::Network(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: config.trust_endpoint_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn key_url(&self) -> String {
        format!("{}/admin/public-key", self.base_url)
    }
}

#[async_trait]
impl EscrowKeySource for HttpTrustEndpoint {
    async fn fetch_escrow_key(&self) -> Result<String> {
        let url = self.key_url();
        debug!(target: "api::trust", url = %url, "Fetching escrow public key");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MessengerError::Network(format!("Trust endpoint: {}", e)))?;

        if !resp.status().is_success() {
            return Err(MessengerError::Network(format!(
                "Trust endpoint returned status {}",
                resp.status().as_u16()
            )));
        }

        let body: EscrowKeyResponse = resp
            .json()
            .await
            .map_err(|e| MessengerError::Serialization(format!("Trust endpoint body: {}", e)))?;
        Ok(body.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_url_trims_trailing_slash() {
        let config = Config {
            trust_endpoint_url: "https://trust.example.com/".to_string(),
            ..Config::default()
        };
        let endpoint = HttpTrustEndpoint::new(&config).unwrap();
        assert_eq!(endpoint.key_url(), "https://trust.example.com/admin/public-key");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let config = Config {
            // Порт 9 (discard) на loopback: соединение отклоняется сразу
            trust_endpoint_url: "http://127.0.0.1:9".to_string(),
            http_timeout_secs: 2,
            ..Config::default()
        };
        let endpoint = HttpTrustEndpoint::new(&config).unwrap();
        let result = endpoint.fetch_escrow_key().await;
        assert!(matches!(result, Err(MessengerError::Network(_))));
    }
}
