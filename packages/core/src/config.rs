//! Централизованная конфигурация мессенджера
//!
//! Все константы и настройки должны быть определены здесь, чтобы избежать
//! хардкода по всему проекту. Экземпляр передается явно в [`crate::api::Messenger`],
//! глобального синглтона нет.

use std::path::PathBuf;
use std::time::Duration;

/// Основная структура конфигурации
#[derive(Debug, Clone)]
pub struct Config {
    // ============================================
    // СЕТЕВЫЕ ПАРАМЕТРЫ
    // ============================================

    /// URL постоянного WebSocket соединения (токен добавляется query-параметром)
    pub server_url: String,

    /// Базовый URL trust endpoint (`GET {base}/admin/public-key`)
    pub trust_endpoint_url: String,

    /// Таймаут HTTP запросов к trust endpoint (в секундах)
    pub http_timeout_secs: u64,

    /// Начальная задержка для exponential backoff при переподключении (в миллисекундах)
    pub websocket_retry_initial_ms: u64,

    /// Максимальная задержка для exponential backoff (в миллисекундах)
    pub websocket_retry_max_ms: u64,

    /// Сколько неудачных попыток подряд допускается до PermanentlyDisconnected
    pub max_reconnect_attempts: u32,

    // ============================================
    // ВАЛИДАЦИЯ
    // ============================================

    /// Максимальная длина текста сообщения (в символах)
    pub max_message_chars: usize,

    // ============================================
    // ХРАНИЛИЩЕ
    // ============================================

    /// Путь к файлу с зашифрованной identity устройства
    pub identity_path: PathBuf,

    /// PBKDF2: количество итераций для ключа шифрования identity
    pub pbkdf2_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Сетевые параметры
            server_url: "ws://localhost:8080/ws".to_string(),
            trust_endpoint_url: "http://localhost:8080".to_string(),
            http_timeout_secs: 10,
            websocket_retry_initial_ms: 1000,
            websocket_retry_max_ms: 30000,
            max_reconnect_attempts: 5,

            // Валидация
            max_message_chars: 1000,

            // Хранилище
            identity_path: PathBuf::from("courier-identity.json"),
            pbkdf2_iterations: 100_000,
        }
    }
}

impl Config {
    /// Создать конфигурацию из переменных окружения
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Переопределяем значения из env, если они заданы
        if let Ok(val) = std::env::var("MESSENGER_WS_URL") {
            config.server_url = val;
        }

        if let Ok(val) = std::env::var("MESSENGER_TRUST_URL") {
            config.trust_endpoint_url = val;
        }

        if let Ok(val) = std::env::var("MESSENGER_RETRY_INITIAL_MS") {
            if let Ok(parsed) = val.parse() {
                config.websocket_retry_initial_ms = parsed;
            }
        }

        if let Ok(val) = std::env::var("MESSENGER_RETRY_MAX_MS") {
            if let Ok(parsed) = val.parse() {
                config.websocket_retry_max_ms = parsed;
            }
        }

        if let Ok(val) = std::env::var("MESSENGER_MAX_RECONNECT_ATTEMPTS") {
            if let Ok(parsed) = val.parse() {
                config.max_reconnect_attempts = parsed;
            }
        }

        if let Ok(val) = std::env::var("MESSENGER_MAX_MESSAGE_CHARS") {
            if let Ok(parsed) = val.parse() {
                config.max_message_chars = parsed;
            }
        }

        if let Ok(val) = std::env::var("MESSENGER_IDENTITY_PATH") {
            config.identity_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("PBKDF2_ITERATIONS") {
            if let Ok(parsed) = val.parse() {
                config.pbkdf2_iterations = parsed;
            }
        }

        config
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.websocket_retry_initial_ms, 1000);
        assert_eq!(config.websocket_retry_max_ms, 30000);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.max_message_chars, 1000);
        assert_eq!(config.pbkdf2_iterations, 100_000);
    }

    #[test]
    fn test_from_env_ignores_garbage() {
        std::env::set_var("MESSENGER_RETRY_MAX_MS", "not-a-number");
        std::env::set_var("MESSENGER_MAX_MESSAGE_CHARS", "250");
        let config = Config::from_env();
        std::env::remove_var("MESSENGER_RETRY_MAX_MS");
        std::env::remove_var("MESSENGER_MAX_MESSAGE_CHARS");

        assert_eq!(config.websocket_retry_max_ms, 30000);
        assert_eq!(config.max_message_chars, 250);
    }
}
