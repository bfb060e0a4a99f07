// WebSocket транспорт
// Connector открывает сокет и отдает пару каналов: команды наружу, события внутрь

use crate::utils::error::{MessengerError, Result};
use crate::utils::logging::Redacted;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Команда для открытого сокета
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),
    Close,
}

/// Событие от открытого сокета
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Текстовый фрейм от сервера
    Frame(String),
    /// Сокет закрыт (сервером или из-за ошибки). Всегда последнее событие.
    Closed { code: Option<u16>, reason: String },
}

/// Открытый сокет
pub struct Socket {
    pub outgoing: mpsc::UnboundedSender<Outgoing>,
    pub incoming: mpsc::UnboundedReceiver<SocketEvent>,
}

impl Socket {
    /// Пара (сокет, другой конец каналов). Используется реализациями Connector.
    pub fn pair() -> (Socket, SocketPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Socket {
                outgoing: out_tx,
                incoming: in_rx,
            },
            SocketPeer {
                outgoing: out_rx,
                incoming: in_tx,
            },
        )
    }
}

/// Сторона транспорта: читает команды, пишет события
pub struct SocketPeer {
    pub outgoing: mpsc::UnboundedReceiver<Outgoing>,
    pub incoming: mpsc::UnboundedSender<SocketEvent>,
}

/// Открывает постоянное соединение.
///
/// `open` завершается `Ok` когда сокет открыт и `Err` если открыть не удалось.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Socket>;
}

/// URL сервера с bearer token в query параметре `token`
pub fn authenticated_url(server_url: &str, token: &str) -> Result<String> {
    let mut url = Url::parse(server_url)
        .map_err(|e| MessengerError::Validation(format!("Invalid server URL: {}", e)))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

/// Connector поверх tokio-tungstenite
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Socket> {
        let (stream, _response) = connect_async(url).await.map_err(|e| {
            MessengerError::Network(format!("Failed to open WebSocket: {}", e))
        })?;
        debug!(target: "transport::websocket", "WebSocket handshake complete");

        let (mut write, mut read) = stream.split();
        let (socket, mut peer) = Socket::pair();

        tokio::spawn(async move {
            while let Some(command) = peer.outgoing.recv().await {
                match command {
                    Outgoing::Text(text) => {
                        if let Err(e) = write.send(Message::Text(text)).await {
                            warn!(target: "transport::websocket", error = %e, "WebSocket write failed");
                            break;
                        }
                    }
                    Outgoing::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            let _ = write.close().await;
        });

        let events = peer.incoming;
        tokio::spawn(async move {
            let mut closed = SocketEvent::Closed {
                code: None,
                reason: String::new(),
            };
            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if events.send(SocketEvent::Frame(text)).is_err() {
                            return;
                        }
                    }
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => {
                            if events.send(SocketEvent::Frame(text)).is_err() {
                                return;
                            }
                        }
                        Err(_) => {
                            warn!(target: "transport::websocket", "Dropping non UTF-8 binary frame");
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        if let Some(frame) = frame {
                            closed = SocketEvent::Closed {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.into_owned(),
                            };
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        closed = SocketEvent::Closed {
                            code: None,
                            reason: e.to_string(),
                        };
                        break;
                    }
                }
            }
            let _ = events.send(closed);
        });

        Ok(socket)
    }
}

/// Для логов: URL без значения токена
pub fn redacted_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let pairs: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| {
                    let value = if k == "token" {
                        Redacted(v).to_string()
                    } else {
                        v.into_owned()
                    };
                    (k.into_owned(), value)
                })
                .collect();
            parsed.query_pairs_mut().clear().extend_pairs(pairs);
            parsed.into()
        }
        Err(_) => Redacted(url).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticated_url_appends_token() {
        let url = authenticated_url("ws://localhost:8080/ws", "abc def").unwrap();
        assert_eq!(url, "ws://localhost:8080/ws?token=abc+def");

        let url = authenticated_url("wss://chat.example.com/ws?v=2", "t").unwrap();
        assert_eq!(url, "wss://chat.example.com/ws?v=2&token=t");
    }

    #[test]
    fn test_authenticated_url_rejects_garbage() {
        assert!(matches!(
            authenticated_url("not a url", "t"),
            Err(MessengerError::Validation(_))
        ));
    }

    #[test]
    fn test_redacted_url_hides_token() {
        let redacted = redacted_url("ws://localhost/ws?token=secret-token&v=2");
        assert!(!redacted.contains("secret-token"));
        assert!(redacted.contains("v=2"));
    }

    #[tokio::test]
    async fn test_connector_fails_on_refused_port() {
        let result = WebSocketConnector::new().open("ws://127.0.0.1:9/ws").await;
        assert!(matches!(result, Err(MessengerError::Network(_))));
    }
}
