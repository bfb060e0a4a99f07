// Состояние подключения к серверу
// Один постоянный сокет, автоматическое переподключение с exponential backoff

use crate::config::Config;
use crate::protocol::messages::Frame;
use crate::protocol::transport::{authenticated_url, redacted_url, Connector, Outgoing, SocketEvent};
use crate::protocol::wire::encode_frame;
use crate::utils::error::{MessengerError, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Состояние подключения к серверу
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    /// Ждем таймер следующей попытки
    Reconnecting,
    /// Лимит попыток исчерпан; нужен явный connect()
    PermanentlyDisconnected,
}

/// Состояние автоматического переподключения
#[derive(Debug, Clone)]
pub struct ReconnectState {
    /// Неудачные попытки подряд (без Open между ними)
    attempts: u32,
    /// После стольких неудачных попыток переподключение прекращается
    max_attempts: u32,
    /// Начальная задержка в миллисекундах
    initial_delay_ms: u64,
    /// Максимальная задержка в миллисекундах
    max_delay_ms: u64,
}

impl ReconnectState {
    pub fn new(initial_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.websocket_retry_initial_ms,
            config.websocket_retry_max_ms,
            config.max_reconnect_attempts,
        )
    }

    /// min(initial * 2^attempt, max)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Зафиксировать неудачную попытку.
    /// Возвращает задержку до следующей, или None если лимит исчерпан.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.attempts = self.attempts.saturating_add(1);
        if self.attempts >= self.max_attempts {
            None
        } else {
            Some(self.delay_for(self.attempts - 1))
        }
    }

    /// Сбросить счётчик попыток
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Получить количество попыток
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Callbacks от ConnectionManager.
///
/// Вызываются из задач tokio; не должны блокировать.
pub trait ConnectionEvents: Send + Sync {
    /// Сокет открыт. Возвращенный фрейм (анонс публичного ключа) отправляется первым.
    fn on_open(&self) -> Option<Frame>;

    /// Текстовый фрейм от сервера
    fn on_frame(&self, text: &str);
}

struct Inner {
    token: Option<String>,
    explicit_disconnect: bool,
    outbound: Option<mpsc::UnboundedSender<Outgoing>>,
    reconnect: ReconnectState,
    timer: Option<JoinHandle<()>>,
    /// Растет при каждом connect()/disconnect(); события старых сокетов и таймеров игнорируются
    epoch: u64,
}

struct Shared {
    server_url: String,
    connector: Arc<dyn Connector>,
    events: Arc<dyn ConnectionEvents>,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Владелец постоянного соединения
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    pub fn new(
        config: &Config,
        connector: Arc<dyn Connector>,
        events: Arc<dyn ConnectionEvents>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                server_url: config.server_url.clone(),
                connector,
                events,
                inner: Mutex::new(Inner {
                    token: None,
                    explicit_disconnect: false,
                    outbound: None,
                    reconnect: ReconnectState::from_config(config),
                    timer: None,
                    epoch: 0,
                }),
                state_tx,
            }),
        }
    }

    /// Подключиться с bearer token.
    ///
    /// `false` если токен пустой (сокет не открывается) или первая попытка не удалась.
    /// Во втором случае переподключение продолжается в фоне.
    pub async fn connect(&self, token: &str) -> bool {
        if token.is_empty() {
            warn!(target: "transport::connection", "connect() called without a session token");
            return false;
        }

        let epoch = {
            let mut inner = self.shared.lock();
            inner.token = Some(token.to_string());
            inner.explicit_disconnect = false;
            inner.reconnect.reset();
            inner.cancel_timer();
            inner.close_socket();
            inner.epoch += 1;
            inner.epoch
        };

        self.shared.attempt(epoch).await
    }

    /// Закрыть соединение и отменить переподключение
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.explicit_disconnect = true;
        inner.epoch += 1;
        inner.token = None;
        inner.reconnect.reset();
        inner.cancel_timer();
        inner.close_socket();
        self.shared.set_state(ConnectionState::Disconnected);
        info!(target: "transport::connection", "Disconnected by caller");
    }

    /// Отправить фрейм. Ошибка NotConnected если сокет не Open.
    pub fn send_frame(&self, frame: &Frame) -> Result<()> {
        let text = encode_frame(frame)?;
        let inner = self.shared.lock();
        if self.state() != ConnectionState::Open {
            return Err(MessengerError::NotConnected);
        }
        let outbound = inner.outbound.as_ref().ok_or(MessengerError::NotConnected)?;
        outbound
            .send(Outgoing::Text(text))
            .map_err(|_| MessengerError::NotConnected)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Подписка на изменения состояния
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().reconnect.attempts()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.explicit_disconnect = true;
        inner.epoch += 1;
        inner.cancel_timer();
        inner.close_socket();
    }
}

impl Inner {
    fn is_current(&self, epoch: u64) -> bool {
        !self.explicit_disconnect && self.epoch == epoch
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn close_socket(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Outgoing::Close);
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(target: "transport::connection", from = ?previous, to = ?state, "Connection state changed");
        }
    }

    /// Одна попытка открыть сокет
    async fn attempt(self: &Arc<Self>, epoch: u64) -> bool {
        let token = {
            let inner = self.lock();
            if !inner.is_current(epoch) {
                return false;
            }
            let Some(token) = inner.token.clone() else {
                return false;
            };
            self.set_state(ConnectionState::Connecting);
            token
        };

        let url = match authenticated_url(&self.server_url, &token) {
            Ok(url) => url,
            Err(e) => {
                warn!(target: "transport::connection", error = %e, "Cannot build server URL");
                self.on_attempt_failed(epoch);
                return false;
            }
        };
        debug!(target: "transport::connection", url = %redacted_url(&url), "Opening socket");

        let socket = match self.connector.open(&url).await {
            Ok(socket) => socket,
            Err(e) => {
                warn!(target: "transport::connection", error = %e, "Connection attempt failed");
                self.on_attempt_failed(epoch);
                return false;
            }
        };

        {
            let mut inner = self.lock();
            if !inner.is_current(epoch) {
                let _ = socket.outgoing.send(Outgoing::Close);
                return false;
            }
            inner.reconnect.reset();
            inner.outbound = Some(socket.outgoing.clone());
            self.set_state(ConnectionState::Open);
        }
        info!(target: "transport::connection", "Connection open");

        if let Some(announcement) = self.events.on_open() {
            match encode_frame(&announcement) {
                Ok(text) => {
                    let _ = socket.outgoing.send(Outgoing::Text(text));
                }
                Err(e) => warn!(target: "transport::connection", error = %e, "Cannot encode announcement"),
            }
        }

        tokio::spawn(read_loop(Arc::downgrade(self), socket.incoming, epoch));
        true
    }

    fn on_attempt_failed(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.lock();
        if !inner.is_current(epoch) {
            return;
        }
        match inner.reconnect.record_failure() {
            Some(delay) => {
                self.set_state(ConnectionState::Reconnecting);
                self.schedule_retry(&mut inner, delay, epoch);
            }
            None => {
                inner.cancel_timer();
                self.set_state(ConnectionState::PermanentlyDisconnected);
                warn!(
                    target: "transport::connection",
                    attempts = inner.reconnect.attempts(),
                    "Reconnect limit reached, giving up"
                );
            }
        }
    }

    fn on_socket_closed(self: &Arc<Self>, epoch: u64, code: Option<u16>, reason: &str) {
        let mut inner = self.lock();
        if !inner.is_current(epoch) {
            return;
        }
        inner.outbound = None;
        let delay = inner.reconnect.delay_for(inner.reconnect.attempts());
        info!(target: "transport::connection", code = ?code, reason, "Socket closed by peer");
        self.set_state(ConnectionState::Reconnecting);
        self.schedule_retry(&mut inner, delay, epoch);
    }

    fn schedule_retry(self: &Arc<Self>, inner: &mut Inner, delay: Duration, epoch: u64) {
        debug!(
            target: "transport::connection",
            delay_ms = delay.as_millis() as u64,
            attempts = inner.reconnect.attempts(),
            "Scheduling reconnect"
        );
        let weak = Arc::downgrade(self);
        // Новый handle заменяет handle текущей задачи-таймера, если мы внутри нее
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            // Таймер мог сработать до отмены: attempt() проверит флаг и epoch
            shared.attempt(epoch).await;
        }));
    }
}

async fn read_loop(
    weak: Weak<Shared>,
    mut incoming: mpsc::UnboundedReceiver<SocketEvent>,
    epoch: u64,
) {
    while let Some(event) = incoming.recv().await {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        if !shared.lock().is_current(epoch) {
            return;
        }
        match event {
            SocketEvent::Frame(text) => shared.events.on_frame(&text),
            SocketEvent::Closed { code, reason } => {
                shared.on_socket_closed(epoch, code, &reason);
                return;
            }
        }
    }

    if let Some(shared) = weak.upgrade() {
        shared.on_socket_closed(epoch, None, "transport dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays_are_capped() {
        let state = ReconnectState::new(1_000, 30_000, 5);
        assert_eq!(state.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(state.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(state.delay_for(4), Duration::from_millis(16_000));
        assert_eq!(state.delay_for(5), Duration::from_millis(30_000));
        assert_eq!(state.delay_for(200), Duration::from_millis(30_000));
    }

    #[test]
    fn test_record_failure_stops_at_ceiling() {
        let mut state = ReconnectState::new(1_000, 30_000, 5);
        let delays: Vec<_> = (0..4).map(|_| state.record_failure()).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_millis(1_000)),
                Some(Duration::from_millis(2_000)),
                Some(Duration::from_millis(4_000)),
                Some(Duration::from_millis(8_000)),
            ]
        );
        assert_eq!(state.record_failure(), None);
        assert_eq!(state.attempts(), 5);

        state.reset();
        assert_eq!(state.attempts(), 0);
        assert!(state.record_failure().is_some());
    }
}
