//! Shared test doubles: scripted socket connector, static escrow source, recording queue.

#![allow(dead_code)]

use async_trait::async_trait;
use courier_core::api::{EscrowKeySource, FailedSend, OfflineQueue};
use courier_core::protocol::transport::{Connector, Outgoing, Socket, SocketEvent, SocketPeer};
use courier_core::{MessengerError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What the next `open()` call does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Accept,
    Refuse,
    /// Accept after the given delay, as a slow server would
    AcceptAfter(Duration),
}

/// Connector that follows a script; once the script is exhausted it refuses.
#[derive(Default)]
pub struct ScriptedConnector {
    opens: AtomicUsize,
    script: Mutex<VecDeque<Behavior>>,
    urls: Mutex<Vec<String>>,
    peers: Mutex<Vec<SocketPeer>>,
}

impl ScriptedConnector {
    pub fn new(script: &[Behavior]) -> Self {
        Self {
            script: Mutex::new(script.iter().copied().collect()),
            ..Self::default()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Sockets handed out so far
    pub fn sockets(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    /// Everything the client wrote to socket `index`
    pub fn sent(&self, index: usize) -> Vec<Outgoing> {
        let mut peers = self.peers.lock().unwrap();
        let peer = &mut peers[index];
        let mut sent = Vec::new();
        while let Ok(command) = peer.outgoing.try_recv() {
            sent.push(command);
        }
        sent
    }

    /// Text frames written to socket `index`, parsed as JSON
    pub fn sent_json(&self, index: usize) -> Vec<serde_json::Value> {
        self.sent(index)
            .into_iter()
            .filter_map(|command| match command {
                Outgoing::Text(text) => serde_json::from_str(&text).ok(),
                Outgoing::Close => None,
            })
            .collect()
    }

    /// Push a server frame into socket `index`
    pub fn push_frame(&self, index: usize, text: impl Into<String>) {
        let peers = self.peers.lock().unwrap();
        peers[index].incoming.send(SocketEvent::Frame(text.into())).unwrap();
    }

    /// Server closes socket `index`
    pub fn close(&self, index: usize) {
        let peers = self.peers.lock().unwrap();
        let _ = peers[index].incoming.send(SocketEvent::Closed {
            code: Some(1006),
            reason: "server went away".to_string(),
        });
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn open(&self, url: &str) -> Result<Socket> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        let behavior = self.script.lock().unwrap().pop_front().unwrap_or(Behavior::Refuse);
        match behavior {
            Behavior::Accept => Ok(self.accept()),
            Behavior::AcceptAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(self.accept())
            }
            Behavior::Refuse => Err(MessengerError::Network("connection refused".to_string())),
        }
    }
}

impl ScriptedConnector {
    fn accept(&self) -> Socket {
        let (socket, peer) = Socket::pair();
        self.peers.lock().unwrap().push(peer);
        socket
    }
}

/// Escrow source returning a fixed key, or failing when `None`
pub struct StaticEscrow(pub Option<String>);

#[async_trait]
impl EscrowKeySource for StaticEscrow {
    async fn fetch_escrow_key(&self) -> Result<String> {
        self.0
            .clone()
            .ok_or_else(|| MessengerError::Network("trust endpoint unreachable".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    pub failed: Mutex<Vec<FailedSend>>,
}

impl OfflineQueue for RecordingQueue {
    fn enqueue(&self, failed: FailedSend) {
        self.failed.lock().unwrap().push(failed);
    }
}
