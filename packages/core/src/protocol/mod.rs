// Протокол
// JSON фреймы поверх постоянного WebSocket соединения

pub mod messages;
pub mod transport;
pub mod wire;

pub use messages::{ChatEvent, ChatMessage, Frame};
pub use transport::{Connector, Outgoing, Socket, SocketEvent, WebSocketConnector};
