// Состояние времени выполнения: соединение и подписки

pub mod connection;
pub mod subscriptions;

pub use connection::{ConnectionEvents, ConnectionManager, ConnectionState, ReconnectState};
pub use subscriptions::{Handler, Subscription, SubscriptionRegistry};
