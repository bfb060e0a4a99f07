// Подписки на события чатов
// Подписчики по chatId + wildcard канал; доставка в порядке регистрации

use crate::protocol::messages::ChatEvent;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Обработчик событий чата
pub type Handler = Arc<dyn Fn(&ChatEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Channel {
    Chat(String),
    Wildcard,
}

#[derive(Default)]
struct Registry {
    /// Монотонный id: порядок ключей BTreeMap = порядок регистрации
    next_id: u64,
    chats: HashMap<String, BTreeMap<u64, Handler>>,
    wildcard: BTreeMap<u64, Handler>,
}

impl Registry {
    fn insert(&mut self, channel: &Channel, handler: Handler) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        match channel {
            Channel::Chat(chat_id) => {
                self.chats.entry(chat_id.clone()).or_default().insert(id, handler);
            }
            Channel::Wildcard => {
                self.wildcard.insert(id, handler);
            }
        }
        id
    }

    fn remove(&mut self, channel: &Channel, id: u64) {
        match channel {
            Channel::Chat(chat_id) => {
                if let Some(handlers) = self.chats.get_mut(chat_id) {
                    handlers.remove(&id);
                    if handlers.is_empty() {
                        self.chats.remove(chat_id);
                    }
                }
            }
            Channel::Wildcard => {
                self.wildcard.remove(&id);
            }
        }
    }
}

/// Реестр подписчиков
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Подписаться на события одного чата
    pub fn subscribe<F>(&self, chat_id: &str, handler: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        self.register(Channel::Chat(chat_id.to_string()), Arc::new(handler))
    }

    /// Подписаться на события всех чатов
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatEvent) + Send + Sync + 'static,
    {
        self.register(Channel::Wildcard, Arc::new(handler))
    }

    /// Доставить событие подписчикам чата и wildcard в едином порядке регистрации.
    ///
    /// Обработчики вызываются без удержания блокировки, так что из обработчика
    /// можно подписываться и отписываться. Возвращает число вызванных обработчиков.
    pub fn dispatch(&self, event: &ChatEvent) -> usize {
        let handlers = {
            let registry = self.lock();
            let mut merged: BTreeMap<u64, &Handler> = registry.wildcard.iter().map(|(id, h)| (*id, h)).collect();
            if let Some(chat_handlers) = registry.chats.get(event.chat_id()) {
                merged.extend(chat_handlers.iter().map(|(id, h)| (*id, h)));
            }
            let handlers: Vec<Handler> = merged.into_values().cloned().collect();
            handlers
        };

        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn handler_count(&self, chat_id: &str) -> usize {
        self.lock().chats.get(chat_id).map_or(0, BTreeMap::len)
    }

    pub fn wildcard_count(&self) -> usize {
        self.lock().wildcard.len()
    }

    /// Удалить всех подписчиков (logout)
    pub fn clear(&self) {
        let mut registry = self.lock();
        registry.chats.clear();
        registry.wildcard.clear();
    }

    fn register(&self, channel: Channel, handler: Handler) -> Subscription {
        let id = self.lock().insert(&channel, handler);
        Subscription {
            registry: Arc::downgrade(&self.inner),
            channel,
            id,
            active: AtomicBool::new(true),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle подписки. Drop не отписывает; нужно вызвать `unsubscribe()`.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    channel: Channel,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Удалить ровно этот обработчик. Повторный вызов ничего не делает.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.channel, self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn typing(chat_id: &str) -> ChatEvent {
        ChatEvent::Typing {
            chat_id: chat_id.to_string(),
            user_id: None,
            is_typing: true,
        }
    }

    fn recorder(log: &Arc<StdMutex<Vec<String>>>, name: &str) -> impl Fn(&ChatEvent) + Send + Sync + 'static {
        let log = Arc::clone(log);
        let name = name.to_string();
        move |event: &ChatEvent| log.lock().unwrap().push(format!("{}:{}", name, event.chat_id()))
    }

    #[test]
    fn test_fan_out_order() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let _w1 = registry.subscribe_all(recorder(&log, "w1"));
        let _a = registry.subscribe("chat-1", recorder(&log, "a"));
        let _b = registry.subscribe("chat-1", recorder(&log, "b"));
        let _other = registry.subscribe("chat-2", recorder(&log, "other"));
        let _w2 = registry.subscribe_all(recorder(&log, "w2"));

        assert_eq!(registry.dispatch(&typing("chat-1")), 4);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["w1:chat-1", "a:chat-1", "b:chat-1", "w2:chat-1"]
        );
    }

    #[test]
    fn test_unsubscribe_removes_only_that_handler() {
        let registry = SubscriptionRegistry::new();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let a = registry.subscribe("chat-1", recorder(&log, "a"));
        let _b = registry.subscribe("chat-1", recorder(&log, "b"));

        a.unsubscribe();
        a.unsubscribe();
        assert!(!a.is_active());
        assert_eq!(registry.handler_count("chat-1"), 1);

        registry.dispatch(&typing("chat-1"));
        assert_eq!(*log.lock().unwrap(), vec!["b:chat-1"]);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let registry = SubscriptionRegistry::new();
        let slot: Arc<StdMutex<Option<Subscription>>> = Arc::new(StdMutex::new(None));
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let slot_in_handler = Arc::clone(&slot);
        let calls_in_handler = Arc::clone(&calls);
        let subscription = registry.subscribe("chat-1", move |_| {
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
            if let Some(subscription) = slot_in_handler.lock().unwrap().as_ref() {
                subscription.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(subscription);

        registry.dispatch(&typing("chat-1"));
        registry.dispatch(&typing("chat-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.handler_count("chat-1"), 0);
    }

    #[test]
    fn test_dispatch_without_subscribers() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(registry.dispatch(&typing("nobody")), 0);
    }
}
