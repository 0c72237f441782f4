//! Notifications published while the session runs.
//!
//! Each kind of notification has its own payload type, so subscribers
//! get typed arguments instead of a bag of values:
//!
//! ```text
//! EventKind::ServerList        → FnMut(&[ServerDescriptor])
//! EventKind::RoomList          → FnMut(&[RoomDescriptor])
//! EventKind::LoginResult       → FnMut(&LoginResult)
//! EventKind::AchievementResult → FnMut(&[AchievementEntry], bool)
//! EventKind::Inventory         → FnMut(&[InventoryItem])
//! EventKind::Message           → FnMut(&str)   (every inbound message)
//! ```
//!
//! Subscribers run synchronously, in registration order, on the task that
//! drives the connection. A subscriber that panics is logged and skipped;
//! the rest still run and the session carries on.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use mikmak_protocol::{
    AchievementEntry, InventoryItem, LoginResult, RoomDescriptor, ServerDescriptor,
};

/// The kinds of notification a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Message,
    ServerList,
    RoomList,
    LoginResult,
    AchievementResult,
    Inventory,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::ServerList => "server_list",
            Self::RoomList => "room_list",
            Self::LoginResult => "login_res",
            Self::AchievementResult => "achievement_res",
            Self::Inventory => "inventory",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One notification with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Message(String),
    ServerList(Vec<ServerDescriptor>),
    RoomList(Vec<RoomDescriptor>),
    LoginResult(LoginResult),
    /// The entries from the report itself (not the merged state) and
    /// whether the report was an update.
    AchievementResult {
        achievements: Vec<AchievementEntry>,
        is_update: bool,
    },
    Inventory(Vec<InventoryItem>),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::ServerList(_) => EventKind::ServerList,
            Self::RoomList(_) => EventKind::RoomList,
            Self::LoginResult(_) => EventKind::LoginResult,
            Self::AchievementResult { .. } => EventKind::AchievementResult,
            Self::Inventory(_) => EventKind::Inventory,
        }
    }
}

type Subscribers<F> = Vec<Box<F>>;

/// Typed subscriber table.
#[derive(Default)]
pub struct EventBus {
    message: Subscribers<dyn FnMut(&str) + Send>,
    server_list: Subscribers<dyn FnMut(&[ServerDescriptor]) + Send>,
    room_list: Subscribers<dyn FnMut(&[RoomDescriptor]) + Send>,
    login_result: Subscribers<dyn FnMut(&LoginResult) + Send>,
    achievements: Subscribers<dyn FnMut(&[AchievementEntry], bool) + Send>,
    inventory: Subscribers<dyn FnMut(&[InventoryItem]) + Send>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(&mut self, f: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.message.push(Box::new(f));
        self
    }

    pub fn on_server_list(
        &mut self,
        f: impl FnMut(&[ServerDescriptor]) + Send + 'static,
    ) -> &mut Self {
        self.server_list.push(Box::new(f));
        self
    }

    pub fn on_room_list(&mut self, f: impl FnMut(&[RoomDescriptor]) + Send + 'static) -> &mut Self {
        self.room_list.push(Box::new(f));
        self
    }

    pub fn on_login_result(&mut self, f: impl FnMut(&LoginResult) + Send + 'static) -> &mut Self {
        self.login_result.push(Box::new(f));
        self
    }

    /// Called with the report's own entries and its update flag.
    pub fn on_achievements(
        &mut self,
        f: impl FnMut(&[AchievementEntry], bool) + Send + 'static,
    ) -> &mut Self {
        self.achievements.push(Box::new(f));
        self
    }

    pub fn on_inventory(&mut self, f: impl FnMut(&[InventoryItem]) + Send + 'static) -> &mut Self {
        self.inventory.push(Box::new(f));
        self
    }

    /// Runs every subscriber for `event`'s kind. Returns how many of them
    /// panicked.
    pub fn publish(&mut self, event: &SessionEvent) -> usize {
        let kind = event.kind();
        match event {
            SessionEvent::Message(msg) => run_all(kind, &mut self.message, |f| f(msg)),
            SessionEvent::ServerList(servers) => {
                run_all(kind, &mut self.server_list, |f| f(servers))
            }
            SessionEvent::RoomList(rooms) => run_all(kind, &mut self.room_list, |f| f(rooms)),
            SessionEvent::LoginResult(result) => {
                run_all(kind, &mut self.login_result, |f| f(result))
            }
            SessionEvent::AchievementResult {
                achievements,
                is_update,
            } => run_all(kind, &mut self.achievements, |f| f(achievements, *is_update)),
            SessionEvent::Inventory(items) => run_all(kind, &mut self.inventory, |f| f(items)),
        }
    }
}

fn run_all<F: ?Sized>(
    kind: EventKind,
    subscribers: &mut Subscribers<F>,
    mut call: impl FnMut(&mut F),
) -> usize {
    let mut panicked = 0;
    for (index, subscriber) in subscribers.iter_mut().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| call(&mut **subscriber))).is_err() {
            tracing::error!(%kind, subscriber = index, "subscriber panicked");
            panicked += 1;
        }
    }
    panicked
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("message", &self.message.len())
            .field("server_list", &self.server_list.len())
            .field("room_list", &self.room_list.len())
            .field("login_result", &self.login_result.len())
            .field("achievements", &self.achievements.len())
            .field("inventory", &self.inventory.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn server(name: &str) -> ServerDescriptor {
        ServerDescriptor {
            id: 4,
            name: name.into(),
            ip: "213.8.147.198".into(),
            port: 443,
            capacity: 0.2,
            timestamp: 202602231555,
            safe: None,
        }
    }

    #[test]
    fn test_subscribers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            bus.on_message(move |msg| seen.lock().unwrap().push(format!("{tag}:{msg}")));
        }

        bus.publish(&SessionEvent::Message("hi".into()));
        assert_eq!(*seen.lock().unwrap(), ["first:hi", "second:hi"]);
    }

    #[test]
    fn test_only_matching_kind_is_called() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = Arc::clone(&names);
        bus.on_server_list(move |servers| {
            sink.lock()
                .unwrap()
                .extend(servers.iter().map(|s| s.name.clone()))
        });
        bus.on_message(|_| panic!("message subscribers must not run"));

        bus.publish(&SessionEvent::ServerList(vec![server("קיווי")]));
        assert_eq!(*names.lock().unwrap(), ["קיווי"]);
    }

    #[test]
    fn test_panicking_subscriber_does_not_stop_the_others() {
        let called = Arc::new(Mutex::new(false));
        let mut bus = EventBus::new();
        bus.on_achievements(|_, _| panic!("subscriber bug"));
        let flag = Arc::clone(&called);
        bus.on_achievements(move |entries, is_update| {
            assert!(entries.is_empty());
            assert!(is_update);
            *flag.lock().unwrap() = true;
        });

        let panicked = bus.publish(&SessionEvent::AchievementResult {
            achievements: Vec::new(),
            is_update: true,
        });

        assert_eq!(panicked, 1);
        assert!(*called.lock().unwrap());
    }

    #[test]
    fn test_chained_subscribers_all_run() {
        let mut bus = EventBus::new();
        let calls = Arc::new(Mutex::new(0));
        let (a, b) = (Arc::clone(&calls), Arc::clone(&calls));
        bus.on_inventory(move |_| *a.lock().unwrap() += 1)
            .on_inventory(move |_| *b.lock().unwrap() += 1);

        bus.publish(&SessionEvent::Inventory(Vec::new()));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn test_event_kind_names() {
        let event = SessionEvent::LoginResult(LoginResult::new());
        assert_eq!(event.kind(), EventKind::LoginResult);
        assert_eq!(event.kind().to_string(), "login_res");
    }
}
