//! Event bus registry and per-kind listener sets.
//!
//! Locking: the registry map is touched only to find or create a kind's
//! [`Event`]. Each `Event` has its own reader/writer lock. Register and
//! unregister take it exclusively; invocations share it and keep holding
//! it while listener code runs, so a slow listener delays mutations of
//! that kind but never blocks other kinds.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use super::listener::ListenerKey;
use super::{EventKind, EventType, Listener, Payload};

type ListenerSet = HashMap<ListenerKey, Arc<dyn Listener>>;

#[derive(Default)]
struct Listeners {
    global: ListenerSet,
    channels: HashMap<String, ListenerSet>,
}

/// Listener sets of a single event kind.
struct Event {
    kind: EventType,
    listeners: RwLock<Listeners>,
}

impl Event {
    fn new(kind: EventType) -> Self {
        Self {
            kind,
            listeners: RwLock::new(Listeners::default()),
        }
    }

    fn register(&self, listener: &Arc<dyn Listener>, channels: &[&str]) {
        let key = ListenerKey::of(listener);
        let mut listeners = self.listeners.write();
        if channels.is_empty() {
            listeners.global.insert(key, Arc::clone(listener));
            return;
        }
        for channel in channels {
            listeners
                .channels
                .entry((*channel).to_string())
                .or_default()
                .insert(key, Arc::clone(listener));
        }
    }

    fn unregister(&self, listener: &Arc<dyn Listener>, channels: &[&str]) {
        let key = ListenerKey::of(listener);
        let mut listeners = self.listeners.write();
        if channels.is_empty() {
            listeners.global.remove(&key);
            return;
        }
        for channel in channels {
            if let Some(set) = listeners.channels.get_mut(*channel) {
                set.remove(&key);
                if set.is_empty() {
                    listeners.channels.remove(*channel);
                }
            }
        }
    }

    fn invoke(&self, channels: &[&str], payload: &[Payload], debug: bool) -> usize {
        // Recursive read so a listener may itself invoke this kind even
        // while a writer is queued.
        let listeners = self.listeners.read_recursive();

        let mut selected: ListenerSet = listeners.global.clone();
        for channel in channels {
            if let Some(set) = listeners.channels.get(*channel) {
                selected.extend(set.iter().map(|(k, l)| (*k, Arc::clone(l))));
            }
        }

        if debug {
            let names: Vec<&str> = selected.values().map(|l| l.name()).collect();
            info!(
                event = %self.kind,
                channels = ?channels,
                listeners = ?names,
                payload_len = payload.len(),
                "[Event] Invoke"
            );
        }

        for listener in selected.values() {
            listener.on_event(self.kind, payload);
        }
        selected.len()
    }

    fn listener_count(&self) -> usize {
        let listeners = self.listeners.read();
        let mut keys: HashSet<ListenerKey> = listeners.global.keys().copied().collect();
        for set in listeners.channels.values() {
            keys.extend(set.keys().copied());
        }
        keys.len()
    }
}

/// Registry from event kind to that kind's listener sets.
///
/// Built once by the process bootstrap and shared as `Arc<EventBus>`.
#[derive(Default)]
pub struct EventBus {
    events: RwLock<HashMap<TypeId, Arc<Event>>>,
    debug: bool,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus that logs every register, unregister and invoke at `info`.
    pub fn with_debug(debug: bool) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            debug,
        }
    }

    fn event<K: EventKind>(&self) -> Option<Arc<Event>> {
        self.events.read().get(&TypeId::of::<K>()).cloned()
    }

    fn event_or_create<K: EventKind>(&self) -> Arc<Event> {
        if let Some(event) = self.event::<K>() {
            return event;
        }
        let kind = EventType::of::<K>();
        let mut events = self.events.write();
        Arc::clone(
            events
                .entry(kind.id())
                .or_insert_with(|| Arc::new(Event::new(kind))),
        )
    }

    /// Subscribes `listener` globally when `channels` is empty, otherwise
    /// to each named channel. Registering twice is a no-op.
    pub fn register<K: EventKind>(&self, listener: &Arc<dyn Listener>, channels: &[&str]) {
        self.event_or_create::<K>().register(listener, channels);
        if self.debug {
            info!(
                event = K::name(),
                listener = listener.name(),
                channels = ?channels,
                "[Event] Register listener"
            );
        }
    }

    /// Removes `listener` from the global set when `channels` is empty,
    /// otherwise from each named channel.
    pub fn unregister<K: EventKind>(&self, listener: &Arc<dyn Listener>, channels: &[&str]) {
        if let Some(event) = self.event::<K>() {
            event.unregister(listener, channels);
        }
        if self.debug {
            info!(
                event = K::name(),
                listener = listener.name(),
                channels = ?channels,
                "[Event] Unregister listener"
            );
        }
    }

    /// Notifies the global listeners of `K`. Returns how many were called.
    pub fn invoke<K: EventKind>(&self, payload: &[Payload]) -> usize {
        self.invoke_channel::<K>(&[], payload)
    }

    /// Notifies the union of the global listeners and the listeners of each
    /// channel in `channels`. Returns how many were called.
    pub fn invoke_channel<K: EventKind>(&self, channels: &[&str], payload: &[Payload]) -> usize {
        match self.event::<K>() {
            Some(event) => event.invoke(channels, payload, self.debug),
            None => {
                if self.debug {
                    info!(
                        event = K::name(),
                        channels = ?channels,
                        payload_len = payload.len(),
                        "[Event] Invoke event without listener"
                    );
                }
                0
            }
        }
    }

    /// Distinct listeners subscribed to `K` on any set.
    pub fn listener_count<K: EventKind>(&self) -> usize {
        self.event::<K>().map_or(0, |event| event.listener_count())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("kinds", &self.events.read().len())
            .field("debug", &self.debug)
            .finish()
    }
}
