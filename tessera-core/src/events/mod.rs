//! ## tessera-core::events
//! **Typed publish/subscribe bus with channel-scoped delivery**
//!
//! An event kind is a Rust type implementing [`EventKind`]; each kind owns
//! its own listener sets, created lazily on first registration and kept for
//! the lifetime of the [`EventBus`]. A listener subscribes either globally
//! (every invocation of the kind) or to named channels (only invocations
//! addressed to one of them). Invocation notifies the union of the global
//! set and every addressed channel's set, each listener exactly once.
//!
//! Delivery order across listeners is unspecified.
//!
//! ### Key Submodules:
//! - `bus/`: the [`EventBus`] registry and per-kind listener sets
//! - `listener/`: the [`Listener`] capability and the closure-backed [`FnListener`]
//! - `payload/`: positional payloads and typed extraction helpers

pub mod bus;
pub mod listener;
pub mod payload;

use std::any::{type_name, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

pub use bus::EventBus;
pub use listener::{FnListener, Listener};
pub use payload::{parse_payload, parse_payload_index, payload, Payload};

/// Compile-time event category. Implement on a unit struct:
///
/// ```
/// use tessera_core::events::EventKind;
///
/// struct UserLoggedIn;
/// impl EventKind for UserLoggedIn {}
/// ```
pub trait EventKind: Send + Sync + 'static {
    fn name() -> &'static str {
        type_name::<Self>()
    }
}

/// Runtime identity of an event kind, handed to listeners.
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    pub fn of<K: EventKind>() -> Self {
        Self {
            id: TypeId::of::<K>(),
            name: K::name(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<K: EventKind>(&self) -> bool {
        self.id == TypeId::of::<K>()
    }

    pub(crate) fn id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
