//! Listener capability. Listeners are held as `Arc<dyn Listener>` and
//! identified by pointer, so two equal-looking listeners are still two
//! subscriptions.

use std::fmt;
use std::sync::Arc;

use super::{EventType, Payload};

pub trait Listener: Send + Sync {
    fn name(&self) -> &str;

    /// Called synchronously from the invoking task, once per invocation.
    fn on_event(&self, event: EventType, payload: &[Payload]);
}

/// Identity of a listener: the address of its shared allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ListenerKey(usize);

impl ListenerKey {
    pub(crate) fn of(listener: &Arc<dyn Listener>) -> Self {
        Self(Arc::as_ptr(listener) as *const () as usize)
    }
}

/// Listener backed by a closure.
pub struct FnListener<F> {
    name: String,
    callback: F,
}

impl<F> FnListener<F>
where
    F: Fn(EventType, &[Payload]) + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, callback: F) -> Arc<dyn Listener> {
        Arc::new(Self {
            name: name.into(),
            callback,
        })
    }
}

impl<F> Listener for FnListener<F>
where
    F: Fn(EventType, &[Payload]) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_event(&self, event: EventType, payload: &[Payload]) {
        (self.callback)(event, payload)
    }
}

impl<F> fmt::Debug for FnListener<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnListener").field("name", &self.name).finish()
    }
}
