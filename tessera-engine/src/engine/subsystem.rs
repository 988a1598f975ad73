//! The contract every registrable component implements.

use async_trait::async_trait;

/// A unit with an Init/Start/Stop lifecycle, driven by the [`Engine`].
///
/// Methods take `&self`; implementations keep mutable state behind their own
/// locks so the engine and handler code can share the same `Arc`.
///
/// [`Engine`]: crate::Engine
#[async_trait]
pub trait Subsystem: Send + Sync + 'static {
    /// Unique name, used for lookup and attached to lifecycle errors.
    fn name(&self) -> &str;

    async fn init(&self) -> anyhow::Result<()>;

    /// Must not block until shutdown: long-running work belongs in spawned
    /// tasks, the engine does the waiting.
    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemState {
    Registered,
    Initialized,
    Started,
    Stopped,
}
