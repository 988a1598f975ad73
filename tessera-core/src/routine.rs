//! ## tessera-core::routine
//! **Crash-isolated task spawning**
//!
//! Every background task in tessera is launched through this module. A task
//! runs inside its own tokio task so that a panic is caught at the join
//! boundary, reported, and never unwinds into the caller:
//!
//! - [`spawn`]: report a panic or returned error, then end.
//! - [`spawn_with_restart`]: like `spawn`, but a *panicked* task is
//!   relaunched after [`RESTART_COOLDOWN`]. A task that returns (`Ok` or
//!   `Err`) is finished.
//! - [`spawn_with_callback`]: like `spawn`, with a per-task panic callback
//!   taking precedence over the global hook.
//!
//! Panics go to the hook installed with [`set_panic_hook`], or to the
//! `tracing` error log when none is installed.

use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Delay before a panicked task is relaunched.
pub const RESTART_COOLDOWN: Duration = Duration::from_secs(1);

/// Receives `(task_name, panic_message)`.
pub type PanicHook = Arc<dyn Fn(&str, &str) + Send + Sync>;

static PANIC_HOOK: Lazy<RwLock<Option<PanicHook>>> = Lazy::new(|| RwLock::new(None));

/// Routes every subsequent task panic to `hook` instead of the log.
pub fn set_panic_hook<F>(hook: F)
where
    F: Fn(&str, &str) + Send + Sync + 'static,
{
    *PANIC_HOOK.write() = Some(Arc::new(hook));
}

pub fn clear_panic_hook() {
    *PANIC_HOOK.write() = None;
}

enum Outcome {
    Finished,
    Panicked,
    Cancelled,
}

/// Aborts the wrapped task when the supervising future is dropped, so
/// aborting a supervisor also stops the work it watches.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn report_panic(name: &str, message: &str, callback: Option<&PanicHook>) {
    if let Some(callback) = callback {
        callback(name, message);
        return;
    }
    let hook = PANIC_HOOK.read().clone();
    match hook {
        Some(hook) => hook(name, message),
        None => error!(task = name, panic = message, "Task panicked"),
    }
}

async fn run_once<Fut, E>(name: &str, task: Fut, callback: Option<&PanicHook>) -> Outcome
where
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let mut guard = AbortOnDrop(tokio::spawn(task));
    match (&mut guard.0).await {
        Ok(Ok(())) => Outcome::Finished,
        Ok(Err(e)) => {
            error!(task = name, error = %e, "Task failed");
            Outcome::Finished
        }
        Err(e) if e.is_panic() => {
            report_panic(name, &panic_message(e.into_panic()), callback);
            Outcome::Panicked
        }
        Err(_) => Outcome::Cancelled,
    }
}

/// Runs `task` once; a panic or error is reported and the task ends.
pub fn spawn<Fut, E>(name: impl Into<String>, task: Fut) -> JoinHandle<()>
where
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        run_once(&name, task, None).await;
    })
}

/// Runs `task` once, sending a panic to `callback` rather than the global hook.
pub fn spawn_with_callback<Fut, E, C>(name: impl Into<String>, task: Fut, callback: C) -> JoinHandle<()>
where
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
    C: Fn(&str, &str) + Send + Sync + 'static,
{
    let name = name.into();
    let callback: PanicHook = Arc::new(callback);
    tokio::spawn(async move {
        run_once(&name, task, Some(&callback)).await;
    })
}

/// Runs the task built by `factory`, relaunching it after
/// [`RESTART_COOLDOWN`] every time it panics.
///
/// The returned handle completes once the task returns normally. Aborting
/// it also aborts the current attempt.
pub fn spawn_with_restart<F, Fut, E>(name: impl Into<String>, factory: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        loop {
            match run_once(&name, factory(), None).await {
                Outcome::Panicked => {
                    warn!(task = %name, cooldown = ?RESTART_COOLDOWN, "Restarting task after panic");
                    tokio::time::sleep(RESTART_COOLDOWN).await;
                }
                Outcome::Finished | Outcome::Cancelled => break,
            }
        }
    })
}
