//! Engine runtime: owns the subsystem registry, the event bus shared with
//! every subsystem, and the stop signal that unblocks `start`.
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{error, info, warn};

use tessera_core::events::EventBus;

use super::error::{EngineError, StopErrors};
use super::subsystem::{Subsystem, SubsystemState};

/// Lifecycle hook run before or after a whole Init/Start sequence.
pub type Hook = Box<dyn FnOnce(&Engine) -> anyhow::Result<()> + Send>;

/// Optional pre/post hooks for [`Engine::init`] and [`Engine::start`].
#[derive(Default)]
pub struct Hooks {
    pre: Option<Hook>,
    post: Option<Hook>,
}

impl Hooks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn pre<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Engine) -> anyhow::Result<()> + Send + 'static,
    {
        self.pre = Some(Box::new(hook));
        self
    }

    pub fn post<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Engine) -> anyhow::Result<()> + Send + 'static,
    {
        self.post = Some(Box::new(hook));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Subsystems may still be added; lasts through the init pre-hook.
    Registering,
    Initializing,
    Initialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    /// Init or Start aborted. Terminal.
    Failed,
}

struct Entry {
    name: String,
    subsystem: Arc<dyn Subsystem>,
    instance: Arc<dyn Any + Send + Sync>,
    state: SubsystemState,
}

#[derive(Default)]
struct Registry {
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
    by_type: HashMap<TypeId, usize>,
}

/// Ordered subsystem lifecycle orchestrator.
///
/// One engine per process is expected, created by the binary's bootstrap
/// and shared by `Arc`; nothing here is global.
pub struct Engine {
    events: Arc<EventBus>,
    registry: RwLock<Registry>,
    phase: Mutex<Phase>,
    stop_tx: watch::Sender<bool>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_events(Arc::new(EventBus::new()))
    }

    pub fn with_events(events: Arc<EventBus>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            events,
            registry: RwLock::new(Registry::default()),
            phase: Mutex::new(Phase::Registering),
            stop_tx,
        }
    }

    /// The bus subsystems publish on and handlers subscribe to.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Builds a subsystem and appends it to the lifecycle order.
    ///
    /// Only allowed before Init begins (the init pre-hook included).
    pub fn register_subsystem<T, F>(&self, factory: F) -> Result<Arc<T>, EngineError>
    where
        T: Subsystem,
        F: FnOnce(&Engine) -> T,
    {
        let subsystem = Arc::new(factory(self));
        let name = subsystem.name().to_string();

        let mut registry = self.registry.write();
        if self.phase() != Phase::Registering {
            return Err(EngineError::RegistrationClosed(name));
        }
        if registry.by_name.contains_key(&name) {
            return Err(EngineError::DuplicateSubsystem(name));
        }

        let index = registry.entries.len();
        registry.by_name.insert(name.clone(), index);
        // First registration of a type wins typed lookup.
        registry.by_type.entry(TypeId::of::<T>()).or_insert(index);
        registry.entries.push(Entry {
            name: name.clone(),
            subsystem: subsystem.clone(),
            instance: subsystem.clone(),
            state: SubsystemState::Registered,
        });

        info!(subsystem = %name, "Subsystem registered");
        Ok(subsystem)
    }

    /// Typed lookup.
    pub fn subsystem<T: Subsystem>(&self) -> Option<Arc<T>> {
        let registry = self.registry.read();
        let index = *registry.by_type.get(&TypeId::of::<T>())?;
        registry
            .entries
            .get(index)?
            .instance
            .clone()
            .downcast::<T>()
            .ok()
    }

    /// Typed lookup that reports a missing subsystem as an error.
    pub fn require<T: Subsystem>(&self) -> Result<Arc<T>, EngineError> {
        self.subsystem::<T>()
            .ok_or_else(|| EngineError::SubsystemNotFound(type_name::<T>().to_string()))
    }

    pub fn subsystem_by_name(&self, name: &str) -> Result<Arc<dyn Subsystem>, EngineError> {
        let registry = self.registry.read();
        registry
            .by_name
            .get(name)
            .and_then(|&index| registry.entries.get(index))
            .map(|entry| entry.subsystem.clone())
            .ok_or_else(|| EngineError::SubsystemNotFound(name.to_string()))
    }

    pub fn subsystem_state(&self, name: &str) -> Option<SubsystemState> {
        let registry = self.registry.read();
        let index = *registry.by_name.get(name)?;
        registry.entries.get(index).map(|entry| entry.state)
    }

    /// Registered subsystem names in lifecycle order.
    pub fn subsystem_names(&self) -> Vec<String> {
        self.registry
            .read()
            .entries
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Runs `init` on every subsystem in registration order, stopping at
    /// the first failure.
    pub async fn init(&self, hooks: Hooks) -> Result<(), EngineError> {
        self.expect_phase("init", Phase::Registering)?;
        info!("Engine init begin");

        let Hooks { pre, post } = hooks;
        self.run_hook(pre, "init pre")?;
        self.set_phase(Phase::Initializing);

        for (index, name, subsystem) in self.snapshot() {
            info!(subsystem = %name, "Subsystem init begin");
            if let Err(source) = subsystem.init().await {
                error!(subsystem = %name, error = %source, "Subsystem init failed");
                self.set_phase(Phase::Failed);
                return Err(EngineError::Init {
                    subsystem: name,
                    source,
                });
            }
            self.set_state(index, SubsystemState::Initialized);
            info!(subsystem = %name, "Subsystem init end");
        }

        self.run_hook(post, "init post")?;
        self.set_phase(Phase::Initialized);
        info!("Engine init end");
        Ok(())
    }

    /// Starts every subsystem in registration order, then waits for
    /// [`stop`](Self::stop) unless `stop_immediately` is set, then stops
    /// every started subsystem in the same order.
    ///
    /// A start failure stops the subsystems already started and returns the
    /// start error; later subsystems are never started.
    pub async fn start(&self, hooks: Hooks, stop_immediately: bool) -> Result<(), EngineError> {
        self.expect_phase("start", Phase::Initialized)?;
        self.set_phase(Phase::Starting);
        info!("Engine start begin");

        let Hooks { pre, post } = hooks;
        self.run_hook(pre, "start pre")?;

        for (index, name, subsystem) in self.snapshot() {
            info!(subsystem = %name, "Subsystem start begin");
            if let Err(source) = subsystem.start().await {
                error!(subsystem = %name, error = %source, "Subsystem start failed");
                self.rollback().await;
                return Err(EngineError::Start {
                    subsystem: name,
                    source,
                });
            }
            self.set_state(index, SubsystemState::Started);
            info!(subsystem = %name, "Subsystem start end");
        }

        if let Err(e) = self.run_hook(post, "start post") {
            self.rollback().await;
            return Err(e);
        }

        self.set_phase(Phase::Running);
        info!("Engine start end");

        if !stop_immediately {
            self.wait_for_stop().await;
        }

        let errors = self.stop_started().await;
        self.set_phase(Phase::Stopped);
        info!("Engine stopped");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Stop(errors))
        }
    }

    /// Signals a blocked [`start`](Self::start) to shut down. Signalling
    /// before `start` makes it return right after starting.
    pub fn stop(&self) {
        info!("Engine stop requested");
        self.stop_tx.send_replace(true);
    }

    async fn wait_for_stop(&self) {
        let mut stop_rx = self.stop_tx.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = stop_rx.wait_for(|stopped| *stopped).await;
    }

    async fn rollback(&self) {
        let errors = self.stop_started().await;
        for (subsystem, error) in errors.iter() {
            warn!(subsystem, error = %error, "Subsystem stop failed during rollback");
        }
        self.set_phase(Phase::Failed);
    }

    /// Stops, in registration order, each subsystem that reached Started.
    async fn stop_started(&self) -> StopErrors {
        self.set_phase(Phase::Stopping);
        let mut errors = StopErrors::default();

        for (index, name, subsystem) in self.snapshot() {
            if self.state_at(index) != Some(SubsystemState::Started) {
                continue;
            }
            if let Err(error) = subsystem.stop().await {
                error!(subsystem = %name, error = %error, "Subsystem stop failed");
                errors.push(name, error);
            }
            self.set_state(index, SubsystemState::Stopped);
        }
        errors
    }

    fn run_hook(&self, hook: Option<Hook>, stage: &'static str) -> Result<(), EngineError> {
        let Some(hook) = hook else {
            return Ok(());
        };
        hook(self).map_err(|source| {
            error!(stage, error = %source, "Engine hook failed");
            self.set_phase(Phase::Failed);
            EngineError::Hook { stage, source }
        })
    }

    /// Copies out the ordered list so no lock is held across `.await`.
    fn snapshot(&self) -> Vec<(usize, String, Arc<dyn Subsystem>)> {
        self.registry
            .read()
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (index, entry.name.clone(), entry.subsystem.clone()))
            .collect()
    }

    fn state_at(&self, index: usize) -> Option<SubsystemState> {
        self.registry.read().entries.get(index).map(|e| e.state)
    }

    fn set_state(&self, index: usize, state: SubsystemState) {
        if let Some(entry) = self.registry.write().entries.get_mut(index) {
            entry.state = state;
        }
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    fn expect_phase(&self, operation: &'static str, expected: Phase) -> Result<(), EngineError> {
        let phase = self.phase();
        if phase == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidPhase { operation, phase })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use tracing_test::traced_test;

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Records every lifecycle call and fails the configured ones.
    struct Recorder {
        name: String,
        journal: Journal,
        fail: &'static [&'static str],
    }

    impl Recorder {
        fn new(name: &str, journal: &Journal) -> Self {
            Self::failing(name, journal, &[])
        }

        fn failing(name: &str, journal: &Journal, fail: &'static [&'static str]) -> Self {
            Self {
                name: name.to_string(),
                journal: journal.clone(),
                fail,
            }
        }

        fn record(&self, step: &str) -> anyhow::Result<()> {
            self.journal.lock().push(format!("{}.{}", self.name, step));
            if self.fail.contains(&step) {
                return Err(anyhow!("{} refused to {}", self.name, step));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Subsystem for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        async fn init(&self) -> anyhow::Result<()> {
            self.record("init")
        }

        async fn start(&self) -> anyhow::Result<()> {
            self.record("start")
        }

        async fn stop(&self) -> anyhow::Result<()> {
            self.record("stop")
        }
    }

    /// A second concrete type, for typed lookup.
    struct Marker;

    #[async_trait]
    impl Subsystem for Marker {
        fn name(&self) -> &str {
            "marker"
        }
        async fn init(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn engine_with(journal: &Journal, subsystems: Vec<Recorder>) -> Engine {
        let engine = Engine::new();
        for subsystem in subsystems {
            engine.register_subsystem(|_| subsystem).unwrap();
        }
        assert!(journal.lock().is_empty());
        engine
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.lock().clone()
    }

    #[tokio::test]
    async fn lifecycle_runs_in_registration_order() {
        let journal = Journal::default();
        let engine = engine_with(
            &journal,
            vec![
                Recorder::new("a", &journal),
                Recorder::new("b", &journal),
                Recorder::new("c", &journal),
            ],
        );

        let (j1, j2, j3, j4) = (
            journal.clone(),
            journal.clone(),
            journal.clone(),
            journal.clone(),
        );
        engine
            .init(
                Hooks::none()
                    .pre(move |_| {
                        j1.lock().push("init.pre".into());
                        Ok(())
                    })
                    .post(move |_| {
                        j2.lock().push("init.post".into());
                        Ok(())
                    }),
            )
            .await
            .unwrap();
        engine
            .start(
                Hooks::none()
                    .pre(move |_| {
                        j3.lock().push("start.pre".into());
                        Ok(())
                    })
                    .post(move |_| {
                        j4.lock().push("start.post".into());
                        Ok(())
                    }),
                true,
            )
            .await
            .unwrap();

        assert_eq!(
            entries(&journal),
            [
                "init.pre", "a.init", "b.init", "c.init", "init.post", "start.pre", "a.start",
                "b.start", "c.start", "start.post", "a.stop", "b.stop", "c.stop",
            ]
        );
        assert_eq!(engine.phase(), Phase::Stopped);
        assert_eq!(engine.subsystem_state("b"), Some(SubsystemState::Stopped));
    }

    #[tokio::test]
    async fn init_failure_aborts_remaining_subsystems() {
        let journal = Journal::default();
        let engine = engine_with(
            &journal,
            vec![
                Recorder::new("a", &journal),
                Recorder::failing("b", &journal, &["init"]),
                Recorder::new("c", &journal),
            ],
        );

        let err = engine.init(Hooks::none()).await.unwrap_err();
        match &err {
            EngineError::Init { subsystem, .. } => assert_eq!(subsystem, "b"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("'b'"));
        assert_eq!(entries(&journal), ["a.init", "b.init"]);
        assert_eq!(engine.subsystem_state("c"), Some(SubsystemState::Registered));
        assert_eq!(engine.phase(), Phase::Failed);

        // A failed engine can't be started.
        assert!(matches!(
            engine.start(Hooks::none(), true).await,
            Err(EngineError::InvalidPhase { operation: "start", .. })
        ));
    }

    #[tokio::test]
    async fn start_failure_rolls_back_started_subsystems() {
        let journal = Journal::default();
        let engine = engine_with(
            &journal,
            vec![
                Recorder::new("a", &journal),
                Recorder::failing("b", &journal, &["start"]),
                Recorder::new("c", &journal),
            ],
        );
        engine.init(Hooks::none()).await.unwrap();
        journal.lock().clear();

        let err = engine.start(Hooks::none(), true).await.unwrap_err();
        assert!(matches!(err, EngineError::Start { ref subsystem, .. } if subsystem == "b"));
        assert_eq!(entries(&journal), ["a.start", "b.start", "a.stop"]);
        assert_eq!(engine.subsystem_state("a"), Some(SubsystemState::Stopped));
        assert_eq!(engine.subsystem_state("c"), Some(SubsystemState::Initialized));
    }

    #[tokio::test]
    async fn stop_errors_are_collected() {
        let journal = Journal::default();
        let engine = engine_with(
            &journal,
            vec![
                Recorder::failing("a", &journal, &["stop"]),
                Recorder::new("b", &journal),
                Recorder::failing("c", &journal, &["stop"]),
            ],
        );
        engine.init(Hooks::none()).await.unwrap();

        let err = engine.start(Hooks::none(), true).await.unwrap_err();
        let EngineError::Stop(errors) = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.subsystems().collect::<Vec<_>>(), ["a", "c"]);
        assert!(entries(&journal).ends_with(&["a.stop".into(), "b.stop".into(), "c.stop".into()]));

        let rendered = err.to_string();
        assert!(rendered.contains("a: a refused to stop"));
        assert!(rendered.contains("c: c refused to stop"));
    }

    #[tokio::test]
    async fn start_blocks_until_stopped() {
        let journal = Journal::default();
        let engine = Arc::new(engine_with(&journal, vec![Recorder::new("a", &journal)]));
        engine.init(Hooks::none()).await.unwrap();

        let running = tokio::spawn({
            let engine = engine.clone();
            async move { engine.start(Hooks::none(), false).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!running.is_finished());
        assert_eq!(engine.phase(), Phase::Running);
        assert_eq!(entries(&journal), ["a.init", "a.start"]);

        engine.stop();
        tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .expect("start returns after stop")
            .unwrap()
            .unwrap();
        assert_eq!(entries(&journal), ["a.init", "a.start", "a.stop"]);
    }

    #[tokio::test]
    async fn early_stop_signal_is_not_lost() {
        let journal = Journal::default();
        let engine = engine_with(&journal, vec![Recorder::new("a", &journal)]);
        engine.init(Hooks::none()).await.unwrap();

        engine.stop();
        tokio::time::timeout(Duration::from_secs(1), engine.start(Hooks::none(), false))
            .await
            .expect("start does not block")
            .unwrap();
    }

    #[tokio::test]
    async fn registration_closes_after_init_pre_hook() {
        let engine = Engine::new();
        engine
            .init(Hooks::none().pre(|engine| {
                engine.register_subsystem(|_| Marker)?;
                Ok(())
            }))
            .await
            .unwrap();

        assert_eq!(engine.subsystem_names(), ["marker"]);
        let journal = Journal::default();
        assert!(matches!(
            engine.register_subsystem(|_| Recorder::new("late", &journal)),
            Err(EngineError::RegistrationClosed(name)) if name == "late"
        ));
    }

    #[tokio::test]
    async fn lookup_by_type_and_name() {
        let journal = Journal::default();
        let engine = Engine::new();
        let marker = engine.register_subsystem(|_| Marker).unwrap();
        engine
            .register_subsystem(|_| Recorder::new("recorder", &journal))
            .unwrap();

        let found = engine.subsystem::<Marker>().unwrap();
        assert!(Arc::ptr_eq(&marker, &found));
        assert_eq!(engine.require::<Recorder>().unwrap().name(), "recorder");
        assert_eq!(engine.subsystem_by_name("marker").unwrap().name(), "marker");
        assert!(matches!(
            engine.subsystem_by_name("missing"),
            Err(EngineError::SubsystemNotFound(_))
        ));

        let empty = Engine::new();
        assert!(empty.subsystem::<Marker>().is_none());
        assert!(matches!(
            empty.require::<Marker>(),
            Err(EngineError::SubsystemNotFound(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let journal = Journal::default();
        let engine = Engine::new();
        engine
            .register_subsystem(|_| Recorder::new("a", &journal))
            .unwrap();
        assert!(matches!(
            engine.register_subsystem(|_| Recorder::new("a", &journal)),
            Err(EngineError::DuplicateSubsystem(name)) if name == "a"
        ));
    }

    #[tokio::test]
    async fn hook_failure_is_reported() {
        let engine = Engine::new();
        let err = engine
            .init(Hooks::none().pre(|_| Err(anyhow!("no config"))))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Hook { stage: "init pre", .. }));
        assert_eq!(engine.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn start_requires_init() {
        let engine = Engine::new();
        assert!(matches!(
            engine.start(Hooks::none(), true).await,
            Err(EngineError::InvalidPhase {
                operation: "start",
                phase: Phase::Registering
            })
        ));
    }

    #[traced_test]
    #[tokio::test]
    async fn lifecycle_is_logged() {
        let journal = Journal::default();
        let engine = engine_with(&journal, vec![Recorder::new("a", &journal)]);
        engine.init(Hooks::none()).await.unwrap();
        engine.start(Hooks::none(), true).await.unwrap();

        assert!(logs_contain("Engine init begin"));
        assert!(logs_contain("Subsystem start end"));
        assert!(logs_contain("Engine stopped"));
    }
}
