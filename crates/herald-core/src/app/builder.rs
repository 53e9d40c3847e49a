//! SchedulerBuilder - スケジューラの構築とワイヤリング
//!
//! - store / clock / capabilities / handler を集めて [`Scheduler`] を作る
//! - `expect_kinds()` で期待した kind に handler が無ければ build 時に失敗する

use std::sync::Arc;

use crate::config::Settings;
use crate::domain::{Interval, RecurrencePolicy, TaskKind};
use crate::handlers;
use crate::ports::{Capabilities, Clock, SystemClock, TaskStore};
use crate::runtime::{HandlerRegistry, TaskHandler};
use crate::typed::{Handler, TypedTask};

use super::dispatch::Dispatcher;
use super::scheduler::Scheduler;

/// Builds a [`Scheduler`].
///
/// ```ignore
/// let scheduler = SchedulerBuilder::new()
///     .settings(Settings::from_env()?)
///     .store(Arc::new(store))
///     .with_builtin_handlers()
///     .register("resize_image", Arc::new(ResizeHandler))
///     .expect_kinds(&["resize_image"])
///     .build()?;
/// ```
pub struct SchedulerBuilder {
    store: Option<Arc<dyn TaskStore>>,
    clock: Arc<dyn Clock>,
    registry: HandlerRegistry,
    capabilities: Capabilities,
    settings: Settings,
    poll_interval: Option<Interval>,
    seed_kinds: Vec<TaskKind>,
    expected_kinds: Option<Vec<TaskKind>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing handlers for kinds {0:?}; they were expected but never registered")]
    MissingKinds(Vec<TaskKind>),

    #[error("no task store configured")]
    MissingStore,
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            clock: Arc::new(SystemClock),
            registry: HandlerRegistry::new(),
            capabilities: Capabilities::default(),
            settings: Settings::default(),
            poll_interval: None,
            seed_kinds: Vec::new(),
            expected_kinds: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set before `with_builtin_handlers`, which reads intervals from here.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Override the poll period. Defaults to `SCHEDULER_POLL_INTERVAL`,
    /// re-read on every iteration.
    pub fn poll_interval(mut self, interval: impl Into<Interval>) -> Self {
        self.poll_interval = Some(interval.into());
        self
    }

    pub fn register(mut self, kind: impl Into<TaskKind>, handler: Arc<dyn TaskHandler>) -> Self {
        self.registry.register(kind, handler);
        self
    }

    pub fn register_recurring(
        mut self,
        kind: impl Into<TaskKind>,
        handler: Arc<dyn TaskHandler>,
        recurrence: RecurrencePolicy,
    ) -> Self {
        self.registry.register_recurring(kind, handler, recurrence);
        self
    }

    pub fn register_typed<T: TypedTask, H: Handler<T> + 'static>(
        mut self,
        handler: H,
        recurrence: RecurrencePolicy,
    ) -> Self {
        self.registry.register_typed::<T, H>(handler, recurrence);
        self
    }

    /// Make sure one row of `kind` exists whenever the scheduler starts.
    pub fn seed(mut self, kind: impl Into<TaskKind>) -> Self {
        let kind = kind.into();
        if !self.seed_kinds.contains(&kind) {
            self.seed_kinds.push(kind);
        }
        self
    }

    /// Register every builtin handler and seed the recurring ones.
    pub fn with_builtin_handlers(mut self) -> Self {
        handlers::register_builtins(&mut self.registry, &self.settings);
        for kind in handlers::SEED_KINDS {
            self = self.seed(kind);
        }
        self
    }

    /// Kinds that must have a handler by the time `build()` runs.
    pub fn expect_kinds(mut self, kinds: &[&str]) -> Self {
        self.expected_kinds = Some(kinds.iter().map(|&k| TaskKind::new(k)).collect());
        self
    }

    pub fn build(self) -> Result<Scheduler, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;

        if let Some(expected) = &self.expected_kinds {
            let missing: Vec<TaskKind> = expected
                .iter()
                .filter(|kind| !self.registry.contains(kind))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingKinds(missing));
            }
        }

        let poll_interval = self
            .poll_interval
            .unwrap_or_else(|| self.settings.poll_interval_source());
        let dispatcher = Dispatcher::new(
            Arc::clone(&store),
            Arc::new(self.registry),
            self.clock,
            self.capabilities,
            self.settings.eligibility(),
        );
        Ok(Scheduler::new(
            Arc::new(dispatcher),
            store,
            self.seed_kinds,
            poll_interval,
        ))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
