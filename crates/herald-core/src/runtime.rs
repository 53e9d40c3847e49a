use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{RecurrencePolicy, Task, TaskKind};
use crate::error::HandlerError;
use crate::ports::{Capabilities, Clock, Session};
use crate::typed::{Handler, TypedHandler, TypedTask};

/// A handler for one task kind.
///
/// The row is borrowed immutably: status and attempt bookkeeping belong to
/// the dispatcher. Rows inserted through `ctx.session` are committed with the
/// outcome of this one.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task, ctx: &mut TaskContext<'_>) -> Result<(), HandlerError>;
}

/// What a handler can reach while it runs.
pub struct TaskContext<'a> {
    pub session: &'a mut dyn Session,
    pub clock: &'a dyn Clock,
    pub capabilities: &'a Capabilities,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        session: &'a mut dyn Session,
        clock: &'a dyn Clock,
        capabilities: &'a Capabilities,
    ) -> Self {
        Self {
            session,
            clock,
            capabilities,
        }
    }
}

/// A handler plus the recurrence attached when it was registered.
#[derive(Clone)]
pub struct Registration {
    pub handler: Arc<dyn TaskHandler>,
    pub recurrence: RecurrencePolicy,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("recurrence", &self.recurrence)
            .finish_non_exhaustive()
    }
}

/// Registry of handlers (kind -> registration).
///
/// Built during initialization, then shared read-only by the dispatcher.
/// Registering a kind twice replaces the earlier handler.
#[derive(Default, Clone, Debug)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskKind, Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a run-once handler. Returns the registration it replaced, if any.
    pub fn register(
        &mut self,
        kind: impl Into<TaskKind>,
        handler: Arc<dyn TaskHandler>,
    ) -> Option<Registration> {
        self.register_recurring(kind, handler, RecurrencePolicy::Once)
    }

    pub fn register_recurring(
        &mut self,
        kind: impl Into<TaskKind>,
        handler: Arc<dyn TaskHandler>,
        recurrence: RecurrencePolicy,
    ) -> Option<Registration> {
        let kind = kind.into();
        let previous = self.handlers.insert(
            kind.clone(),
            Registration {
                handler,
                recurrence,
            },
        );
        if previous.is_some() {
            warn!(%kind, "handler re-registered; last registration wins");
        }
        previous
    }

    /// Register a [`Handler<T>`] under `T::KIND`; payloads are decoded before it runs.
    pub fn register_typed<T, H>(&mut self, handler: H, recurrence: RecurrencePolicy) -> Option<Registration>
    where
        T: TypedTask,
        H: Handler<T> + 'static,
    {
        self.register_recurring(T::kind(), Arc::new(TypedHandler::<T, H>::new(handler)), recurrence)
    }

    pub fn get(&self, kind: &TaskKind) -> Option<&Registration> {
        self.handlers.get(kind)
    }

    pub fn contains(&self, kind: &TaskKind) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
