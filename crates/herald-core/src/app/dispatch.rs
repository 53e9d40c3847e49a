//! One dispatch pass over the due rows.
//!
//! Rows are claimed, run, and concluded one at a time inside a single
//! session; each row's outcome is committed before the next row starts.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn};

use super::periodic::panic_message;
use crate::domain::{Eligibility, NewTask, Task, TaskStatus};
use crate::error::{HeraldError, StoreError};
use crate::ports::{Capabilities, Clock, Session, TaskStore};
use crate::runtime::{HandlerRegistry, Registration, TaskContext};

/// Longest `last_error` kept, in characters.
pub const MAX_ERROR_LEN: usize = 2000;

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    capabilities: Capabilities,
    eligibility: Eligibility,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn TaskStore>,
        registry: Arc<HandlerRegistry>,
        clock: Arc<dyn Clock>,
        capabilities: Capabilities,
        eligibility: Eligibility,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            capabilities,
            eligibility,
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn eligibility(&self) -> &Eligibility {
        &self.eligibility
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Run every row that is due now, oldest `scheduled_at` first.
    ///
    /// A handler failure is recorded on its row and does not stop the pass.
    /// Storage failures abort the pass; rows already concluded stay committed.
    pub async fn process_pending(&self) -> Result<PassReport, HeraldError> {
        let now = self.clock.now();
        let mut session = self.store.session().await?;
        let due = session.eligible(now, &self.eligibility).await?;
        if due.is_empty() {
            debug!("no tasks due");
            return Ok(PassReport::default());
        }

        let mut report = PassReport {
            selected: due.len(),
            ..PassReport::default()
        };
        for task in due {
            if self.dispatch_one(session.as_mut(), task).await? {
                report.completed += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            selected = report.selected,
            completed = report.completed,
            failed = report.failed,
            "dispatch pass finished"
        );
        Ok(report)
    }

    /// Returns whether the handler succeeded.
    async fn dispatch_one(
        &self,
        session: &mut dyn Session,
        mut task: Task,
    ) -> Result<bool, StoreError> {
        task.claim(self.clock.now());
        session.update(&task).await?;
        session.commit().await?;

        let registration = self.registry.get(&task.kind);
        let outcome = match registration {
            Some(registration) => self.invoke(registration, &task, &mut *session).await,
            None => {
                warn!(task_id = %task.id, kind = %task.kind, "no handler registered");
                Err(format!("no handler for {}", task.kind))
            }
        };

        let succeeded = outcome.is_ok();
        task.conclude(outcome.map_err(truncate_error), self.clock.now());
        session.update(&task).await?;
        if let Some(registration) = registration {
            self.schedule_follow_up(registration, &task, &mut *session)
                .await?;
        }
        session.commit().await?;

        if succeeded {
            debug!(task_id = %task.id, kind = %task.kind, attempts = task.attempts, "task completed");
        } else {
            warn!(
                task_id = %task.id,
                kind = %task.kind,
                attempts = task.attempts,
                error = task.last_error.as_deref().unwrap_or_default(),
                "task failed"
            );
        }
        Ok(succeeded)
    }

    async fn invoke(
        &self,
        registration: &Registration,
        task: &Task,
        session: &mut dyn Session,
    ) -> Result<(), String> {
        let mut ctx = TaskContext::new(session, self.clock.as_ref(), &self.capabilities);
        let call = AssertUnwindSafe(registration.handler.handle(task, &mut ctx))
            .catch_unwind()
            .await;
        match call {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(format!(
                "handler panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    /// Recurring kinds get a fresh row once this one is done for good.
    async fn schedule_follow_up(
        &self,
        registration: &Registration,
        task: &Task,
        session: &mut dyn Session,
    ) -> Result<(), StoreError> {
        let done = task.status == TaskStatus::Completed
            || task.is_exhausted(self.eligibility.max_attempts);
        if !done {
            return Ok(());
        }
        let Some(next) = registration.recurrence.next_run(self.clock.now()) else {
            return Ok(());
        };
        let id = session
            .insert(NewTask {
                kind: task.kind.clone(),
                payload: task.payload.clone(),
                scheduled_at: Some(next),
            })
            .await?;
        debug!(task_id = %id, kind = %task.kind, scheduled_at = %next, "recurring task scheduled");
        Ok(())
    }
}

fn truncate_error(mut message: String) -> String {
    if let Some((cut, _)) = message.char_indices().nth(MAX_ERROR_LEN) {
        message.truncate(cut);
    }
    message
}
