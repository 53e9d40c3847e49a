//! In-memory TaskStore for tests and embedding.
//!
//! Rows live in a `BTreeMap` behind a tokio `Mutex`; ids come from a counter.
//! Writes apply immediately, so `commit` has nothing to do.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{Eligibility, NewTask, Task, TaskId, TaskKind, TaskStatus};
use crate::error::StoreError;
use crate::ports::{Clock, Session, SystemClock, TaskStore};

struct MemoryState {
    /// Single source of truth for rows.
    rows: BTreeMap<TaskId, Task>,
    next_id: i64,
}

impl MemoryState {
    fn new() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_id);
        self.next_id += 1;
        id
    }
}

#[derive(Clone)]
pub struct InMemoryTaskStore {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
    has_schema: bool,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Timestamps on inserted rows come from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::new())),
            clock,
            has_schema: true,
        }
    }

    /// A store whose table was never created; sessions fail to open.
    pub fn without_schema() -> Self {
        Self {
            has_schema: false,
            ..Self::new()
        }
    }

    /// Copy of every row, by id.
    pub async fn snapshot(&self) -> Vec<Task> {
        self.state.lock().await.rows.values().cloned().collect()
    }

    pub async fn task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().await.rows.get(&id).cloned()
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn has_schema(&self) -> Result<bool, StoreError> {
        Ok(self.has_schema)
    }

    async fn session(&self) -> Result<Box<dyn Session>, StoreError> {
        if !self.has_schema {
            return Err(StoreError::MissingSchema);
        }
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl Session for MemorySession {
    async fn eligible(
        &mut self,
        now: DateTime<Utc>,
        rules: &Eligibility,
    ) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock().await;
        let mut due: Vec<Task> = state
            .rows
            .values()
            .filter(|task| task.is_eligible(now, rules))
            .cloned()
            .collect();
        due.sort_by_key(|task| (task.scheduled_at, task.id));
        Ok(due)
    }

    async fn get(&mut self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.state.lock().await.rows.get(&id).cloned())
    }

    async fn insert(&mut self, task: NewTask) -> Result<TaskId, StoreError> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        state.rows.insert(id, task.into_task(id, now));
        Ok(id)
    }

    async fn update(&mut self, task: &Task) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let Some(row) = state.rows.get_mut(&task.id) else {
            return Err(StoreError::Corrupt(format!("{} does not exist", task.id)));
        };
        row.scheduled_at = task.scheduled_at;
        row.status = task.status;
        row.attempts = task.attempts;
        row.last_error = task.last_error.clone();
        row.updated_at = task.updated_at;
        Ok(())
    }

    async fn exists_kind(&mut self, kind: &TaskKind) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        Ok(state.rows.values().any(|task| &task.kind == kind))
    }

    async fn find(
        &mut self,
        kind: &TaskKind,
        status: TaskStatus,
    ) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .values()
            .filter(|task| &task.kind == kind && task.status == status)
            .cloned()
            .collect())
    }

    async fn list(&mut self, limit: usize) -> Result<Vec<Task>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.rows.values().rev().take(limit).cloned().collect())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
