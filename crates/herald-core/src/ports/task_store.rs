//! TaskStore port: the durable table of tasks.
//!
//! A [`TaskStore`] hands out [`Session`]s. One session spans one dispatch
//! pass (or one producer's batch of inserts); writes become durable on
//! [`Session::commit`]. Handlers receive the dispatcher's session, so rows
//! they insert are committed together with the outcome of the row that
//! created them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Eligibility, NewTask, Task, TaskId, TaskKind, TaskStatus};
use crate::error::StoreError;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Whether the `tasks` table exists. A not-yet-migrated database answers `false`.
    async fn has_schema(&self) -> Result<bool, StoreError>;

    /// Open a unit of work.
    async fn session(&self) -> Result<Box<dyn Session>, StoreError>;
}

#[async_trait]
pub trait Session: Send {
    /// Rows eligible at `now`, ordered by `scheduled_at` then `id`, ascending.
    async fn eligible(
        &mut self,
        now: DateTime<Utc>,
        rules: &Eligibility,
    ) -> Result<Vec<Task>, StoreError>;

    async fn get(&mut self, id: TaskId) -> Result<Option<Task>, StoreError>;

    async fn insert(&mut self, task: NewTask) -> Result<TaskId, StoreError>;

    /// Persist the mutable columns (`scheduled_at`, `status`, `attempts`,
    /// `last_error`, `updated_at`) of an existing row.
    async fn update(&mut self, task: &Task) -> Result<(), StoreError>;

    async fn exists_kind(&mut self, kind: &TaskKind) -> Result<bool, StoreError>;

    /// Rows of `kind` currently in `status`, oldest first.
    async fn find(&mut self, kind: &TaskKind, status: TaskStatus)
    -> Result<Vec<Task>, StoreError>;

    /// Most recently created rows first.
    async fn list(&mut self, limit: usize) -> Result<Vec<Task>, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}
