use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::builder::SchedulerBuilder;
use super::dispatch::Dispatcher;
use super::periodic::{PeriodicWorker, WorkerHandle};
use crate::domain::{Interval, NewTask, TaskKind};
use crate::error::{HeraldError, StoreError};
use crate::ports::TaskStore;

/// Owns the background loop that runs [`Dispatcher::process_pending`].
pub struct Scheduler {
    dispatcher: Arc<Dispatcher>,
    store: Arc<dyn TaskStore>,
    seed_kinds: Vec<TaskKind>,
    worker: PeriodicWorker,
    // start() を直列化して seed の二重投入を防ぐ
    starting: Mutex<()>,
}

impl Scheduler {
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        store: Arc<dyn TaskStore>,
        seed_kinds: Vec<TaskKind>,
        poll_interval: Interval,
    ) -> Self {
        let pass = Arc::clone(&dispatcher);
        let worker = PeriodicWorker::new(
            move || {
                let dispatcher = Arc::clone(&pass);
                async move { dispatcher.process_pending().await.map(|_| ()) }
            },
            poll_interval,
        )
        .named("scheduler");

        Self {
            dispatcher,
            store,
            seed_kinds,
            worker,
            starting: Mutex::new(()),
        }
    }

    /// Start polling.
    ///
    /// Returns the running loop's handle; calling it again while running
    /// returns the same handle. Returns `Ok(None)` without starting when the
    /// `tasks` table does not exist yet.
    pub async fn start(&self) -> Result<Option<WorkerHandle>, HeraldError> {
        let _starting = self.starting.lock().await;
        if self.worker.is_running() {
            return Ok(Some(self.worker.start().await));
        }

        if !self.store.has_schema().await? {
            warn!("tasks table missing; scheduler not started");
            return Ok(None);
        }

        let seeded = self.seed().await?;
        let handle = self.worker.start().await;
        info!(run = handle.id(), seeded, "scheduler started");
        Ok(Some(handle))
    }

    /// Stop polling. Returns once the in-flight pass, if any, has finished.
    pub async fn stop(&self) {
        let _starting = self.starting.lock().await;
        if self.worker.is_running() {
            self.worker.stop().await;
            info!("scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Start, wait for `shutdown`, then stop.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<(), HeraldError> {
        if self.start().await?.is_none() {
            return Ok(());
        }
        shutdown.await;
        self.stop().await;
        Ok(())
    }

    /// Insert one pending row for each seed kind that has no row at all.
    async fn seed(&self) -> Result<usize, StoreError> {
        if self.seed_kinds.is_empty() {
            return Ok(0);
        }
        let mut session = self.store.session().await?;
        let mut inserted = 0;
        for kind in &self.seed_kinds {
            if !session.exists_kind(kind).await? {
                session.insert(NewTask::new(kind.clone())).await?;
                inserted += 1;
            }
        }
        session.commit().await?;
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Task, TaskStatus};
    use crate::error::HandlerError;
    use crate::impls::InMemoryTaskStore;
    use crate::runtime::{TaskContext, TaskHandler};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Noop;

    #[async_trait]
    impl TaskHandler for Noop {
        async fn handle(&self, _task: &Task, _ctx: &mut TaskContext<'_>) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn scheduler(store: Arc<InMemoryTaskStore>, poll: Duration) -> Scheduler {
        Scheduler::builder()
            .store(store)
            .register("echo", Arc::new(Noop))
            .poll_interval(poll)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn start_twice_returns_the_same_handle() {
        let scheduler = scheduler(Arc::new(InMemoryTaskStore::new()), Duration::from_millis(5));

        let first = scheduler.start().await.unwrap().unwrap();
        let second = scheduler.start().await.unwrap().unwrap();
        assert_eq!(first, second);
        assert!(scheduler.is_running());

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        assert!(first.is_finished());

        // stopping again is harmless
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn missing_table_means_no_start() {
        let scheduler = scheduler(
            Arc::new(InMemoryTaskStore::without_schema()),
            Duration::from_millis(5),
        );
        assert!(scheduler.start().await.unwrap().is_none());
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn due_rows_are_processed_in_the_background() {
        let store = Arc::new(InMemoryTaskStore::new());
        let id = {
            let mut session = store.session().await.unwrap();
            let id = session.insert(NewTask::new("echo")).await.unwrap();
            session.commit().await.unwrap();
            id
        };
        let scheduler = scheduler(store.clone(), Duration::from_millis(5));

        scheduler.start().await.unwrap();
        let mut status = TaskStatus::Pending;
        for _ in 0..200 {
            status = store.task(id).await.unwrap().status;
            if status == TaskStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        scheduler.stop().await;

        assert_eq!(status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn seed_kinds_are_inserted_once() {
        let store = Arc::new(InMemoryTaskStore::new());
        let scheduler = Scheduler::builder()
            .store(store.clone())
            .seed("heartbeat")
            .seed("heartbeat")
            .poll_interval(Duration::from_secs(60))
            .build()
            .unwrap();

        scheduler.start().await.unwrap();
        scheduler.stop().await;
        scheduler.start().await.unwrap();
        scheduler.stop().await;

        let heartbeats = store
            .snapshot()
            .await
            .into_iter()
            .filter(|t| t.kind == TaskKind::new("heartbeat"))
            .count();
        assert_eq!(heartbeats, 1);
    }

    #[tokio::test]
    async fn run_until_stops_after_shutdown() {
        let scheduler = scheduler(Arc::new(InMemoryTaskStore::new()), Duration::from_millis(5));
        scheduler
            .run_until(tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(!scheduler.is_running());
    }
}
