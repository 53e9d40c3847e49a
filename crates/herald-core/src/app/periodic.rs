//! PeriodicWorker - 一定間隔でジョブを繰り返す単一のバックグラウンドループ
//!
//! - `start()` は冪等: 実行中なら同じ [`WorkerHandle`] を返す
//! - `stop()` は実行中の iteration の完了を待ってから戻る
//! - iteration の失敗や panic はログに残し、ループは継続する

use std::any::Any;
use std::error::Error;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::domain::Interval;

pub type TickError = Box<dyn Error + Send + Sync>;

/// One iteration of periodic work.
///
/// Any `Fn() -> impl Future<Output = Result<(), E>>` closure is a `Tick`.
pub trait Tick: Send + Sync + 'static {
    fn tick(&self) -> BoxFuture<'static, Result<(), TickError>>;
}

impl<F, Fut, E> Tick for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<TickError>,
{
    fn tick(&self) -> BoxFuture<'static, Result<(), TickError>> {
        let fut = self();
        Box::pin(async move { fut.await.map_err(Into::into) })
    }
}

/// Identifies one run of the loop. Two handles are equal iff they refer to
/// the same run.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    id: u64,
    finished: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the loop has exited and no iteration is in flight.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl PartialEq for WorkerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for WorkerHandle {}

struct Running {
    handle: WorkerHandle,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

pub struct PeriodicWorker {
    name: String,
    job: Arc<dyn Tick>,
    interval: Interval,
    running: tokio::sync::Mutex<Option<Running>>,
    current: Mutex<Option<WorkerHandle>>,
    next_id: AtomicU64,
}

impl PeriodicWorker {
    pub fn new(job: impl Tick, interval: impl Into<Interval>) -> Self {
        Self {
            name: "periodic".to_string(),
            job: Arc::new(job),
            interval: interval.into(),
            running: tokio::sync::Mutex::new(None),
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Name used in log lines.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Spawn the loop, or return the handle of the loop already running.
    ///
    /// Waits while a concurrent `stop()` drains the previous run, so two
    /// loops never overlap.
    pub async fn start(&self) -> WorkerHandle {
        let mut slot = self.running.lock().await;
        if let Some(running) = slot.as_ref() {
            if !running.join.is_finished() {
                return running.handle.clone();
            }
        }

        let handle = WorkerHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            finished: Arc::new(AtomicBool::new(false)),
        };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run_loop(
            self.name.clone(),
            Arc::clone(&self.job),
            self.interval.clone(),
            shutdown_rx,
            Arc::clone(&handle.finished),
        ));
        debug!(worker = %self.name, run = handle.id, "worker started");

        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle.clone());
        *slot = Some(Running {
            handle: handle.clone(),
            shutdown_tx,
            join,
        });
        handle
    }

    /// Signal the loop and wait for the in-flight iteration to finish.
    /// Calling it when nothing runs is a no-op.
    pub async fn stop(&self) {
        // join が終わるまでロックを保持する。並行する start/stop はここで待つ
        let mut slot = self.running.lock().await;
        let Some(running) = slot.take() else {
            return;
        };

        // 受信側が既に終了していても問題ない
        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.join.await {
            error!(worker = %self.name, error = %e, "worker task did not exit cleanly");
        }
        running.handle.finished.store(true, Ordering::Release);
        debug!(worker = %self.name, run = running.handle.id, "worker stopped");
    }

    /// True from `start()` until the run's loop has fully exited.
    pub fn is_running(&self) -> bool {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

async fn run_loop(
    name: String,
    job: Arc<dyn Tick>,
    interval: Interval,
    mut shutdown_rx: watch::Receiver<bool>,
    finished: Arc<AtomicBool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // job の同期部分で panic しても捕まえられるよう async ブロックで包む
        let outcome = AssertUnwindSafe(async { job.tick().await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(worker = %name, error = %e, "iteration failed"),
            Err(payload) => error!(
                worker = %name,
                panic = %panic_message(payload.as_ref()),
                "iteration panicked"
            ),
        }

        // sleep 中だけ shutdown と競合させる。iteration 中は中断しない
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::time::sleep(interval.current()) => {}
        }
    }
    finished.store(true, Ordering::Release);
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(5);

    fn counting_worker() -> (PeriodicWorker, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let worker = PeriodicWorker::new(
            move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), TickError>(())
                }
            },
            TICK,
        );
        (worker, count)
    }

    async fn wait_for(count: &AtomicUsize, at_least: usize) {
        for _ in 0..200 {
            if count.load(Ordering::SeqCst) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("expected at least {at_least} iterations");
    }

    #[tokio::test]
    async fn runs_repeatedly_until_stopped() {
        let (worker, count) = counting_worker();
        let handle = worker.start().await;
        assert!(worker.is_running());

        wait_for(&count, 3).await;
        worker.stop().await;

        assert!(!worker.is_running());
        assert!(handle.is_finished());
        let after_stop = count.load(Ordering::SeqCst);
        tokio::time::sleep(TICK * 4).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn start_is_idempotent_while_running() {
        let (worker, _count) = counting_worker();
        let first = worker.start().await;
        let second = worker.start().await;
        assert_eq!(first, second);
        assert_eq!(first.id(), second.id());
        worker.stop().await;

        let third = worker.start().await;
        assert_ne!(first, third);
        worker.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (worker, _count) = counting_worker();
        worker.stop().await;
        worker.start().await;
        worker.stop().await;
        worker.stop().await;
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn failing_iterations_do_not_end_the_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let worker = PeriodicWorker::new(
            move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(std::io::Error::other("boom"))
                }
            },
            TICK,
        );
        worker.start().await;
        wait_for(&count, 3).await;
        assert!(worker.is_running());
        worker.stop().await;
    }

    #[tokio::test]
    async fn panicking_iterations_do_not_end_the_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let worker = PeriodicWorker::new(
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        panic!("first iteration blows up");
                    }
                    Ok::<(), TickError>(())
                }
            },
            TICK,
        );
        worker.start().await;
        wait_for(&count, 3).await;
        assert!(worker.is_running());
        worker.stop().await;
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_iteration() {
        let started = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let (s, d) = (Arc::clone(&started), Arc::clone(&done));
        let worker = PeriodicWorker::new(
            move || {
                let (s, d) = (Arc::clone(&s), Arc::clone(&d));
                async move {
                    s.store(true, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    d.store(true, Ordering::SeqCst);
                    Ok::<(), TickError>(())
                }
            },
            Duration::from_secs(60),
        );
        worker.start().await;
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        worker.stop().await;
        assert!(done.load(Ordering::SeqCst));
    }

    /// A worker whose iterations take `busy` and that records the highest
    /// number of iterations seen running at once.
    fn overlap_tracking_worker(
        busy: Duration,
    ) -> (PeriodicWorker, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(AtomicBool::new(false));
        let (a, p, s) = (Arc::clone(&active), Arc::clone(&peak), Arc::clone(&started));
        let worker = PeriodicWorker::new(
            move || {
                let (a, p, s) = (Arc::clone(&a), Arc::clone(&p), Arc::clone(&s));
                async move {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    s.store(true, Ordering::SeqCst);
                    tokio::time::sleep(busy).await;
                    a.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), TickError>(())
                }
            },
            TICK,
        );
        (worker, active, peak, started)
    }

    #[tokio::test]
    async fn start_during_stop_never_overlaps_runs() {
        let (worker, active, peak, started) = overlap_tracking_worker(Duration::from_millis(50));
        let worker = Arc::new(worker);
        let first = worker.start().await;
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let stopper = {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = worker.start().await;

        assert!(first.is_finished());
        assert_ne!(first, second);
        stopper.await.unwrap();
        assert!(worker.is_running());

        tokio::time::sleep(Duration::from_millis(20)).await;
        worker.stop().await;
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_stops_both_wait_for_the_iteration() {
        let (worker, active, _peak, started) = overlap_tracking_worker(Duration::from_millis(40));
        let worker = Arc::new(worker);
        worker.start().await;
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let first_stop = {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.stop().await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        worker.stop().await;

        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert!(!worker.is_running());
        first_stop.await.unwrap();
    }

    #[tokio::test]
    async fn dynamic_interval_is_read_each_iteration() {
        let reads = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&reads);
        let interval = Interval::from_fn(move || {
            r.fetch_add(1, Ordering::SeqCst);
            TICK
        });
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let worker = PeriodicWorker::new(
            move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), TickError>(())
                }
            },
            interval,
        );
        worker.start().await;
        wait_for(&count, 3).await;
        worker.stop().await;
        assert!(reads.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn panic_payloads_render_as_text() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
    }
}
