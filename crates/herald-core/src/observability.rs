use metrics::{counter, describe_counter};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::domain::{Task, TaskStatus};

/// Install a default fmt subscriber unless one is already set.
///
/// The filter comes from `RUST_LOG`, then `LOG_LEVEL`, then `info`.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            let level = std::env::var("LOG_LEVEL").ok()?;
            EnvFilter::try_new(level.to_lowercase()).ok()
        })
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub const POSTS_PUBLISHED: &str = "posts_published_total";
pub const POSTS_FAILED: &str = "posts_failed_total";

/// Register descriptions for the publish counters with the installed
/// `metrics` recorder. Without a recorder the counters are no-ops.
pub fn describe_metrics() {
    describe_counter!(POSTS_PUBLISHED, "Total posts successfully published");
    describe_counter!(POSTS_FAILED, "Total posts that failed to publish");
}

#[inline]
pub fn record_post_published(network: &str) {
    counter!(POSTS_PUBLISHED, "network" => network.to_string()).increment(1);
}

#[inline]
pub fn record_post_failed(network: &str) {
    counter!(POSTS_FAILED, "network" => network.to_string()).increment(1);
}

/// Rows per state. `error` rows are split by whether they will be retried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub retrying: usize,
    pub exhausted: usize,
}

impl TaskCounts {
    pub fn tally(tasks: &[Task], max_attempts: u32) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Running => counts.running += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Error if task.is_exhausted(max_attempts) => counts.exhausted += 1,
                TaskStatus::Error => counts.retrying += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.retrying + self.exhausted
    }
}
