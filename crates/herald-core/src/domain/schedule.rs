//! Timing knobs: how long to wait, and whether a kind runs again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A wait period, either fixed or looked up again every time it is read.
///
/// The dynamic form lets a long-running loop pick up a new value from
/// reloaded configuration without being restarted.
#[derive(Clone)]
pub enum Interval {
    Fixed(Duration),
    Dynamic(Arc<dyn Fn() -> Duration + Send + Sync>),
}

impl Interval {
    pub fn fixed(period: Duration) -> Self {
        Interval::Fixed(period)
    }

    pub fn from_fn(f: impl Fn() -> Duration + Send + Sync + 'static) -> Self {
        Interval::Dynamic(Arc::new(f))
    }

    pub fn current(&self) -> Duration {
        match self {
            Interval::Fixed(period) => *period,
            Interval::Dynamic(f) => f(),
        }
    }
}

impl From<Duration> for Interval {
    fn from(period: Duration) -> Self {
        Interval::Fixed(period)
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Fixed(period) => f.debug_tuple("Fixed").field(period).finish(),
            Interval::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Whether a kind is run once per row or re-enqueued after each run.
///
/// Attached when the handler is registered, so handlers no longer insert their
/// own follow-up rows.
#[derive(Debug, Clone, Default)]
pub enum RecurrencePolicy {
    #[default]
    Once,
    Every(Interval),
}

impl RecurrencePolicy {
    pub fn every(interval: impl Into<Interval>) -> Self {
        RecurrencePolicy::Every(interval.into())
    }

    /// When the follow-up row should be due, or `None` for run-once kinds.
    pub fn next_run(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            RecurrencePolicy::Once => None,
            RecurrencePolicy::Every(interval) => {
                let delay = chrono::Duration::from_std(interval.current()).ok()?;
                now.checked_add_signed(delay)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn dynamic_interval_is_reevaluated() {
        let secs = Arc::new(AtomicU64::new(1));
        let source = Arc::clone(&secs);
        let interval = Interval::from_fn(move || Duration::from_secs(source.load(Ordering::SeqCst)));

        assert_eq!(interval.current(), Duration::from_secs(1));
        secs.store(7, Ordering::SeqCst);
        assert_eq!(interval.current(), Duration::from_secs(7));
    }

    #[test]
    fn once_has_no_next_run() {
        assert_eq!(RecurrencePolicy::Once.next_run(Utc::now()), None);
    }

    #[test]
    fn every_adds_interval() {
        let now = Utc::now();
        let next = RecurrencePolicy::every(Duration::from_secs(600))
            .next_run(now)
            .unwrap();
        assert_eq!(next - now, chrono::Duration::seconds(600));
    }
}
