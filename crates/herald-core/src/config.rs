//! Runtime settings, read from the environment.
//!
//! A `.env` file in the working directory (or any parent) is loaded once
//! before the first read. Poll and recurrence intervals can also be re-read
//! on every use via the `*_source` methods, so an operator can retune a
//! running scheduler by editing its environment.

use std::sync::Arc;
use std::sync::Once;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::domain::{DEFAULT_MAX_ATTEMPTS, Eligibility, Interval};

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const SCHEDULER_POLL_INTERVAL: &str = "SCHEDULER_POLL_INTERVAL";
pub const MAX_ATTEMPTS: &str = "MAX_ATTEMPTS";
pub const INGEST_INTERVAL: &str = "INGEST_INTERVAL";
pub const REPLAY_CHECK_INTERVAL: &str = "REPLAY_CHECK_INTERVAL";
pub const POST_DELAY: &str = "POST_DELAY";
pub const STALE_RUNNING_AFTER: &str = "STALE_RUNNING_AFTER";

pub const DEFAULT_DATABASE_URL: &str = "sqlite:///./herald.db";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub ingest_interval: Duration,
    pub replay_check_interval: Duration,
    pub post_delay: Duration,
    /// `None` keeps `running` rows out of selection forever.
    pub stale_running_after: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            poll_interval: Duration::from_secs(5),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ingest_interval: Duration::from_secs(600),
            replay_check_interval: Duration::from_secs(300),
            post_delay: Duration::from_secs(1),
            stale_running_after: None,
        }
    }
}

impl Settings {
    /// Load `.env` (once) and read every setting from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset keys take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let poll_interval = match get(SCHEDULER_POLL_INTERVAL) {
            Some(raw) => parse_poll_interval(&raw)?,
            None => defaults.poll_interval,
        };
        let max_attempts = match get(MAX_ATTEMPTS) {
            Some(raw) => parse_max_attempts(&raw)?,
            None => defaults.max_attempts,
        };
        let ingest_interval = match get(INGEST_INTERVAL) {
            Some(raw) => parse_seconds(INGEST_INTERVAL, &raw)?,
            None => defaults.ingest_interval,
        };
        let replay_check_interval = match get(REPLAY_CHECK_INTERVAL) {
            Some(raw) => parse_seconds(REPLAY_CHECK_INTERVAL, &raw)?,
            None => defaults.replay_check_interval,
        };
        let post_delay = match get(POST_DELAY) {
            Some(raw) => parse_fractional_seconds(POST_DELAY, &raw)?,
            None => defaults.post_delay,
        };
        let stale_running_after = match get(STALE_RUNNING_AFTER) {
            Some(raw) => Some(parse_seconds(STALE_RUNNING_AFTER, &raw)?),
            None => None,
        };

        Ok(Self {
            database_url: get(DATABASE_URL).unwrap_or(defaults.database_url),
            poll_interval,
            max_attempts,
            ingest_interval,
            replay_check_interval,
            post_delay,
            stale_running_after,
        })
    }

    pub fn eligibility(&self) -> Eligibility {
        let rules = Eligibility::new(self.max_attempts);
        match self.stale_running_after {
            Some(after) => rules.with_stale_running_after(after),
            None => rules,
        }
    }

    /// Poll period, re-read from `SCHEDULER_POLL_INTERVAL` on every iteration.
    pub fn poll_interval_source(&self) -> Interval {
        env_interval(SCHEDULER_POLL_INTERVAL, self.poll_interval, parse_poll_interval)
    }

    pub fn ingest_interval_source(&self) -> Interval {
        env_interval(INGEST_INTERVAL, self.ingest_interval, |raw| {
            parse_seconds(INGEST_INTERVAL, raw)
        })
    }

    pub fn replay_check_interval_source(&self) -> Interval {
        env_interval(REPLAY_CHECK_INTERVAL, self.replay_check_interval, |raw| {
            parse_seconds(REPLAY_CHECK_INTERVAL, raw)
        })
    }
}

fn load_dotenv() {
    static DOTENV: Once = Once::new();
    DOTENV.call_once(|| {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();
    });
}

fn env_interval(
    key: &'static str,
    initial: Duration,
    parse: fn(&str) -> Result<Duration, ConfigError>,
) -> Interval {
    dynamic_interval(initial, parse, move || std::env::var(key).ok())
}

/// An interval that re-reads its raw value on each use. Unset or invalid
/// values fall back to the last good one.
fn dynamic_interval(
    initial: Duration,
    parse: fn(&str) -> Result<Duration, ConfigError>,
    read: impl Fn() -> Option<String> + Send + Sync + 'static,
) -> Interval {
    let last_good = Arc::new(AtomicU64::new(to_millis(initial)));
    Interval::from_fn(move || {
        let fallback = Duration::from_millis(last_good.load(Ordering::Relaxed));
        let Some(raw) = read().filter(|v| !v.trim().is_empty()) else {
            return fallback;
        };
        match parse(&raw) {
            Ok(value) => {
                last_good.store(to_millis(value), Ordering::Relaxed);
                value
            }
            Err(e) => {
                warn!(error = %e, fallback_secs = fallback.as_secs_f64(), "keeping previous interval");
                fallback
            }
        }
    })
}

fn to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

fn invalid(key: &'static str, raw: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: reason.into(),
    }
}

fn parse_seconds(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| invalid(key, raw, format!("expected whole seconds ({e})")))
}

fn parse_poll_interval(raw: &str) -> Result<Duration, ConfigError> {
    let period = parse_seconds(SCHEDULER_POLL_INTERVAL, raw)?;
    if period.is_zero() {
        return Err(invalid(SCHEDULER_POLL_INTERVAL, raw, "must be at least 1 second"));
    }
    Ok(period)
}

fn parse_fractional_seconds(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|e| invalid(key, raw, format!("expected seconds ({e})")))?;
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(key, raw, e.to_string()))
}

fn parse_max_attempts(raw: &str) -> Result<u32, ConfigError> {
    let n: u32 = raw
        .trim()
        .parse()
        .map_err(|e| invalid(MAX_ATTEMPTS, raw, format!("expected a positive integer ({e})")))?;
    if n == 0 {
        return Err(invalid(MAX_ATTEMPTS, raw, "must be at least 1"));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(settings(&[]).unwrap(), Settings::default());
        let s = Settings::default();
        assert_eq!(s.database_url, "sqlite:///./herald.db");
        assert_eq!(s.poll_interval, Duration::from_secs(5));
        assert_eq!(s.max_attempts, 3);
        assert_eq!(s.stale_running_after, None);
    }

    #[test]
    fn values_are_parsed() {
        let s = settings(&[
            (DATABASE_URL, "sqlite:////tmp/x.db"),
            (SCHEDULER_POLL_INTERVAL, "2"),
            (MAX_ATTEMPTS, "5"),
            (INGEST_INTERVAL, "60"),
            (POST_DELAY, "0.25"),
            (STALE_RUNNING_AFTER, "900"),
        ])
        .unwrap();
        assert_eq!(s.database_url, "sqlite:////tmp/x.db");
        assert_eq!(s.poll_interval, Duration::from_secs(2));
        assert_eq!(s.max_attempts, 5);
        assert_eq!(s.ingest_interval, Duration::from_secs(60));
        assert_eq!(s.post_delay, Duration::from_millis(250));
        assert_eq!(s.eligibility().stale_running_after, Some(Duration::from_secs(900)));
    }

    #[rstest]
    #[case(SCHEDULER_POLL_INTERVAL, "fast")]
    #[case(SCHEDULER_POLL_INTERVAL, "0")]
    #[case(MAX_ATTEMPTS, "0")]
    #[case(MAX_ATTEMPTS, "-1")]
    #[case(POST_DELAY, "-0.5")]
    #[case(STALE_RUNNING_AFTER, "soon")]
    fn invalid_values_are_rejected(#[case] key: &str, #[case] value: &str) {
        let err = settings(&[(key, value)]).unwrap_err();
        let ConfigError::Invalid { key: bad, value: raw, .. } = err;
        assert_eq!(bad, key);
        assert_eq!(raw, value);
    }

    #[test]
    fn dynamic_interval_keeps_last_good_value() {
        let current = Arc::new(Mutex::new(Some("7".to_string())));
        let c = Arc::clone(&current);
        let interval = dynamic_interval(Duration::from_secs(5), parse_poll_interval, move || {
            c.lock().unwrap().clone()
        });

        assert_eq!(interval.current(), Duration::from_secs(7));
        *current.lock().unwrap() = Some("nonsense".into());
        assert_eq!(interval.current(), Duration::from_secs(7));
        *current.lock().unwrap() = None;
        assert_eq!(interval.current(), Duration::from_secs(7));
        *current.lock().unwrap() = Some("3".into());
        assert_eq!(interval.current(), Duration::from_secs(3));
    }
}
