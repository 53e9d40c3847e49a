//! The task row and the eligibility rule that decides when it runs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{TaskId, TaskKind, TaskStatus};

/// Retry budget used when nothing else is configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// One durable unit of work.
///
/// `kind` and `payload` never change after insert. `status`, `attempts` and
/// `last_error` are owned by the dispatcher; handlers only ever see a shared
/// reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    /// Opaque to the core; by convention JSON understood by the handler.
    pub payload: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Decode the payload as JSON. A missing or blank payload decodes as `{}`.
    pub fn payload_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self.payload.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw),
            _ => serde_json::from_str("{}"),
        }
    }

    pub fn is_eligible(&self, now: DateTime<Utc>, rules: &Eligibility) -> bool {
        if self.scheduled_at > now {
            return false;
        }
        match self.status {
            TaskStatus::Pending => true,
            TaskStatus::Error => self.attempts < rules.max_attempts,
            TaskStatus::Running => rules.stale_cutoff(now).is_some_and(|cutoff| {
                self.updated_at <= cutoff && self.attempts < rules.max_attempts
            }),
            TaskStatus::Completed => false,
        }
    }

    /// Failed and out of retries: the row stays `error` and is never selected again.
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.status == TaskStatus::Error && self.attempts >= max_attempts
    }

    pub(crate) fn claim(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.updated_at = now;
    }

    /// Record the outcome of one attempt. This is the only place `attempts` moves.
    pub(crate) fn conclude(&mut self, outcome: Result<(), String>, now: DateTime<Utc>) {
        match outcome {
            Ok(()) => {
                self.status = TaskStatus::Completed;
                self.last_error = None;
            }
            Err(message) => {
                self.status = TaskStatus::Error;
                self.last_error = Some(message);
            }
        }
        self.attempts = self.attempts.saturating_add(1);
        self.updated_at = now;
    }
}

/// Selection rule for a dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub max_attempts: u32,
    /// When set, `running` rows untouched for this long are picked up again.
    /// Off by default: a crash mid-attempt then leaves the row at `running`.
    pub stale_running_after: Option<Duration>,
}

impl Eligibility {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            stale_running_after: None,
        }
    }

    pub fn with_stale_running_after(mut self, after: Duration) -> Self {
        self.stale_running_after = Some(after);
        self
    }

    /// `running` rows last updated at or before this instant count as abandoned.
    pub fn stale_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let after = chrono::Duration::from_std(self.stale_running_after?).ok()?;
        now.checked_sub_signed(after)
    }
}

impl Default for Eligibility {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

/// Insert-side view of a task; the store assigns id, status and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub kind: TaskKind,
    pub payload: Option<String>,
    /// `None` means "due now" from the store's point of view.
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(kind: impl Into<TaskKind>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
            scheduled_at: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_json<T: Serialize>(self, payload: &T) -> Result<Self, serde_json::Error> {
        let raw = serde_json::to_string(payload)?;
        Ok(self.with_payload(raw))
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Materialize the row a store would persist.
    pub fn into_task(self, id: TaskId, now: DateTime<Utc>) -> Task {
        Task {
            id,
            kind: self.kind,
            payload: self.payload,
            scheduled_at: self.scheduled_at.unwrap_or(now),
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
