//! Task identifiers.
//!
//! Ids are assigned by the store when a row is inserted and only ever grow,
//! so comparing two ids tells you which row was created first. A newtype keeps
//! them from being mixed up with attempt counters or other integers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a persisted task row.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(i64);

impl TaskId {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Raw value as stored in the `tasks.id` column.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}
