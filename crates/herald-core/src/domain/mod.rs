//! Domain model: the task row, its status, its kind, and timing policies.

pub mod ids;
pub mod kind;
pub mod schedule;
pub mod state;
pub mod task;

pub use self::ids::TaskId;
pub use self::kind::{BuiltinKind, TaskKind, UnknownKind};
pub use self::schedule::{Interval, RecurrencePolicy};
pub use self::state::{TaskStatus, UnknownStatus};
pub use self::task::{DEFAULT_MAX_ATTEMPTS, Eligibility, NewTask, Task};
