//! herald-core
//!
//! A persistent task queue with a polling scheduler.
//!
//! # モジュール構成
//! - **domain**: Task, TaskKind, TaskStatus, eligibility と recurrence
//! - **ports**: TaskStore / Session, Clock, handler 向け capabilities
//! - **impls**: InMemoryTaskStore, SqliteTaskStore
//! - **runtime**: TaskHandler と HandlerRegistry
//! - **typed**: 型付き payload の API（TypedTask, Handler<T>）
//! - **app**: Dispatcher, PeriodicWorker, Scheduler, SchedulerBuilder
//! - **handlers**: 組み込み handler
//! - **config** / **observability** / **error**

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod runtime;
pub mod typed;

pub use crate::app::{Dispatcher, PassReport, Scheduler, SchedulerBuilder};
pub use crate::config::Settings;
pub use crate::domain::{NewTask, Task, TaskId, TaskKind, TaskStatus};
pub use crate::error::{HandlerError, HeraldError, StoreError};
