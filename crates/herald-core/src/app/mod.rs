//! App - アプリケーション層
//!
//! ports を組み合わせてスケジューラを組み立てます。
//!
//! # 主要コンポーネント
//! - **SchedulerBuilder**: 構築とワイヤリング、起動時検証
//! - **Scheduler**: バックグラウンドループの start / stop
//! - **Dispatcher**: 1 回分の dispatch pass（claim → handle → conclude）
//! - **PeriodicWorker**: 一定間隔の繰り返し実行

pub mod builder;
pub mod dispatch;
pub mod periodic;
pub mod scheduler;

pub use self::builder::{BuildError, SchedulerBuilder};
pub use self::dispatch::{Dispatcher, MAX_ERROR_LEN, PassReport};
pub use self::periodic::{PeriodicWorker, Tick, TickError, WorkerHandle};
pub use self::scheduler::Scheduler;
