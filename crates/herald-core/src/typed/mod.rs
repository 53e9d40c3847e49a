//! Typed task API.
//!
//! - **Surface**: [`TypedTask`] ties a payload struct to its kind, and
//!   [`Handler<T>`] receives that struct decoded.
//! - **Erased**: [`TypedHandler`] adapts a `Handler<T>` into a
//!   [`crate::runtime::TaskHandler`] for the registry.

pub mod handler;
pub mod task;

pub use self::handler::{Handler, TypedHandler};
pub use self::task::TypedTask;
