//! Impls: concrete TaskStore backends.
//!
//! - **InMemoryTaskStore**: tests and ephemeral runs
//! - **SqliteTaskStore**: the durable store used by the CLI

pub mod memory_store;
pub mod sqlite_store;

pub use self::memory_store::InMemoryTaskStore;
pub use self::sqlite_store::{SqliteTaskStore, database_path};
