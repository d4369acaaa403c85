//! Backend implementations of [`RecordSource`](crate::RecordSource) and
//! [`StatusSink`](crate::StatusSink):
//! - `memory`: in-process store for tests and dry runs
//! - `sqlite`: SQLite database for production use

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
