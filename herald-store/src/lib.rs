//! Data-store access for herald.
//!
//! The dispatcher only sees two capabilities:
//! - [`RecordSource`]: fetch the ordered list of pending recipients
//! - [`StatusSink`]: record that one recipient's message was sent
//!
//! Backends:
//! - [`SqliteStore`]: SQLite database, one connection per call
//! - [`MemoryStore`]: in-process store for tests and dry runs

pub mod backends;
pub mod error;
pub mod r#trait;

pub use backends::{MemoryStore, SqliteStore};
pub use error::{Result, StoreError};
pub use r#trait::{RecordSource, STATUS_SENT, StatusSink};
