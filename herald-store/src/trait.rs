use async_trait::async_trait;
use herald_common::{Record, RecordKey};

/// Literal status written for a delivered record.
pub const STATUS_SENT: &str = "Sent";

/// Read side of the data store.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch every pending record, in store order.
    ///
    /// Either the full result set is returned or an error; never a partial list.
    async fn fetch(&self) -> crate::Result<Vec<Record>>;
}

/// Write side of the data store.
///
/// Implementations must tolerate concurrent callers: every dispatcher worker
/// writes through the same sink.
#[async_trait]
pub trait StatusSink: Send + Sync {
    /// Mark the record identified by `key` as sent, carrying `status_tag`.
    async fn mark_sent(&self, key: &RecordKey, status_tag: &str) -> crate::Result<()>;
}
