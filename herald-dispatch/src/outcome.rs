//! Per-record, per-batch and per-run results.

use core::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use herald_common::RecordKey;

/// Why a send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The record's attachment file does not exist and the policy forbids
    /// sending without it.
    AttachmentMissing,
    /// The server rejected the configured credentials.
    AuthFailure,
    /// Connection, TLS, protocol or timeout failure, or a rejected envelope.
    TransportFailure,
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AttachmentMissing => "attachment-missing",
            Self::AuthFailure => "auth-failure",
            Self::TransportFailure => "transport-failure",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl SendFailure {
    #[must_use]
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::TransportFailure, detail)
    }

    #[must_use]
    pub fn auth(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::AuthFailure, detail)
    }
}

impl Display for SendFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// What happened to a record's attachment on a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttachmentState {
    /// The record has no attachment.
    #[default]
    None,
    Attached,
    /// The file was missing and the message went out without it.
    Missing(PathBuf),
}

/// Result of handing one message to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { attachment: AttachmentState },
    Failed(SendFailure),
}

impl SendOutcome {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Final status of one record after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    /// Sent and recorded in the data store.
    Delivered,
    /// Sent, but the status update failed. The message went out; the store
    /// still lists the record as pending.
    DeliveredUnrecorded(String),
    /// Not sent; no status update was attempted.
    SendFailed(SendFailure),
}

impl RecordStatus {
    /// Whether the message reached the server.
    #[must_use]
    pub const fn was_sent(&self) -> bool {
        matches!(self, Self::Delivered | Self::DeliveredUnrecorded(_))
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::SendFailed(failure) => Some(failure.kind),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordReport {
    pub key: RecordKey,
    pub status: RecordStatus,
    /// Set when the message was sent without its attachment.
    pub attachment: AttachmentState,
}

/// Outcome of one batch, in record order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Zero-based position of the batch in the run
    pub index: usize,
    pub records: Vec<RecordReport>,
    /// Panic message, if the worker died part way through. Records after the
    /// panic have no report.
    pub panicked: Option<String>,
}

impl BatchReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.panicked.is_none()
            && self
                .records
                .iter()
                .all(|r| r.status == RecordStatus::Delivered)
    }
}

/// Counts over a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub batches: usize,
    pub failed_batches: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub unrecorded: usize,
    pub failed: usize,
    pub attachments_missing: usize,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} batches ({} failed), {} attempted, {} delivered, {} unrecorded, {} failed, {} missing attachments",
            self.batches,
            self.failed_batches,
            self.attempted,
            self.delivered,
            self.unrecorded,
            self.failed,
            self.attachments_missing
        )
    }
}

/// All batch reports for a run, ordered by batch index.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunResult {
    batches: Vec<BatchReport>,
}

impl RunResult {
    /// Build a result from reports in any order.
    #[must_use]
    pub fn new(mut batches: Vec<BatchReport>) -> Self {
        batches.sort_by_key(|b| b.index);
        Self { batches }
    }

    #[must_use]
    pub fn batches(&self) -> &[BatchReport] {
        &self.batches
    }

    /// Every record report, in fetch order.
    pub fn records(&self) -> impl Iterator<Item = &RecordReport> {
        self.batches.iter().flat_map(|b| b.records.iter())
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.batches.iter().all(BatchReport::is_success)
    }

    #[must_use]
    pub fn attempted(&self) -> usize {
        self.records().count()
    }

    /// Records sent, whether or not the status update succeeded.
    #[must_use]
    pub fn delivered(&self) -> usize {
        self.records().filter(|r| r.status.was_sent()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.records()
            .filter(|r| matches!(r.status, RecordStatus::SendFailed(_)))
            .count()
    }

    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary {
            batches: self.batches.len(),
            ..RunSummary::default()
        };

        for batch in &self.batches {
            if !batch.is_success() {
                summary.failed_batches += 1;
            }
            for record in &batch.records {
                summary.attempted += 1;
                match record.status {
                    RecordStatus::Delivered => summary.delivered += 1,
                    RecordStatus::DeliveredUnrecorded(_) => summary.unrecorded += 1,
                    RecordStatus::SendFailed(_) => summary.failed += 1,
                }
                if matches!(record.attachment, AttachmentState::Missing(_)) {
                    summary.attachments_missing += 1;
                }
            }
        }

        summary
    }
}
