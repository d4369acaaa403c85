//! Batch dispatch engine.
//!
//! Records fetched from a [`RecordSource`](herald_store::RecordSource) are
//! split into fixed-size batches and run across a bounded pool of workers.
//! Each worker sends its records in order through a [`Mailer`] and, only
//! after a successful send, records the delivery through a
//! [`StatusSink`](herald_store::StatusSink). Failures are captured per record
//! and per batch; nothing short-circuits the run.

pub mod dispatcher;
pub mod error;
pub mod mailer;
pub mod outcome;
pub mod pipeline;
pub mod template;

pub use dispatcher::{Dispatcher, partition};
pub use error::RunError;
pub use mailer::{Mailer, SmtpMailer};
pub use outcome::{
    AttachmentState, BatchReport, FailureKind, RecordReport, RecordStatus, RunResult, RunSummary,
    SendFailure, SendOutcome,
};
pub use template::{Template, Templates};
