//! Sequential processing of one batch.

use std::sync::Arc;

use herald_common::{Record, tracing};
use herald_store::StatusSink;

use crate::{
    mailer::Mailer,
    outcome::{AttachmentState, RecordReport, RecordStatus, SendOutcome},
};

/// Send every record of a batch in order, recording each success.
///
/// Reports are pushed into `reports` as they are produced so that a panic
/// part way through still leaves the finished records visible to the caller.
pub async fn process_batch(
    index: usize,
    records: Vec<Record>,
    mailer: Arc<dyn Mailer>,
    sink: Arc<dyn StatusSink>,
    reports: Arc<std::sync::Mutex<Vec<RecordReport>>>,
) {
    tracing::debug!(batch = index, records = records.len(), "Batch started");

    for record in records {
        let report = process_record(&record, mailer.as_ref(), sink.as_ref()).await;

        reports
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(report);
    }

    tracing::debug!(batch = index, "Batch finished");
}

async fn process_record(
    record: &Record,
    mailer: &dyn Mailer,
    sink: &dyn StatusSink,
) -> RecordReport {
    let (status, attachment) = match mailer.send(record).await {
        SendOutcome::Sent { attachment } => {
            let status = match sink.mark_sent(&record.key, &record.status_tag).await {
                Ok(()) => {
                    tracing::info!(
                        application_no = %record.key.application_no,
                        roll_no = %record.key.roll_no,
                        email = %record.email,
                        "Email sent"
                    );
                    RecordStatus::Delivered
                }
                Err(e) => {
                    tracing::error!(
                        application_no = %record.key.application_no,
                        roll_no = %record.key.roll_no,
                        email = %record.email,
                        error = %e,
                        "Email sent but status update failed"
                    );
                    RecordStatus::DeliveredUnrecorded(e.to_string())
                }
            };
            (status, attachment)
        }
        SendOutcome::Failed(failure) => {
            tracing::error!(
                application_no = %record.key.application_no,
                roll_no = %record.key.roll_no,
                email = %record.email,
                kind = %failure.kind,
                error = %failure.detail,
                "Failed to send email"
            );
            (RecordStatus::SendFailed(failure), AttachmentState::None)
        }
    };

    RecordReport {
        key: record.key.clone(),
        status,
        attachment,
    }
}
