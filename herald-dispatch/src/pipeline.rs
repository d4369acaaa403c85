//! A complete run: validate, fetch, dispatch.

use std::sync::Arc;

use herald_common::{DispatchSettings, tracing};
use herald_store::{RecordSource, StatusSink};

use crate::{Dispatcher, Mailer, RunError, RunResult};

/// Fetch every pending record from `source` and dispatch it.
///
/// Settings are validated before the source is touched, and a failed fetch
/// aborts the run before anything is sent. Once dispatch starts the run
/// always completes and returns a [`RunResult`].
pub async fn run(
    settings: DispatchSettings,
    source: &dyn RecordSource,
    mailer: Arc<dyn Mailer>,
    sink: Arc<dyn StatusSink>,
) -> Result<RunResult, RunError> {
    let dispatcher = Dispatcher::new(settings, mailer, sink)?;

    let records = source.fetch().await.inspect_err(|e| {
        tracing::error!(error = %e, "Failed to fetch pending records");
    })?;
    tracing::info!(records = records.len(), "Fetched pending records");

    Ok(dispatcher.run(records).await)
}
