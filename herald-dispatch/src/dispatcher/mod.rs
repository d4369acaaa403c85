//! Bounded parallel dispatch of record batches.
//!
//! The fetched records are split into contiguous batches of `batch_size`.
//! Batches are the unit of concurrency: at most `worker_count` of them run at
//! once on a [`JoinSet`], and as each finishes the next one is spawned. Within
//! a batch, records are processed strictly in order.

mod worker;

use std::{
    collections::BTreeSet,
    num::NonZeroUsize,
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, PoisonError},
};

use futures_util::FutureExt;
use herald_common::{ConfigError, DispatchSettings, Record, tracing};
use herald_store::StatusSink;
use tokio::task::JoinSet;

use crate::{
    mailer::Mailer,
    outcome::{BatchReport, RunResult},
};

/// Split `records` into contiguous batches of `batch_size`, preserving order.
/// Only the last batch may be shorter.
pub fn partition(records: Vec<Record>, batch_size: usize) -> Result<Vec<Vec<Record>>, ConfigError> {
    let batch_size = NonZeroUsize::new(batch_size).ok_or(ConfigError::InvalidBatchSize)?;
    Ok(split(records, batch_size))
}

fn split(records: Vec<Record>, batch_size: NonZeroUsize) -> Vec<Vec<Record>> {
    let batch_size = batch_size.get();
    let mut records = records.into_iter();
    let mut batches = Vec::with_capacity(records.len().div_ceil(batch_size));

    loop {
        let batch: Vec<_> = records.by_ref().take(batch_size).collect();
        if batch.is_empty() {
            break;
        }
        batches.push(batch);
    }

    batches
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs batches of records across a bounded pool of workers.
pub struct Dispatcher {
    batch_size: NonZeroUsize,
    worker_count: NonZeroUsize,
    mailer: Arc<dyn Mailer>,
    sink: Arc<dyn StatusSink>,
}

impl Dispatcher {
    /// Create a dispatcher. Fails if the batch size or worker count is zero.
    pub fn new(
        settings: DispatchSettings,
        mailer: Arc<dyn Mailer>,
        sink: Arc<dyn StatusSink>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            batch_size: NonZeroUsize::new(settings.batch_size).ok_or(ConfigError::InvalidBatchSize)?,
            worker_count: NonZeroUsize::new(settings.worker_count)
                .ok_or(ConfigError::InvalidWorkerCount)?,
            mailer,
            sink,
        })
    }

    /// Process every record and wait for all batches to finish.
    ///
    /// Neither a failed record nor a failed batch stops the run. A worker
    /// that panics is reported as a failed batch; the records it finished
    /// before the panic keep their reports.
    pub async fn run(&self, records: Vec<Record>) -> RunResult {
        let record_count = records.len();
        let batches = split(records, self.batch_size);

        if batches.is_empty() {
            tracing::info!("No pending records");
            return RunResult::default();
        }

        tracing::info!(
            records = record_count,
            batches = batches.len(),
            workers = self.worker_count.get(),
            "Dispatching records"
        );

        let mut join_set: JoinSet<BatchReport> = JoinSet::new();
        let mut pending = batches.into_iter().enumerate();
        let mut in_flight = BTreeSet::new();
        let mut reports = Vec::with_capacity(pending.len());

        // Spawn initial set of workers
        for _ in 0..self.worker_count.get().min(pending.len()) {
            if let Some((index, batch)) = pending.next() {
                in_flight.insert(index);
                self.spawn_batch(&mut join_set, index, batch);
            }
        }

        // As workers complete, spawn new ones for remaining batches
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => {
                    in_flight.remove(&report.index);
                    reports.push(report);
                }
                Err(e) => tracing::error!(error = %e, "Batch worker did not complete"),
            }

            if let Some((index, batch)) = pending.next() {
                in_flight.insert(index);
                self.spawn_batch(&mut join_set, index, batch);
            }
        }

        reports.extend(in_flight.into_iter().map(|index| BatchReport {
            index,
            records: Vec::new(),
            panicked: Some("worker task was cancelled".to_string()),
        }));

        let result = RunResult::new(reports);
        tracing::info!(summary = %result.summary(), "Dispatch complete");

        result
    }

    fn spawn_batch(&self, join_set: &mut JoinSet<BatchReport>, index: usize, batch: Vec<Record>) {
        let mailer = Arc::clone(&self.mailer);
        let sink = Arc::clone(&self.sink);

        join_set.spawn(async move {
            let reports = Arc::new(Mutex::new(Vec::with_capacity(batch.len())));

            let outcome = AssertUnwindSafe(worker::process_batch(
                index,
                batch,
                mailer,
                sink,
                Arc::clone(&reports),
            ))
            .catch_unwind()
            .await;

            let panicked = outcome.err().map(|payload| panic_message(&payload));
            if let Some(message) = &panicked {
                tracing::error!(batch = index, panic = %message, "Batch worker panicked");
            }

            let records = std::mem::take(&mut *reports.lock().unwrap_or_else(PoisonError::into_inner));

            BatchReport {
                index,
                records,
                panicked,
            }
        });
    }
}
