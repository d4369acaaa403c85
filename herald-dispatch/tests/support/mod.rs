#![allow(dead_code)]

pub mod mock_server;

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use herald_common::{Record, RecordKey};
use herald_dispatch::{AttachmentState, FailureKind, Mailer, SendFailure, SendOutcome};

/// `n` records with keys `A{i}`/`R{i}`, starting at `start`.
pub fn records(start: usize, n: usize) -> Vec<Record> {
    (start..start + n)
        .map(|i| {
            Record::new(
                RecordKey::new(format!("A{i}"), format!("R{i}")),
                format!("Candidate {i}"),
                format!("candidate{i}@example.com"),
                "round-1",
            )
        })
        .collect()
}

/// Scripted mailer: succeeds unless the record's email is listed, tracks
/// concurrency, and can panic on a chosen address.
#[derive(Default)]
pub struct ScriptedMailer {
    fail_for: Vec<String>,
    panic_on: Option<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    sent: std::sync::Mutex<Vec<RecordKey>>,
}

impl ScriptedMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(mut self, email: impl Into<String>) -> Self {
        self.fail_for.push(email.into());
        self
    }

    pub fn panicking_on(mut self, email: impl Into<String>) -> Self {
        self.panic_on = Some(email.into());
        self
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<RecordKey> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for ScriptedMailer {
    async fn send(&self, record: &Record) -> SendOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic_on.as_deref() == Some(record.email.as_str()) {
            panic!("mailer exploded on {}", record.email);
        }

        if self.fail_for.contains(&record.email) {
            return SendOutcome::Failed(SendFailure::new(
                FailureKind::TransportFailure,
                "550 mailbox unavailable",
            ));
        }

        self.sent.lock().unwrap().push(record.key.clone());
        SendOutcome::Sent {
            attachment: AttachmentState::None,
        }
    }
}
