//! Recipient records as fetched from the data store.

use core::fmt::{self, Display, Formatter};
use std::path::PathBuf;

/// Natural identity of a recipient record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub application_no: String,
    pub roll_no: String,
}

impl RecordKey {
    #[must_use]
    pub fn new(application_no: impl Into<String>, roll_no: impl Into<String>) -> Self {
        Self {
            application_no: application_no.into(),
            roll_no: roll_no.into(),
        }
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application_no, self.roll_no)
    }
}

/// One recipient, with everything needed to send and track one message.
///
/// Records are immutable once fetched and live only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: RecordKey,
    pub candidate_name: String,
    /// Destination address
    pub email: String,
    pub attachment_path: Option<PathBuf>,
    /// Opaque marker passed back to the status update untouched
    pub status_tag: String,
}

impl Record {
    #[must_use]
    pub fn new(
        key: RecordKey,
        candidate_name: impl Into<String>,
        email: impl Into<String>,
        status_tag: impl Into<String>,
    ) -> Self {
        Self {
            key,
            candidate_name: candidate_name.into(),
            email: email.into(),
            attachment_path: None,
            status_tag: status_tag.into(),
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment_path = Some(path.into());
        self
    }
}
