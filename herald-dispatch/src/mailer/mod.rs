//! Composing and transmitting one message per record.

mod smtp;
mod transaction;

use async_trait::async_trait;
use herald_common::Record;

pub use smtp::SmtpMailer;
pub use transaction::SmtpTransaction;

use crate::outcome::SendOutcome;

/// Sends one message for one record.
///
/// Implementations never fail past this boundary: every transport, protocol
/// and attachment problem is folded into [`SendOutcome::Failed`]. They are
/// shared by every worker, so must tolerate concurrent calls.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, record: &Record) -> SendOutcome;
}
