//! Herald: send every pending recipient their templated message, and record
//! who was reached.

use std::sync::Arc;

use herald_common::HeraldConfig;
use herald_dispatch::{RunError, RunResult, SmtpMailer, pipeline};
use herald_store::SqliteStore;

pub use herald_common::{config, logging};

/// Wire the SQLite store and SMTP mailer described by `config` together and
/// run one dispatch.
pub async fn run(config: &HeraldConfig) -> Result<RunResult, RunError> {
    let mailer = Arc::new(SmtpMailer::from_config(config)?);
    let store = SqliteStore::from_config(&config.database);

    pipeline::run(config.dispatch, &store, mailer, Arc::new(store.clone())).await
}
