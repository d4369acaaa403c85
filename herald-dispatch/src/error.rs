use herald_common::ConfigError;
use herald_store::StoreError;
use thiserror::Error;

/// The only failures that abort a run. Everything that goes wrong with an
/// individual record is reported in the [`RunResult`](crate::RunResult)
/// instead.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to fetch records: {0}")]
    DataAccess(#[from] StoreError),
}
