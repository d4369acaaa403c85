use serde::Deserialize;

use super::ConfigError;

const fn default_batch_size() -> usize {
    50
}

const fn default_worker_count() -> usize {
    25
}

/// Bounds for the batch dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DispatchSettings {
    /// Number of records per batch. The final batch may be shorter.
    ///
    /// Default: 50
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Number of batches processed concurrently.
    ///
    /// Default: 25
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

impl DispatchSettings {
    #[must_use]
    pub const fn new(batch_size: usize, worker_count: usize) -> Self {
        Self {
            batch_size,
            worker_count,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        if self.worker_count == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }

        Ok(())
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            worker_count: default_worker_count(),
        }
    }
}
