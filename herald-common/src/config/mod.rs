//! Configuration for a herald run.
//!
//! A [`HeraldConfig`] is loaded once at startup from a RON file and handed to
//! each component by reference. Nothing in herald reads configuration from
//! ambient global state.
//!
//! ## Modules
//!
//! - [`smtp`]: transport endpoint, credentials, TLS policy and timeouts
//! - [`dispatch`]: batch size and worker pool bounds

pub mod dispatch;
pub mod smtp;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub use dispatch::DispatchSettings;
pub use smtp::{SmtpConfig, SmtpTimeouts, TlsPolicy};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,

    #[error("Worker count must be greater than zero")]
    InvalidWorkerCount,

    #[error("Failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Invalid template: {0}")]
    Template(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What to do when a record names an attachment that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentPolicy {
    /// Send the message body without the attachment and report the missing
    /// file on the outcome.
    #[default]
    SendWithout,

    /// Treat the missing file as a failed send. The server is never contacted.
    Fail,
}

/// Location of the recipient database and the statements run against it.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,

    /// Query selecting pending recipients. Must yield the columns
    /// `ApplicationNo, RollNo, CandidateName, Email, AttachmentPath, StatusTag`.
    #[serde(default)]
    pub fetch_query: Option<String>,

    /// Statement marking one recipient as sent. Receives the named parameters
    /// `:status`, `:status_tag`, `:application_no` and `:roll_no`.
    #[serde(default)]
    pub update_query: Option<String>,
}

/// Fixed sender identity stamped on every message.
#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl SenderConfig {
    /// The `From` header value, e.g. `"Admissions" <noreply@example.com>`
    #[must_use]
    pub fn mailbox(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => {
                format!("\"{}\" <{}>", name.replace('"', "'"), self.address)
            }
            _ => format!("<{}>", self.address),
        }
    }
}

/// Subject and HTML body templates.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateConfig {
    pub subject: String,
    pub body: String,
}

/// Top-level configuration, as read from `herald.config.ron`.
#[derive(Debug, Clone, Deserialize)]
pub struct HeraldConfig {
    pub database: DatabaseConfig,
    pub smtp: SmtpConfig,
    pub sender: SenderConfig,
    pub template: TemplateConfig,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub attachment_policy: AttachmentPolicy,
}

impl HeraldConfig {
    /// Parse a configuration from RON source and validate it.
    pub fn from_ron(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron(&source)
    }

    /// Check the settings that would otherwise only fail part way through a run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatch.validate()?;

        if self.smtp.host.is_empty() {
            return Err(ConfigError::Invalid("smtp.host must not be empty".to_string()));
        }

        if self.smtp.username.is_some() != self.smtp.password.is_some() {
            return Err(ConfigError::Invalid(
                "smtp.username and smtp.password must be set together".to_string(),
            ));
        }

        if !self.sender.address.contains('@') {
            return Err(ConfigError::Invalid(format!(
                "sender.address is not an email address: {}",
                self.sender.address
            )));
        }

        Ok(())
    }
}
