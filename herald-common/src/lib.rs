//! Shared building blocks for herald: the recipient record model,
//! configuration types, and logging setup.

pub mod config;
pub mod logging;
pub mod record;

pub use config::{
    AttachmentPolicy, ConfigError, DatabaseConfig, DispatchSettings, HeraldConfig, SenderConfig,
    SmtpConfig, SmtpTimeouts, TemplateConfig, TlsPolicy,
};
pub use record::{Record, RecordKey};
pub use tracing;
