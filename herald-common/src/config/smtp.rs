//! Transport settings for the outbound SMTP session.

use core::fmt;
use std::time::Duration;

use serde::Deserialize;

/// TLS policy for the SMTP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    /// Upgrade via STARTTLS when the server advertises it, otherwise continue
    /// in plaintext.
    #[default]
    Opportunistic,

    /// Upgrade via STARTTLS or fail the send.
    Required,

    /// Never attempt STARTTLS.
    Disabled,
}

/// SMTP operation timeout configuration
///
/// Every step of the session is bounded so that a stalled server fails the
/// send instead of holding a worker forever.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpTimeouts {
    /// Timeout for establishing the TCP connection and reading the greeting
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for EHLO/HELO commands
    ///
    /// Default: 30 seconds
    #[serde(default = "default_ehlo_timeout")]
    pub ehlo_secs: u64,

    /// Timeout for STARTTLS command and TLS upgrade
    ///
    /// Default: 30 seconds
    #[serde(default = "default_starttls_timeout")]
    pub starttls_secs: u64,

    /// Timeout for the whole AUTH exchange
    ///
    /// Default: 30 seconds
    #[serde(default = "default_auth_timeout")]
    pub auth_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "default_mail_from_timeout")]
    pub mail_from_secs: u64,

    /// Default: 30 seconds
    #[serde(default = "default_rcpt_to_timeout")]
    pub rcpt_to_secs: u64,

    /// Timeout for DATA command and message transmission
    ///
    /// This is longer than other timeouts to accommodate attachments.
    /// Default: 120 seconds (2 minutes)
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    /// Default: 10 seconds
    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

impl SmtpTimeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn ehlo(&self) -> Duration {
        Duration::from_secs(self.ehlo_secs)
    }

    #[must_use]
    pub const fn starttls(&self) -> Duration {
        Duration::from_secs(self.starttls_secs)
    }

    #[must_use]
    pub const fn auth(&self) -> Duration {
        Duration::from_secs(self.auth_secs)
    }

    #[must_use]
    pub const fn mail_from(&self) -> Duration {
        Duration::from_secs(self.mail_from_secs)
    }

    #[must_use]
    pub const fn rcpt_to(&self) -> Duration {
        Duration::from_secs(self.rcpt_to_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            ehlo_secs: default_ehlo_timeout(),
            starttls_secs: default_starttls_timeout(),
            auth_secs: default_auth_timeout(),
            mail_from_secs: default_mail_from_timeout(),
            rcpt_to_secs: default_rcpt_to_timeout(),
            data_secs: default_data_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_ehlo_timeout() -> u64 {
    30
}

const fn default_starttls_timeout() -> u64 {
    30
}

const fn default_auth_timeout() -> u64 {
    30
}

const fn default_mail_from_timeout() -> u64 {
    30
}

const fn default_rcpt_to_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_quit_timeout() -> u64 {
    10
}

const fn default_port() -> u16 {
    25
}

fn default_helo_domain() -> String {
    "localhost".to_string()
}

/// Where and how to submit messages.
#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,

    /// Default: 25
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub tls: TlsPolicy,

    /// Accept invalid TLS certificates (for testing only)
    ///
    /// **SECURITY WARNING**: disables certificate validation entirely.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Name announced in EHLO
    #[serde(default = "default_helo_domain")]
    pub helo_domain: String,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,
}

impl SmtpConfig {
    /// A plaintext, unauthenticated configuration for `host:port`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            tls: TlsPolicy::default(),
            accept_invalid_certs: false,
            username: None,
            password: None,
            helo_domain: default_helo_domain(),
            timeouts: SmtpTimeouts::default(),
        }
    }

    /// `host:port`, suitable for `TcpStream::connect`
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Username and password, when both are configured
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .zip(self.password.as_deref())
    }
}

// Hand-written so the password never reaches the logs.
impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("helo_domain", &self.helo_domain)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}
