//! SMTP client for submitting messages to a relay.
//!
//! The client speaks just enough ESMTP to hand one message to a submission
//! server:
//!
//! - Plain TCP connections with STARTTLS upgrade
//! - AUTH PLAIN and AUTH LOGIN
//! - MAIL FROM / RCPT TO / DATA with dot-stuffing
//! - MIME message construction with HTML bodies and base64 attachments
//!
//! # Example
//!
//! ```no_run
//! use herald_smtp::client::{MessageBuilder, SmtpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let message = MessageBuilder::new()
//!     .from("\"Admissions\" <noreply@example.com>")
//!     .to("candidate@example.com")
//!     .subject("Your admit card")
//!     .html_body("<p>Dear candidate,</p>")
//!     .build()?;
//!
//! let mut client = SmtpClient::connect("localhost:2525", "localhost".to_string()).await?;
//! client.read_greeting().await?;
//! client.ehlo("client.example.com").await?;
//! client.mail_from("noreply@example.com").await?;
//! client.rcpt_to("candidate@example.com").await?;
//! client.data().await?;
//! client.send_data(&message).await?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod message;
mod response;
mod smtp_client;

pub use error::{ClientError, Result};
pub use message::{Attachment, MessageBuilder, guess_content_type};
pub use response::{Response, ResponseLine};
pub use smtp_client::{AuthMechanism, SmtpClient};
