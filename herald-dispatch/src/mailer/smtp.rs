use async_trait::async_trait;
use herald_common::{
    AttachmentPolicy, ConfigError, HeraldConfig, Record, SenderConfig, SmtpConfig, internal,
    tracing,
};
use herald_smtp::client::{Attachment, MessageBuilder};

use super::{Mailer, transaction::SmtpTransaction};
use crate::{
    outcome::{AttachmentState, FailureKind, SendFailure, SendOutcome},
    template::Templates,
};

/// [`Mailer`] that submits each message over its own SMTP connection.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    smtp: SmtpConfig,
    sender: SenderConfig,
    templates: Templates,
    attachment_policy: AttachmentPolicy,
}

impl SmtpMailer {
    #[must_use]
    pub fn new(
        smtp: SmtpConfig,
        sender: SenderConfig,
        templates: Templates,
        attachment_policy: AttachmentPolicy,
    ) -> Self {
        if smtp.accept_invalid_certs {
            tracing::warn!(
                server = %smtp.address(),
                "SECURITY WARNING: TLS certificate validation is disabled for this server"
            );
        }

        Self {
            smtp,
            sender,
            templates,
            attachment_policy,
        }
    }

    /// Build a mailer from a loaded configuration. Fails if either template
    /// is invalid.
    pub fn from_config(config: &HeraldConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.smtp.clone(),
            config.sender.clone(),
            Templates::from_config(&config.template)?,
            config.attachment_policy,
        ))
    }

    /// Load the record's attachment, applying the attachment policy when the
    /// file cannot be read.
    async fn attachment(
        &self,
        record: &Record,
    ) -> Result<(Option<Attachment>, AttachmentState), SendFailure> {
        let Some(path) = &record.attachment_path else {
            return Ok((None, AttachmentState::None));
        };

        match Attachment::from_path(path).await {
            Ok(attachment) => Ok((Some(attachment), AttachmentState::Attached)),
            Err(error) => match self.attachment_policy {
                AttachmentPolicy::Fail => Err(SendFailure::new(
                    FailureKind::AttachmentMissing,
                    format!("{}: {error}", path.display()),
                )),
                AttachmentPolicy::SendWithout => {
                    tracing::warn!(
                        application_no = %record.key.application_no,
                        roll_no = %record.key.roll_no,
                        path = %path.display(),
                        error = %error,
                        "Attachment unavailable, sending without it"
                    );
                    Ok((None, AttachmentState::Missing(path.clone())))
                }
            },
        }
    }

    /// Build the full message for `record`.
    pub async fn compose(&self, record: &Record) -> Result<(String, AttachmentState), SendFailure> {
        let (attachment, state) = self.attachment(record).await?;

        let domain = self
            .sender
            .address
            .rsplit_once('@')
            .map_or("localhost", |(_, domain)| domain);

        let mut builder = MessageBuilder::new()
            .from(self.sender.mailbox())
            .to(record.email.as_str())
            .subject(self.templates.subject(record))
            .header("Message-ID", format!("<{}@{domain}>", ulid::Ulid::new()))
            .html_body(self.templates.body(record));

        if let Some(attachment) = attachment {
            builder = builder.attach(attachment);
        }

        let message = builder
            .build()
            .map_err(|e| SendFailure::transport(format!("Failed to build message: {e}")))?;

        Ok((message, state))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, record: &Record) -> SendOutcome {
        let (message, attachment) = match self.compose(record).await {
            Ok(composed) => composed,
            Err(failure) => return SendOutcome::Failed(failure),
        };

        internal!(
            level = DEBUG,
            "Submitting {} bytes for {} to {}",
            message.len(),
            record.key,
            self.smtp.address()
        );

        match SmtpTransaction::new(&self.smtp, &self.sender.address, &record.email, &message)
            .execute()
            .await
        {
            Ok(()) => SendOutcome::Sent { attachment },
            Err(failure) => SendOutcome::Failed(failure),
        }
    }
}
