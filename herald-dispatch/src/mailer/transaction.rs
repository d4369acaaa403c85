//! A single SMTP submission: connect, negotiate, authenticate, send, quit.

use std::time::Duration;

use herald_common::{SmtpConfig, TlsPolicy, tracing};
use herald_smtp::client::{AuthMechanism, ClientError, Response, SmtpClient};

use crate::outcome::{FailureKind, SendFailure};

/// Reply codes to MAIL FROM that mean the session is not authenticated.
const AUTH_REQUIRED: u16 = 530;

/// Outcome of TLS negotiation attempt
enum TlsNegotiation {
    /// Upgraded; carries the EHLO reply from the encrypted session
    Upgraded(Response),
    /// Not attempted; carries the original EHLO reply
    Skipped(Response),
    /// Opportunistic STARTTLS failed. RFC 3207 says to reconnect in plaintext.
    RetryWithoutTls,
}

impl From<ClientError> for SendFailure {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::AuthRejected { .. } | ClientError::NoAuthMechanism(_) => {
                Self::new(FailureKind::AuthFailure, error.to_string())
            }
            _ => Self::new(FailureKind::TransportFailure, error.to_string()),
        }
    }
}

/// Run `step` under `limit`, turning a timeout into a transport failure.
async fn timed<T>(
    limit: Duration,
    step: &str,
    future: impl Future<Output = herald_smtp::client::Result<T>>,
) -> Result<T, SendFailure> {
    match tokio::time::timeout(limit, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(SendFailure::transport(format!(
            "{step} timed out after {limit:?}"
        ))),
    }
}

fn rejected(step: &str, response: &Response) -> SendFailure {
    SendFailure::transport(format!(
        "Server rejected {step}: {} {}",
        response.code,
        response.message()
    ))
}

/// One message handed to one server over one connection.
pub struct SmtpTransaction<'a> {
    config: &'a SmtpConfig,
    /// Envelope sender (bare address)
    sender: &'a str,
    recipient: &'a str,
    /// Fully built message, headers included
    message: &'a str,
}

impl<'a> SmtpTransaction<'a> {
    #[must_use]
    pub const fn new(
        config: &'a SmtpConfig,
        sender: &'a str,
        recipient: &'a str,
        message: &'a str,
    ) -> Self {
        Self {
            config,
            sender,
            recipient,
            message,
        }
    }

    async fn connect_and_greet(&self) -> Result<SmtpClient, SendFailure> {
        let address = self.config.address();
        let timeouts = &self.config.timeouts;

        let connect = async {
            let mut client = SmtpClient::connect(&address, self.config.host.clone())
                .await?
                .accept_invalid_certs(self.config.accept_invalid_certs);
            let greeting = client.read_greeting().await?;
            Ok::<_, ClientError>((client, greeting))
        };

        let (client, greeting) = timed(timeouts.connect(), "Connect", connect)
            .await
            .map_err(|e| {
                SendFailure::transport(format!("Failed to connect to {address}: {}", e.detail))
            })?;

        if !greeting.is_success() {
            return Err(rejected("connection", &greeting));
        }

        Ok(client)
    }

    async fn ehlo(&self, client: &mut SmtpClient) -> Result<Response, SendFailure> {
        let response = timed(
            self.config.timeouts.ehlo(),
            "EHLO",
            client.ehlo(&self.config.helo_domain),
        )
        .await?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(rejected("EHLO", &response))
        }
    }

    /// Execute the complete SMTP transaction.
    ///
    /// A QUIT that fails after the server accepted the message is logged and
    /// otherwise ignored: the message has already been handed over.
    #[tracing::instrument(level = tracing::Level::INFO, skip(self), fields(server = %self.config.address(), recipient = %self.recipient))]
    pub async fn execute(self) -> Result<(), SendFailure> {
        let mut client = self.connect_and_greet().await?;

        let capabilities = match self.negotiate_tls(&mut client).await? {
            TlsNegotiation::Upgraded(ehlo) | TlsNegotiation::Skipped(ehlo) => ehlo,
            TlsNegotiation::RetryWithoutTls => {
                tracing::info!(
                    server = %self.config.address(),
                    "Reconnecting without STARTTLS per RFC 3207 Section 4.1"
                );

                drop(client);
                client = self.connect_and_greet().await?;
                self.ehlo(&mut client).await?
            }
        };

        self.authenticate(&mut client, &capabilities).await?;
        self.send_envelope(&mut client).await?;
        self.send_message_data(&mut client).await?;

        match tokio::time::timeout(self.config.timeouts.quit(), client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(
                server = %self.config.address(),
                error = %e,
                "QUIT failed after successful submission"
            ),
            Err(_) => tracing::warn!(
                server = %self.config.address(),
                timeout = ?self.config.timeouts.quit(),
                "QUIT timed out after successful submission"
            ),
        }

        Ok(())
    }

    /// Send EHLO and, depending on the policy and what the server offers,
    /// upgrade with STARTTLS.
    async fn negotiate_tls(&self, client: &mut SmtpClient) -> Result<TlsNegotiation, SendFailure> {
        let ehlo = self.ehlo(client).await?;
        let policy = self.config.tls;

        if policy == TlsPolicy::Disabled {
            return Ok(TlsNegotiation::Skipped(ehlo));
        }

        if !ehlo.has_capability("STARTTLS") {
            return if policy == TlsPolicy::Required {
                Err(SendFailure::transport(
                    "TLS is required but the server does not offer STARTTLS",
                ))
            } else {
                Ok(TlsNegotiation::Skipped(ehlo))
            };
        }

        let result = timed(self.config.timeouts.starttls(), "STARTTLS", client.starttls())
            .await
            .and_then(|response| {
                if response.is_success() {
                    Ok(())
                } else {
                    Err(rejected("STARTTLS", &response))
                }
            });

        if let Err(failure) = result {
            if policy == TlsPolicy::Required {
                return Err(failure);
            }

            tracing::info!(
                server = %self.config.address(),
                error = %failure.detail,
                "STARTTLS failed for opportunistic TLS, will retry without TLS"
            );
            return Ok(TlsNegotiation::RetryWithoutTls);
        }

        let ehlo = self.ehlo(client).await?;
        tracing::debug!(server = %self.config.address(), "TLS negotiated via STARTTLS");

        Ok(TlsNegotiation::Upgraded(ehlo))
    }

    async fn authenticate(
        &self,
        client: &mut SmtpClient,
        capabilities: &Response,
    ) -> Result<(), SendFailure> {
        let Some((username, password)) = self.config.credentials() else {
            return Ok(());
        };

        let advertised = capabilities.auth_mechanisms();
        let mechanism = AuthMechanism::select(&advertised)
            .ok_or_else(|| ClientError::NoAuthMechanism(advertised.join(" ")))?;

        timed(
            self.config.timeouts.auth(),
            "AUTH",
            client.authenticate(mechanism, username, password),
        )
        .await?;

        Ok(())
    }

    async fn send_envelope(&self, client: &mut SmtpClient) -> Result<(), SendFailure> {
        let timeouts = &self.config.timeouts;

        let response = timed(timeouts.mail_from(), "MAIL FROM", client.mail_from(self.sender)).await?;
        if response.code == AUTH_REQUIRED {
            return Err(SendFailure::auth(format!(
                "Server requires authentication: {} {}",
                response.code,
                response.message()
            )));
        }
        if !response.is_success() {
            return Err(rejected("MAIL FROM", &response));
        }

        let response = timed(timeouts.rcpt_to(), "RCPT TO", client.rcpt_to(self.recipient)).await?;
        if !response.is_success() {
            return Err(rejected(&format!("RCPT TO <{}>", self.recipient), &response));
        }

        Ok(())
    }

    async fn send_message_data(&self, client: &mut SmtpClient) -> Result<(), SendFailure> {
        let data_timeout = self.config.timeouts.data();

        let response = timed(data_timeout, "DATA", client.data()).await?;
        if !response.is_intermediate() {
            return Err(rejected("DATA", &response));
        }

        let response = timed(data_timeout, "Message data", client.send_data(self.message)).await?;
        if !response.is_success() {
            return Err(rejected("message", &response));
        }

        Ok(())
    }
}
