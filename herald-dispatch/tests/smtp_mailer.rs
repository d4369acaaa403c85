//! `SmtpMailer` against a mock submission server.

mod support;

use std::io::Write;

use herald_common::{
    AttachmentPolicy, Record, RecordKey, SenderConfig, SmtpConfig, TemplateConfig, TlsPolicy,
};
use herald_dispatch::{AttachmentState, FailureKind, Mailer, SendOutcome, SmtpMailer, Templates};
use support::mock_server::{MockSmtpServer, SmtpCommand};

fn smtp_config(server: &MockSmtpServer) -> SmtpConfig {
    let mut config = SmtpConfig::new("127.0.0.1", server.addr().port());
    config.helo_domain = "herald.test".to_string();
    config
}

fn mailer(smtp: SmtpConfig, policy: AttachmentPolicy) -> SmtpMailer {
    SmtpMailer::new(
        smtp,
        SenderConfig {
            address: "noreply@example.edu".to_string(),
            name: Some("Admissions Office".to_string()),
        },
        Templates::from_config(&TemplateConfig {
            subject: "Admit card for {{application_no}}".to_string(),
            body: "<p>Dear {{candidate_name}},</p><p>Your admit card is attached.</p>".to_string(),
        })
        .unwrap(),
        policy,
    )
}

fn with_credentials(mut config: SmtpConfig) -> SmtpConfig {
    config.username = Some("mailer".to_string());
    config.password = Some("secret".to_string());
    config
}

fn record() -> Record {
    Record::new(
        RecordKey::new("APP-100", "ROLL-7"),
        "Asha Rao",
        "asha@example.com",
        "round-1",
    )
}

fn failure_kind(outcome: &SendOutcome) -> Option<FailureKind> {
    match outcome {
        SendOutcome::Failed(failure) => Some(failure.kind),
        SendOutcome::Sent { .. } => None,
    }
}

#[tokio::test]
async fn test_delivers_message() {
    let server = MockSmtpServer::builder().build().await.unwrap();
    let outcome = mailer(smtp_config(&server), AttachmentPolicy::SendWithout)
        .send(&record())
        .await;

    assert_eq!(
        outcome,
        SendOutcome::Sent {
            attachment: AttachmentState::None
        }
    );

    let commands = server.commands().await;
    assert_eq!(commands[0], SmtpCommand::Ehlo("herald.test".to_string()));
    assert!(commands.contains(&SmtpCommand::MailFrom("FROM:<noreply@example.edu>".to_string())));
    assert!(commands.contains(&SmtpCommand::RcptTo("TO:<asha@example.com>".to_string())));
    assert!(commands.contains(&SmtpCommand::Quit));
    assert!(!commands.iter().any(|c| matches!(c, SmtpCommand::Auth(_))));

    let messages = server.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("From: \"Admissions Office\" <noreply@example.edu>\r\n"));
    assert!(messages[0].contains("Subject: Admit card for APP-100\r\n"));
    assert!(messages[0].contains("Content-Type: text/html; charset=utf-8\r\n"));
    assert!(messages[0].contains("Message-ID: <"));

    server.shutdown();
}

#[tokio::test]
async fn test_attachment_is_sent_under_its_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("admit-card.pdf");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(b"%PDF-1.4 admit card")
        .unwrap();

    let server = MockSmtpServer::builder().build().await.unwrap();
    let outcome = mailer(smtp_config(&server), AttachmentPolicy::Fail)
        .send(&record().with_attachment(&path))
        .await;

    assert_eq!(
        outcome,
        SendOutcome::Sent {
            attachment: AttachmentState::Attached
        }
    );

    let message = &server.messages().await[0];
    assert!(message.contains("Content-Type: multipart/mixed; boundary="));
    assert!(message.contains("Content-Type: application/pdf; name=\"admit-card.pdf\""));
    assert!(message.contains("Content-Disposition: attachment; filename=\"admit-card.pdf\""));

    server.shutdown();
}

#[tokio::test]
async fn test_missing_attachment_send_without() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.pdf");

    let server = MockSmtpServer::builder().build().await.unwrap();
    let outcome = mailer(smtp_config(&server), AttachmentPolicy::SendWithout)
        .send(&record().with_attachment(&path))
        .await;

    assert_eq!(
        outcome,
        SendOutcome::Sent {
            attachment: AttachmentState::Missing(path)
        }
    );

    let messages = server.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].contains("multipart/mixed"));

    server.shutdown();
}

#[tokio::test]
async fn test_missing_attachment_fail_never_connects() {
    let dir = tempfile::tempdir().unwrap();

    let server = MockSmtpServer::builder().build().await.unwrap();
    let outcome = mailer(smtp_config(&server), AttachmentPolicy::Fail)
        .send(&record().with_attachment(dir.path().join("gone.pdf")))
        .await;

    assert_eq!(failure_kind(&outcome), Some(FailureKind::AttachmentMissing));
    assert_eq!(server.connections(), 0);

    server.shutdown();
}

#[tokio::test]
async fn test_auth_plain() {
    let server = MockSmtpServer::builder()
        .with_auth_response(235, "2.7.0 Accepted")
        .build()
        .await
        .unwrap();

    let outcome = mailer(
        with_credentials(smtp_config(&server)),
        AttachmentPolicy::SendWithout,
    )
    .send(&record())
    .await;

    assert!(outcome.is_sent());
    let commands = server.commands().await;
    assert!(commands.iter().any(|c| matches!(c, SmtpCommand::Auth(arg) if arg.starts_with("PLAIN "))));

    server.shutdown();
}

#[tokio::test]
async fn test_auth_login_when_plain_not_offered() {
    let server = MockSmtpServer::builder()
        .with_capabilities(&["mock.example.com", "AUTH LOGIN"])
        .with_auth_response(235, "2.7.0 Accepted")
        .build()
        .await
        .unwrap();

    let outcome = mailer(
        with_credentials(smtp_config(&server)),
        AttachmentPolicy::SendWithout,
    )
    .send(&record())
    .await;

    assert!(outcome.is_sent());
    assert!(
        server
            .commands()
            .await
            .contains(&SmtpCommand::Auth("LOGIN".to_string()))
    );

    server.shutdown();
}

#[tokio::test]
async fn test_auth_rejected_is_auth_failure() {
    let server = MockSmtpServer::builder()
        .with_auth_response(535, "5.7.8 Authentication credentials invalid")
        .build()
        .await
        .unwrap();

    let outcome = mailer(
        with_credentials(smtp_config(&server)),
        AttachmentPolicy::SendWithout,
    )
    .send(&record())
    .await;

    assert_eq!(failure_kind(&outcome), Some(FailureKind::AuthFailure));
    assert!(
        !server
            .commands()
            .await
            .iter()
            .any(|c| matches!(c, SmtpCommand::MailFrom(_)))
    );

    server.shutdown();
}

#[tokio::test]
async fn test_auth_required_on_mail_from_is_auth_failure() {
    let server = MockSmtpServer::builder()
        .with_mail_from_response(530, "5.7.0 Authentication required")
        .build()
        .await
        .unwrap();

    let outcome = mailer(smtp_config(&server), AttachmentPolicy::SendWithout)
        .send(&record())
        .await;

    assert_eq!(failure_kind(&outcome), Some(FailureKind::AuthFailure));

    server.shutdown();
}

#[tokio::test]
async fn test_rejected_recipient_is_transport_failure() {
    let server = MockSmtpServer::builder()
        .rejecting_recipient("asha@example.com")
        .build()
        .await
        .unwrap();

    let outcome = mailer(smtp_config(&server), AttachmentPolicy::SendWithout)
        .send(&record())
        .await;

    assert_eq!(failure_kind(&outcome), Some(FailureKind::TransportFailure));
    assert!(server.messages().await.is_empty());

    server.shutdown();
}

#[tokio::test]
async fn test_rejected_message_is_transport_failure() {
    let server = MockSmtpServer::builder()
        .with_data_end_response(554, "5.6.0 Message rejected")
        .build()
        .await
        .unwrap();

    let outcome = mailer(smtp_config(&server), AttachmentPolicy::SendWithout)
        .send(&record())
        .await;

    assert_eq!(failure_kind(&outcome), Some(FailureKind::TransportFailure));

    server.shutdown();
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let outcome = mailer(
        SmtpConfig::new("127.0.0.1", port),
        AttachmentPolicy::SendWithout,
    )
    .send(&record())
    .await;

    assert_eq!(failure_kind(&outcome), Some(FailureKind::TransportFailure));
}

#[tokio::test]
async fn test_hung_server_times_out() {
    let server = MockSmtpServer::builder()
        .hanging_on("EHLO")
        .build()
        .await
        .unwrap();

    let mut config = smtp_config(&server);
    config.timeouts.ehlo_secs = 1;

    let outcome = mailer(config, AttachmentPolicy::SendWithout)
        .send(&record())
        .await;

    match outcome {
        SendOutcome::Failed(failure) => {
            assert_eq!(failure.kind, FailureKind::TransportFailure);
            assert!(failure.detail.contains("timed out"), "{}", failure.detail);
        }
        SendOutcome::Sent { .. } => panic!("send should have timed out"),
    }

    server.shutdown();
}

#[tokio::test]
async fn test_failed_quit_still_counts_as_sent() {
    let server = MockSmtpServer::builder()
        .without_quit_reply()
        .build()
        .await
        .unwrap();

    let outcome = mailer(smtp_config(&server), AttachmentPolicy::SendWithout)
        .send(&record())
        .await;

    assert!(outcome.is_sent());

    server.shutdown();
}

#[tokio::test]
async fn test_required_tls_without_starttls_fails() {
    let server = MockSmtpServer::builder().build().await.unwrap();

    let mut config = smtp_config(&server);
    config.tls = TlsPolicy::Required;

    let outcome = mailer(config, AttachmentPolicy::SendWithout)
        .send(&record())
        .await;

    assert_eq!(failure_kind(&outcome), Some(FailureKind::TransportFailure));
    assert!(server.messages().await.is_empty());

    server.shutdown();
}

#[tokio::test]
async fn test_opportunistic_tls_falls_back_to_plaintext() {
    let server = MockSmtpServer::builder()
        .with_capabilities(&["mock.example.com", "STARTTLS"])
        .build()
        .await
        .unwrap();

    let outcome = mailer(smtp_config(&server), AttachmentPolicy::SendWithout)
        .send(&record())
        .await;

    assert!(outcome.is_sent());
    assert_eq!(server.connections(), 2);
    assert!(server.commands().await.contains(&SmtpCommand::StartTls));

    server.shutdown();
}
