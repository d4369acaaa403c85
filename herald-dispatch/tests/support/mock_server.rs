//! Mock SMTP submission server.
//!
//! Speaks enough SMTP to accept (or refuse) a message from the mailer:
//! - scripted replies per command, including AUTH PLAIN and AUTH LOGIN
//! - per-recipient rejection
//! - a hang on a chosen command, for timeout tests
//! - every command and message body recorded for assertions

use std::{
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    time::timeout,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    /// AUTH with its mechanism and, for PLAIN, the initial response
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Message content, dot-unstuffed, without the terminating `.`
    MessageContent(String),
    Quit,
    StartTls,
    Other(String),
}

#[derive(Debug, Clone)]
struct Reply {
    code: u16,
    message: String,
}

impl Reply {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Debug, Clone)]
struct MockServerConfig {
    greeting: Reply,
    capabilities: Vec<String>,
    auth: Reply,
    mail_from: Reply,
    rcpt_to: Reply,
    /// Recipients refused with 550 regardless of `rcpt_to`
    rejected_recipients: Vec<String>,
    data: Reply,
    data_end: Reply,
    quit: Option<Reply>,
    hang_on: Option<String>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: Reply::new(220, "mock.example.com ESMTP ready"),
            capabilities: vec!["mock.example.com".to_string(), "8BITMIME".to_string()],
            auth: Reply::new(235, "2.7.0 Authentication successful"),
            mail_from: Reply::new(250, "OK"),
            rcpt_to: Reply::new(250, "OK"),
            rejected_recipients: Vec::new(),
            data: Reply::new(354, "End data with <CR><LF>.<CR><LF>"),
            data_end: Reply::new(250, "OK: queued"),
            quit: Some(Reply::new(221, "Bye")),
            hang_on: None,
        }
    }
}

fn ehlo_reply(capabilities: &[String]) -> Vec<u8> {
    let mut reply = String::new();
    let last = capabilities.len().saturating_sub(1);

    for (i, capability) in capabilities.iter().enumerate() {
        let separator = if i == last { ' ' } else { '-' };
        let _ = write!(reply, "250{separator}{capability}\r\n");
    }

    reply.into_bytes()
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>,
}

impl MockSmtpServer {
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder {
            config: MockServerConfig::default(),
        }
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    /// Message bodies received, in arrival order.
    pub async fn messages(&self) -> Vec<String> {
        self.commands
            .read()
            .await
            .iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        writer.write_all(&config.greeting.to_bytes()).await?;
        writer.flush().await?;

        loop {
            line.clear();
            match timeout(Duration::from_secs(10), reader.read_line(&mut line)).await {
                Ok(Ok(0)) | Err(_) => return Ok(()),
                Ok(result) => result?,
            };

            let command_line = line.trim_end().to_string();
            let (verb, argument) = command_line
                .split_once(' ')
                .map_or((command_line.as_str(), ""), |(verb, rest)| (verb, rest));
            let verb = verb.to_uppercase();

            if config.hang_on.as_deref() == Some(verb.as_str()) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            let (reply, command) = match verb.as_str() {
                "EHLO" => (
                    ehlo_reply(&config.capabilities),
                    SmtpCommand::Ehlo(argument.to_string()),
                ),
                "AUTH" => {
                    let command = SmtpCommand::Auth(argument.to_string());

                    if argument.eq_ignore_ascii_case("LOGIN") {
                        // Username and password prompts, then the verdict
                        for prompt in ["VXNlcm5hbWU6", "UGFzc3dvcmQ6"] {
                            writer.write_all(format!("334 {prompt}\r\n").as_bytes()).await?;
                            writer.flush().await?;

                            line.clear();
                            if reader.read_line(&mut line).await? == 0 {
                                return Ok(());
                            }
                        }
                    }

                    (config.auth.to_bytes(), command)
                }
                "MAIL" => (
                    config.mail_from.to_bytes(),
                    SmtpCommand::MailFrom(argument.to_string()),
                ),
                "RCPT" => {
                    let reply = if config
                        .rejected_recipients
                        .iter()
                        .any(|rejected| argument.contains(rejected.as_str()))
                    {
                        Reply::new(550, "5.1.1 Mailbox unavailable").to_bytes()
                    } else {
                        config.rcpt_to.to_bytes()
                    };
                    (reply, SmtpCommand::RcptTo(argument.to_string()))
                }
                "DATA" => (config.data.to_bytes(), SmtpCommand::Data),
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    if let Some(reply) = &config.quit {
                        writer.write_all(&reply.to_bytes()).await?;
                        writer.flush().await?;
                    }
                    return Ok(());
                }
                "STARTTLS" => (
                    Reply::new(454, "4.7.0 TLS not available").to_bytes(),
                    SmtpCommand::StartTls,
                ),
                _ => (
                    Reply::new(500, "Unknown command").to_bytes(),
                    SmtpCommand::Other(command_line.clone()),
                ),
            };

            commands.write().await.push(command.clone());
            writer.write_all(&reply).await?;
            writer.flush().await?;

            if command == SmtpCommand::Data && config.data.code == 354 {
                let mut content = String::new();

                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }

                    if line == ".\r\n" {
                        break;
                    }

                    content.push_str(line.strip_prefix('.').unwrap_or(&line));
                }

                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                writer.write_all(&config.data_end.to_bytes()).await?;
                writer.flush().await?;
            }
        }
    }
}

pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    /// Replace the EHLO capability lines (the first line is the greeting name).
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config.capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    /// Advertise `AUTH PLAIN LOGIN` and answer every AUTH with `code`.
    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        if !self.config.capabilities.iter().any(|c| c.starts_with("AUTH")) {
            self.config.capabilities.push("AUTH PLAIN LOGIN".to_string());
        }
        self.config.auth = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn rejecting_recipient(mut self, address: impl Into<String>) -> Self {
        self.config.rejected_recipients.push(address.into());
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end = Reply::new(code, message);
        self
    }

    /// Close the connection on QUIT without replying.
    #[must_use]
    pub fn without_quit_reply(mut self) -> Self {
        self.config.quit = None;
        self
    }

    /// Never answer `verb`.
    #[must_use]
    pub fn hanging_on(mut self, verb: &str) -> Self {
        self.config.hang_on = Some(verb.to_uppercase());
        self
    }

    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let server_commands = Arc::clone(&commands);
        let server_connections = Arc::clone(&connections);
        let server_shutdown = Arc::clone(&shutdown);

        tokio::spawn(async move {
            while !server_shutdown.load(Ordering::SeqCst) {
                let Ok(Ok((stream, _peer))) =
                    timeout(Duration::from_millis(100), listener.accept()).await
                else {
                    continue;
                };

                server_connections.fetch_add(1, Ordering::SeqCst);
                let config = Arc::clone(&config);
                let commands = Arc::clone(&server_commands);

                tokio::spawn(async move {
                    if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await {
                        tracing::debug!("Mock server client error: {e}");
                    }
                });
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands,
            connections,
            shutdown,
        })
    }
}
