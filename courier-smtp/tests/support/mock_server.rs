//! Mock SMTP server for driving the client over real TCP.
//!
//! The server can:
//! - answer each command with a configurable reply
//! - run an AUTH LOGIN exchange
//! - stay silent to exercise the watchdog
//! - trickle replies a byte at a time to exercise reply buffering
//! - drop the connection after N commands
//!
//! Everything the client writes is recorded for transcript assertions.
#![allow(dead_code)] // Test utility module - not all methods used in every test

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    sync::RwLock,
    task::JoinHandle,
};

/// Something the client wrote, as the server understood it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    StartTls,
    AuthLogin,
    /// A line sent in answer to a `334` prompt, still Base64 encoded.
    Credential(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    /// Everything between DATA's `354` and the terminating dot, dot included.
    MessageContent(String),
    Quit,
    Other(String),
}

impl SmtpCommand {
    /// The SMTP verb, for compact transcript assertions.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Ehlo(_) => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::AuthLogin => "AUTH LOGIN",
            Self::Credential(_) => "<credential>",
            Self::MailFrom(_) => "MAIL FROM",
            Self::RcptTo(_) => "RCPT TO",
            Self::Data => "DATA",
            Self::MessageContent(_) => "<message>",
            Self::Quit => "QUIT",
            Self::Other(_) => "<other>",
        }
    }
}

/// Response configuration for SMTP commands
#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
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

#[derive(Clone)]
struct MockServerConfig {
    greeting: Option<SmtpResponse>,
    ehlo_code: u16,
    ehlo_capabilities: Vec<String>,
    starttls_response: SmtpResponse,
    auth_username_prompt: SmtpResponse,
    auth_password_prompt: SmtpResponse,
    auth_result: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,

    trickle: bool,
    drop_after_commands: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: Some(SmtpResponse::new(220, "mock.example.com ESMTP")),
            ehlo_code: 250,
            ehlo_capabilities: vec![
                "mock.example.com".to_string(),
                "SIZE 10000000".to_string(),
                "AUTH LOGIN PLAIN".to_string(),
            ],
            starttls_response: SmtpResponse::new(502, "Command not implemented"),
            auth_username_prompt: SmtpResponse::new(334, "VXNlcm5hbWU6"),
            auth_password_prompt: SmtpResponse::new(334, "UGFzc3dvcmQ6"),
            auth_result: SmtpResponse::new(235, "Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: queued"),
            quit_response: SmtpResponse::new(221, "Bye"),
            trickle: false,
            drop_after_commands: None,
        }
    }
}

impl MockServerConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let last = self.ehlo_capabilities.len().saturating_sub(1);
        self.ehlo_capabilities
            .iter()
            .enumerate()
            .map(|(i, cap)| {
                let sep = if i == last { ' ' } else { '-' };
                format!("{}{sep}{cap}\r\n", self.ehlo_code)
            })
            .collect::<String>()
            .into_bytes()
    }
}

/// A running mock server. Shut down on drop.
pub struct MockSmtpServer {
    addr: SocketAddr,
    commands_received: Arc<RwLock<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockSmtpServer {
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::new()
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Everything received so far, in order.
    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands_received.read().await.clone()
    }

    /// The verbs received so far, in order.
    pub async fn transcript(&self) -> Vec<&'static str> {
        self.commands().await.iter().map(SmtpCommand::verb).collect()
    }

    /// Number of accepted TCP connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    async fn reply(
        writer: &mut OwnedWriteHalf,
        config: &MockServerConfig,
        bytes: &[u8],
    ) -> std::io::Result<()> {
        if config.trickle {
            for byte in bytes {
                writer.write_all(std::slice::from_ref(byte)).await?;
                writer.flush().await?;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        } else {
            writer.write_all(bytes).await?;
            writer.flush().await?;
        }
        Ok(())
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut received = 0;
        let mut credentials_expected = 0;

        let Some(greeting) = &config.greeting else {
            // Silent server: hold the connection open and never speak
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                commands
                    .write()
                    .await
                    .push(SmtpCommand::Other(line.trim_end().to_string()));
            }
        };
        Self::reply(&mut writer, &config, &greeting.to_bytes()).await?;

        loop {
            line.clear();

            if config
                .drop_after_commands
                .is_some_and(|limit| received >= limit)
            {
                return Ok(());
            }

            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            received += 1;

            let cmd_line = line.trim_end_matches(['\r', '\n']);
            tracing::debug!("Mock server received: {cmd_line}");

            if credentials_expected > 0 {
                credentials_expected -= 1;
                commands
                    .write()
                    .await
                    .push(SmtpCommand::Credential(cmd_line.to_string()));
                let response = if credentials_expected == 1 {
                    &config.auth_password_prompt
                } else {
                    &config.auth_result
                };
                if response.code != 334 {
                    credentials_expected = 0;
                }
                Self::reply(&mut writer, &config, &response.to_bytes()).await?;
                continue;
            }

            let upper = cmd_line.to_ascii_uppercase();
            let (command, response) = if let Some(name) = upper.strip_prefix("EHLO ") {
                (
                    SmtpCommand::Ehlo(name.to_ascii_lowercase()),
                    config.ehlo_bytes(),
                )
            } else if upper == "STARTTLS" {
                (SmtpCommand::StartTls, config.starttls_response.to_bytes())
            } else if upper == "AUTH LOGIN" {
                if config.auth_username_prompt.code == 334 {
                    credentials_expected = 2;
                }
                (
                    SmtpCommand::AuthLogin,
                    config.auth_username_prompt.to_bytes(),
                )
            } else if upper.starts_with("MAIL FROM:") {
                (
                    SmtpCommand::MailFrom(cmd_line["MAIL FROM:".len()..].to_string()),
                    config.mail_from_response.to_bytes(),
                )
            } else if upper.starts_with("RCPT TO:") {
                (
                    SmtpCommand::RcptTo(cmd_line["RCPT TO:".len()..].to_string()),
                    config.rcpt_to_response.to_bytes(),
                )
            } else if upper == "DATA" {
                (SmtpCommand::Data, config.data_response.to_bytes())
            } else if upper == "QUIT" {
                commands.write().await.push(SmtpCommand::Quit);
                Self::reply(&mut writer, &config, &config.quit_response.to_bytes()).await?;
                return Ok(());
            } else {
                (
                    SmtpCommand::Other(cmd_line.to_string()),
                    SmtpResponse::new(500, "Unknown command").to_bytes(),
                )
            };

            let is_data = command == SmtpCommand::Data;
            commands.write().await.push(command);
            Self::reply(&mut writer, &config, &response).await?;

            if is_data && config.data_response.code == 354 {
                let mut content = String::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    content.push_str(&line);
                    if line == ".\r\n" {
                        break;
                    }
                }
                commands
                    .write()
                    .await
                    .push(SmtpCommand::MessageContent(content));
                Self::reply(&mut writer, &config, &config.data_end_response.to_bytes()).await?;
            }
        }
    }
}

/// Builder for configuring a `MockSmtpServer`
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    fn new() -> Self {
        Self {
            config: MockServerConfig::default(),
        }
    }

    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.greeting = Some(SmtpResponse::new(code, message));
        self
    }

    /// Accept connections but never send a greeting.
    pub fn silent(mut self) -> Self {
        self.config.greeting = None;
        self
    }

    pub fn with_ehlo_response(mut self, code: u16, capabilities: &[&str]) -> Self {
        self.config.ehlo_code = code;
        self.config.ehlo_capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_starttls_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.starttls_response = SmtpResponse::new(code, message);
        self
    }

    pub fn with_auth_username_prompt(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_username_prompt = SmtpResponse::new(code, message);
        self
    }

    pub fn with_auth_password_prompt(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_password_prompt = SmtpResponse::new(code, message);
        self
    }

    pub fn with_auth_result(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_result = SmtpResponse::new(code, message);
        self
    }

    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    pub fn with_data_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_response = SmtpResponse::new(code, message);
        self
    }

    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    /// Send every reply one byte at a time.
    pub const fn trickle(mut self) -> Self {
        self.config.trickle = true;
        self
    }

    /// Close the connection after reading N commands.
    pub const fn with_network_error_after_commands(mut self, count: usize) -> Self {
        self.config.drop_after_commands = Some(count);
        self
    }

    /// Build and start the mock SMTP server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let commands_clone = Arc::clone(&commands);
        let connections_clone = Arc::clone(&connections);

        let handle = tokio::spawn(async move {
            while let Ok((stream, _peer)) = listener.accept().await {
                connections_clone.fetch_add(1, Ordering::Relaxed);
                let config = Arc::clone(&config);
                let commands = Arc::clone(&commands_clone);

                tokio::spawn(async move {
                    if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await
                    {
                        tracing::debug!("Mock server client error: {e}");
                    }
                });
            }
        });

        Ok(MockSmtpServer {
            addr,
            commands_received: commands,
            connections,
            handle,
        })
    }
}
