//! Mock SMTP relay for transport tests
//!
//! Replies are scripted per command, RCPT replies can be overridden per
//! recipient, and every command line and message body is recorded.
//!
//! ```rust,ignore
//! let server = MockSmtpServer::builder()
//!     .with_extensions(&["AUTH PLAIN LOGIN"])
//!     .with_rcpt_response_for("nobody@example.org", 550, "No such user")
//!     .build()
//!     .await;
//! ```
#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream, tcp::OwnedWriteHalf},
    task::JoinHandle,
};

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
}

#[derive(Debug, Clone)]
struct MockServerConfig {
    greeting: Reply,
    ehlo: Option<Reply>,
    extensions: Vec<String>,
    starttls: Option<Reply>,
    auth: Reply,
    mail_from: Reply,
    rcpt_to: Reply,
    rcpt_overrides: HashMap<String, Reply>,
    data_end: Reply,
    stall_after_data: bool,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: Reply::new(220, "mock.example ESMTP ready"),
            ehlo: None,
            extensions: vec!["PIPELINING".to_string(), "AUTH PLAIN LOGIN".to_string()],
            starttls: None,
            auth: Reply::new(235, "2.7.0 Authentication successful"),
            mail_from: Reply::new(250, "OK"),
            rcpt_to: Reply::new(250, "OK"),
            rcpt_overrides: HashMap::new(),
            data_end: Reply::new(250, "OK: queued as 1234"),
            stall_after_data: false,
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    commands: Vec<String>,
    messages: Vec<Vec<u8>>,
    connections: usize,
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
    handle: JoinHandle<()>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::default()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Every command line received, across all connections.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.recorded.lock().unwrap().commands.clone()
    }

    /// Raw DATA payloads, still dot-stuffed, without the final `.` line.
    #[must_use]
    pub fn messages(&self) -> Vec<Vec<u8>> {
        self.recorded.lock().unwrap().messages.clone()
    }

    #[must_use]
    pub fn connections(&self) -> usize {
        self.recorded.lock().unwrap().connections
    }

    /// Number of received commands starting with `verb`.
    #[must_use]
    pub fn count(&self, verb: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.to_ascii_uppercase().starts_with(verb))
            .count()
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Debug, Default)]
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: &str) -> Self {
        self.config.greeting = Reply::new(code, message);
        self
    }

    /// Refuse EHLO with this reply, forcing a HELO fallback.
    #[must_use]
    pub fn with_ehlo_response(mut self, code: u16, message: &str) -> Self {
        self.config.ehlo = Some(Reply::new(code, message));
        self
    }

    #[must_use]
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.config.extensions = extensions.iter().map(ToString::to_string).collect();
        self
    }

    /// Reply to STARTTLS. Without this, STARTTLS is an unknown command.
    #[must_use]
    pub fn with_starttls_response(mut self, code: u16, message: &str) -> Self {
        self.config.starttls = Some(Reply::new(code, message));
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: &str) -> Self {
        self.config.auth = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: &str) -> Self {
        self.config.mail_from = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_response(mut self, code: u16, message: &str) -> Self {
        self.config.rcpt_to = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_response_for(mut self, recipient: &str, code: u16, message: &str) -> Self {
        self.config
            .rcpt_overrides
            .insert(recipient.to_ascii_lowercase(), Reply::new(code, message));
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: &str) -> Self {
        self.config.data_end = Reply::new(code, message);
        self
    }

    /// Never answer the end of DATA.
    #[must_use]
    pub const fn stall_after_data(mut self) -> Self {
        self.config.stall_after_data = true;
        self
    }

    pub async fn build(self) -> MockSmtpServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let config = Arc::new(self.config);

        let handle = {
            let recorded = Arc::clone(&recorded);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    recorded.lock().unwrap().connections += 1;
                    tokio::spawn(handle_connection(
                        stream,
                        Arc::clone(&config),
                        Arc::clone(&recorded),
                    ));
                }
            })
        };

        MockSmtpServer {
            addr,
            recorded,
            handle,
        }
    }
}

async fn reply(writer: &mut OwnedWriteHalf, reply: &Reply) -> std::io::Result<()> {
    writer
        .write_all(format!("{} {}\r\n", reply.code, reply.message).as_bytes())
        .await
}

fn address_in(command: &str) -> String {
    command
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(address, _)| address.to_ascii_lowercase())
        .unwrap_or_default()
}

async fn handle_connection(
    stream: TcpStream,
    config: Arc<MockServerConfig>,
    recorded: Arc<Mutex<Recorded>>,
) -> std::io::Result<()> {
    let (read, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read);

    reply(&mut writer, &config.greeting).await?;

    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let command = line.trim_end().to_string();
        recorded.lock().unwrap().commands.push(command.clone());
        let upper = command.to_ascii_uppercase();

        if upper.starts_with("EHLO") {
            if let Some(refused) = &config.ehlo {
                reply(&mut writer, refused).await?;
                continue;
            }
            let mut response = String::new();
            if config.extensions.is_empty() {
                response.push_str("250 mock.example\r\n");
            } else {
                response.push_str("250-mock.example\r\n");
                let last = config.extensions.len() - 1;
                for (i, extension) in config.extensions.iter().enumerate() {
                    let separator = if i == last { ' ' } else { '-' };
                    response.push_str(&format!("250{separator}{extension}\r\n"));
                }
            }
            writer.write_all(response.as_bytes()).await?;
        } else if upper.starts_with("HELO") {
            reply(&mut writer, &Reply::new(250, "mock.example")).await?;
        } else if upper.starts_with("STARTTLS") {
            match &config.starttls {
                Some(response) => reply(&mut writer, response).await?,
                None => reply(&mut writer, &Reply::new(502, "5.5.1 Unrecognized command")).await?,
            }
        } else if upper.starts_with("AUTH PLAIN") {
            reply(&mut writer, &config.auth).await?;
        } else if upper.starts_with("AUTH LOGIN") {
            for prompt in ["VXNlcm5hbWU6", "UGFzc3dvcmQ6"] {
                reply(&mut writer, &Reply::new(334, prompt)).await?;
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                recorded
                    .lock()
                    .unwrap()
                    .commands
                    .push(line.trim_end().to_string());
            }
            reply(&mut writer, &config.auth).await?;
        } else if upper.starts_with("MAIL FROM") {
            reply(&mut writer, &config.mail_from).await?;
        } else if upper.starts_with("RCPT TO") {
            let response = config
                .rcpt_overrides
                .get(&address_in(&command))
                .unwrap_or(&config.rcpt_to);
            reply(&mut writer, response).await?;
        } else if upper == "DATA" {
            reply(&mut writer, &Reply::new(354, "End data with <CR><LF>.<CR><LF>")).await?;

            let mut body = Vec::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                if line == ".\r\n" {
                    break;
                }
                body.extend_from_slice(line.as_bytes());
            }
            recorded.lock().unwrap().messages.push(body);

            if config.stall_after_data {
                std::future::pending::<()>().await;
            }
            reply(&mut writer, &config.data_end).await?;
        } else if upper == "RSET" {
            reply(&mut writer, &Reply::new(250, "2.0.0 Reset")).await?;
        } else if upper == "QUIT" {
            reply(&mut writer, &Reply::new(221, "2.0.0 Bye")).await?;
            return Ok(());
        } else {
            reply(&mut writer, &Reply::new(500, "5.5.2 Syntax error")).await?;
        }
    }
}
