//! SMTP session with the configured relay host
//!
//! A session walks through:
//! 1. TCP connect and greeting
//! 2. EHLO, falling back to HELO
//! 3. STARTTLS according to the TLS policy, then EHLO again
//! 4. AUTH when credentials are configured
//!
//! after which each message is relayed with MAIL FROM / RCPT TO / DATA and
//! the session is recovered with RSET after a failure. Every network step
//! runs under its timeout from [`SmtpTimeouts`].

use std::{fmt, future::Future, time::Duration};

use async_trait::async_trait;
use relayq_common::config::TlsConfig;
use relayq_smtp::{AuthMechanism, ClientError, Response, SmtpClient};
use serde::Deserialize;

use crate::{
    SmtpTimeouts, TransportError,
    transport::{Session, Transport},
};

/// Username and password for `AUTH`.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Relay host settings
///
/// ```ron
/// smtp: (
///     address: "smtp.example.com",
///     port: 587,
///     domain: "relay.example.com",
///     credentials: Some((username: "relay", password: "secret")),
///     authentication: Login,
///     tls: (policy: Required),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SmtpConfig {
    /// Host name of the relay. Also the name checked against its certificate.
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Name we announce in EHLO/HELO.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Authenticate only when present.
    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub authentication: AuthMechanism,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,
}

fn default_address() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    25
}

fn default_domain() -> String {
    "localhost".to_string()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            domain: default_domain(),
            credentials: None,
            authentication: AuthMechanism::default(),
            tls: TlsConfig::default(),
            timeouts: SmtpTimeouts::default(),
        }
    }
}

impl SmtpConfig {
    /// `host:port` to connect to.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Runs `future` under `limit`, turning an elapsed timer into a
/// [`TransportError::Timeout`] naming the step.
async fn bounded<T>(
    limit: Duration,
    step: &str,
    future: impl Future<Output = Result<T, ClientError>> + Send,
) -> Result<T, TransportError> {
    tokio::time::timeout(limit, future)
        .await
        .map_err(|_| TransportError::Timeout(format!("{step} timed out after {limit:?}")))?
        .map_err(TransportError::from)
}

/// A reply that must be 2xx/3xx, classified otherwise.
fn accepted(response: Response) -> Result<Response, TransportError> {
    Ok(response.into_result()?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsOutcome {
    Upgraded,
    Skipped,
    /// The handshake failed on an opportunistic upgrade; the connection is
    /// unusable and we start over in plaintext.
    RetryWithoutTls,
}

/// [`Transport`] speaking SMTP to one relay host.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    config: SmtpConfig,
}

impl SmtpTransport {
    #[must_use]
    pub const fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &SmtpConfig {
        &self.config
    }

    async fn connect_and_greet(&self) -> Result<SmtpClient, TransportError> {
        let endpoint = self.config.endpoint();
        let limit = self.config.timeouts.connect();

        let client = tokio::time::timeout(
            limit,
            SmtpClient::connect(&endpoint, self.config.address.clone()),
        )
        .await
        .map_err(|_| TransportError::Timeout(format!("connect to {endpoint} timed out")))?
        .map_err(|e| TransportError::Connection(format!("failed to connect to {endpoint}: {e}")))?;

        let mut client = client.accept_invalid_certs(self.config.tls.accepts_invalid_certs());

        let greeting = bounded(limit, "greeting", client.read_greeting()).await?;
        accepted(greeting)?;

        Ok(client)
    }

    async fn hello(&self, client: &mut SmtpClient) -> Result<(), TransportError> {
        let limit = self.config.timeouts.command();
        let domain = self.config.domain.as_str();

        let response = bounded(limit, "EHLO", client.ehlo(domain)).await?;
        if response.is_success() {
            return Ok(());
        }

        tracing::debug!(
            code = response.code,
            "EHLO refused, falling back to HELO"
        );
        accepted(bounded(limit, "HELO", client.helo(domain)).await?)?;
        Ok(())
    }

    async fn negotiate_tls(&self, client: &mut SmtpClient) -> Result<TlsOutcome, TransportError> {
        let tls = &self.config.tls;
        let advertised = client.supports("STARTTLS");

        if !tls.should_upgrade(advertised) {
            return Ok(TlsOutcome::Skipped);
        }

        let limit = self.config.timeouts.command();
        match tokio::time::timeout(limit, client.starttls()).await {
            Ok(Ok(response)) if response.is_success() => {
                self.hello(client).await?;
                Ok(TlsOutcome::Upgraded)
            }
            Ok(Ok(response)) if tls.is_required() => Err(TransportError::Connection(format!(
                "TLS is required but STARTTLS was refused: {} {}",
                response.code,
                response.message()
            ))),
            Ok(Ok(response)) => {
                tracing::info!(
                    code = response.code,
                    "STARTTLS refused, continuing in plaintext"
                );
                Ok(TlsOutcome::Skipped)
            }
            Ok(Err(e)) if tls.is_required() => Err(TransportError::Connection(format!(
                "TLS is required but the upgrade failed: {e}"
            ))),
            Ok(Err(e)) => {
                tracing::warn!("STARTTLS failed, reconnecting without TLS: {e}");
                Ok(TlsOutcome::RetryWithoutTls)
            }
            Err(_) => Err(TransportError::Timeout(format!(
                "STARTTLS timed out after {limit:?}"
            ))),
        }
    }

    async fn authenticate(&self, client: &mut SmtpClient) -> Result<(), TransportError> {
        let Some(credentials) = &self.config.credentials else {
            return Ok(());
        };

        let mechanism = self.config.authentication;
        bounded(
            self.config.timeouts.command(),
            "AUTH",
            client.auth(mechanism, &credentials.username, &credentials.password),
        )
        .await?;

        tracing::debug!(
            username = %credentials.username,
            mechanism = %mechanism,
            "Authenticated with relay"
        );
        Ok(())
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    #[tracing::instrument(skip_all, fields(relay = %self.config.endpoint()))]
    async fn connect(&self) -> Result<Box<dyn Session>, TransportError> {
        if self.config.tls.accepts_invalid_certs() {
            tracing::warn!(
                "SECURITY WARNING: TLS certificate validation is disabled for this relay"
            );
        }

        let mut client = self.connect_and_greet().await?;
        self.hello(&mut client).await?;

        if self.negotiate_tls(&mut client).await? == TlsOutcome::RetryWithoutTls {
            client = self.connect_and_greet().await?;
            self.hello(&mut client).await?;
        }

        self.authenticate(&mut client).await?;

        tracing::debug!(tls = client.is_tls(), "Relay session established");

        Ok(Box::new(SmtpSession {
            client,
            timeouts: self.config.timeouts,
        }))
    }
}

struct SmtpSession {
    client: SmtpClient,
    timeouts: SmtpTimeouts,
}

#[async_trait]
impl Session for SmtpSession {
    async fn send(&mut self, mail: &[u8], from: &str, to: &str) -> Result<String, TransportError> {
        let command = self.timeouts.command();

        accepted(bounded(command, "MAIL FROM", self.client.mail_from(from)).await?)?;
        accepted(bounded(command, "RCPT TO", self.client.rcpt_to(to)).await?)?;

        let response = accepted(bounded(command, "DATA", self.client.data()).await?)?;
        if !response.is_intermediate() {
            return Err(TransportError::Protocol(format!(
                "unexpected reply to DATA: {} {}",
                response.code,
                response.message()
            )));
        }

        let response = bounded(
            self.timeouts.data(),
            "message data",
            self.client.send_data(mail),
        )
        .await?;
        let response = accepted(response)?;

        Ok(format!("{} {}", response.code, response.message()))
    }

    async fn reset(&mut self) -> Result<(), TransportError> {
        accepted(bounded(self.timeouts.command(), "RSET", self.client.rset()).await?)?;
        Ok(())
    }

    async fn close(mut self: Box<Self>) {
        match tokio::time::timeout(self.timeouts.quit(), self.client.quit()).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::trace!("Ignoring error while closing session: {e}"),
            Err(_) => tracing::trace!("QUIT timed out while closing session"),
        }
    }
}
