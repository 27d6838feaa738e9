//! Typed error handling for delivery.
//!
//! Every transport failure falls into exactly one [`FailureKind`], and the
//! delivery engine picks its policy from the kind alone:
//! - `Permanent` (5xx): mark the message failed, reset, continue the batch
//! - `Protocol` / `Timeout`: leave the message pending, reset, continue
//! - `ServerBusy` (4xx): save the message, abort the batch, back off
//! - `Authentication`: abort the batch, escalate after repeated failures
//! - `Connection`: end the batch quietly

use std::{fmt, io};

use relayq_smtp::ClientError;
use relayq_store::StoreError;
use thiserror::Error;

/// The closed set of delivery outcome classes other than success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Permanent,
    ServerBusy,
    Protocol,
    Timeout,
    Authentication,
    Connection,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Permanent => "permanent",
            Self::ServerBusy => "server busy",
            Self::Protocol => "protocol",
            Self::Timeout => "timeout",
            Self::Authentication => "authentication",
            Self::Connection => "connection",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure talking to the relay host.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server rejected the message for good (5xx).
    #[error("{code} {message}")]
    Permanent { code: u16, message: String },

    /// The server asked us to come back later (4xx).
    #[error("{code} {message}")]
    ServerBusy { code: u16, message: String },

    /// Malformed or unexpected reply.
    #[error("{0}")]
    Protocol(String),

    /// A network step did not complete within its timeout.
    #[error("{0}")]
    Timeout(String),

    /// The server refused the configured credentials.
    #[error("{0}")]
    Authentication(String),

    /// Broken pipe, reset, refused connection or failed TLS.
    #[error("{0}")]
    Connection(String),
}

impl TransportError {
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Permanent { .. } => FailureKind::Permanent,
            Self::ServerBusy { .. } => FailureKind::ServerBusy,
            Self::Protocol(_) => FailureKind::Protocol,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Authentication(_) => FailureKind::Authentication,
            Self::Connection(_) => FailureKind::Connection,
        }
    }

    /// The text stored in a message's `last_error`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}: {self}", self.kind())
    }

    /// Classify a reply code that ended an exchange unsuccessfully.
    #[must_use]
    pub fn from_reply(code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            400..=499 => Self::ServerBusy { code, message },
            500..=599 => Self::Permanent { code, message },
            _ => Self::Protocol(format!("unexpected reply {code} {message}")),
        }
    }
}

impl From<ClientError> for TransportError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::SmtpError { code, message }
            | ClientError::UnexpectedResponse { code, message } => Self::from_reply(code, message),

            ClientError::AuthenticationFailed { code, message } => {
                Self::Authentication(format!("{code} {message}"))
            }

            ClientError::Io(e) if e.kind() == io::ErrorKind::TimedOut => {
                Self::Timeout(e.to_string())
            }

            ClientError::Io(e) => Self::Connection(e.to_string()),
            ClientError::ConnectionClosed => {
                Self::Connection("connection closed unexpectedly".to_string())
            }
            ClientError::TlsError(msg) => Self::Connection(format!("TLS: {msg}")),

            ClientError::ParseError(msg) => Self::Protocol(msg),
            ClientError::Utf8Error(e) => Self::Protocol(format!("reply is not UTF-8: {e}")),
        }
    }
}

/// Errors that escape a delivery run.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Authentication kept failing; retrying will not help.
    #[error("Giving up after {failures} consecutive authentication failures: {source}")]
    AuthenticationExhausted {
        failures: u32,
        #[source]
        source: TransportError,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DeliveryError {
    /// `true` when another process won the race for the claim lock.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        match self {
            Self::Store(error) => error.is_conflict(),
            Self::AuthenticationExhausted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_codes_pick_the_kind() {
        let busy: TransportError = ClientError::SmtpError {
            code: 421,
            message: "try later".to_string(),
        }
        .into();
        assert_eq!(busy.kind(), FailureKind::ServerBusy);

        let rejected: TransportError = ClientError::SmtpError {
            code: 550,
            message: "no such user".to_string(),
        }
        .into();
        assert_eq!(rejected.kind(), FailureKind::Permanent);
        assert_eq!(rejected.describe(), "permanent: 550 no such user");

        let odd: TransportError = ClientError::UnexpectedResponse {
            code: 199,
            message: "what".to_string(),
        }
        .into();
        assert_eq!(odd.kind(), FailureKind::Protocol);
    }

    #[test]
    fn io_errors_split_on_timeout() {
        let timeout: TransportError =
            ClientError::Io(io::Error::new(io::ErrorKind::TimedOut, "slow")).into();
        assert_eq!(timeout.kind(), FailureKind::Timeout);

        let reset: TransportError =
            ClientError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset")).into();
        assert_eq!(reset.kind(), FailureKind::Connection);
    }

    #[test]
    fn connection_level_failures() {
        for error in [
            ClientError::ConnectionClosed,
            ClientError::TlsError("handshake".to_string()),
        ] {
            assert_eq!(TransportError::from(error).kind(), FailureKind::Connection);
        }
    }

    #[test]
    fn parse_failures_are_protocol_errors() {
        let error: TransportError = ClientError::ParseError("garbage".to_string()).into();
        assert_eq!(error.kind(), FailureKind::Protocol);
        assert_eq!(error.describe(), "protocol: garbage");
    }

    #[test]
    fn refused_credentials_are_authentication_errors() {
        let error: TransportError = ClientError::AuthenticationFailed {
            code: 535,
            message: "5.7.8 bad credentials".to_string(),
        }
        .into();
        assert_eq!(error.kind(), FailureKind::Authentication);
        assert_eq!(error.to_string(), "535 5.7.8 bad credentials");
    }

    #[test]
    fn conflicts_are_recognised() {
        let conflict = DeliveryError::from(StoreError::Conflict("busy".to_string()));
        assert!(conflict.is_conflict());

        let fatal = DeliveryError::AuthenticationExhausted {
            failures: 2,
            source: TransportError::Authentication("535".to_string()),
        };
        assert!(!fatal.is_conflict());
    }
}
