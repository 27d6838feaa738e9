//! SMTP submission client for relayq.
//!
//! Only the client half of the protocol lives here: connecting to the
//! configured relay host, upgrading with STARTTLS, authenticating and
//! handing over queued messages one transaction at a time.

pub mod client;

pub use client::{AuthMechanism, ClientError, Response, SmtpClient};
