//! SMTP client implementation.
//!
//! The client is deliberately low level: every command returns the raw
//! [`Response`] and callers decide what a reply code means for them.
//! [`Response::into_result`] turns 4xx/5xx replies into
//! [`ClientError::SmtpError`] for callers that want `?` propagation.
//!
//! ```no_run
//! use relayq_smtp::client::{AuthMechanism, SmtpClient};
//!
//! # async fn example() -> Result<(), relayq_smtp::ClientError> {
//! let mut client = SmtpClient::connect("smtp.example.com:587", "smtp.example.com").await?;
//! client.read_greeting().await?.into_result()?;
//! client.ehlo("relay.example.com").await?.into_result()?;
//! client.auth(AuthMechanism::Plain, "relay", "secret").await?;
//! client.mail_from("app@example.com").await?.into_result()?;
//! client.rcpt_to("user@example.org").await?.into_result()?;
//! client.data().await?.into_result()?;
//! client.send_data(b"Subject: hi\r\n\r\nhello\r\n").await?.into_result()?;
//! client.quit().await?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod data;
mod error;
mod response;
mod smtp_client;

pub use auth::AuthMechanism;
pub use data::encode_data;
pub use error::{ClientError, Result};
pub use response::{Response, ResponseLine};
pub use smtp_client::SmtpClient;
