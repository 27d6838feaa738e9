//! The seam between the delivery engine and the relay host.

use async_trait::async_trait;

use crate::TransportError;

/// Opens sessions with the relay host.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects, greets, negotiates TLS and authenticates.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Authentication`] when the credentials are
    /// refused, or another kind when the session could not be set up.
    async fn connect(&self) -> Result<Box<dyn Session>, TransportError>;
}

/// An established session, reused for every message of a batch.
#[async_trait]
pub trait Session: Send {
    /// Relays `mail` from `from` to `to`, returning the server's final reply.
    ///
    /// # Errors
    ///
    /// Returns the classified failure for this message.
    async fn send(&mut self, mail: &[u8], from: &str, to: &str) -> Result<String, TransportError>;

    /// Clears the transaction state after a failed send, keeping the
    /// connection open.
    ///
    /// # Errors
    ///
    /// Returns an error if the server refuses or the connection is gone.
    async fn reset(&mut self) -> Result<(), TransportError>;

    /// Ends the session. Failures here are teardown noise and ignored.
    async fn close(self: Box<Self>);
}
