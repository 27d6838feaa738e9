//! Latching view over the process-wide shutdown broadcast.
//!
//! Long-running loops hold one of these and check it at their safe
//! checkpoints (between messages, during sleeps). Once a stop has been
//! observed it stays observed.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::Signal;

#[derive(Debug)]
pub struct Shutdown {
    receiver: Option<broadcast::Receiver<Signal>>,
    requested: bool,
}

impl Shutdown {
    #[must_use]
    pub const fn new(receiver: broadcast::Receiver<Signal>) -> Self {
        Self {
            receiver: Some(receiver),
            requested: false,
        }
    }

    /// A listener that is never signalled, for single-pass runs and tests.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            receiver: None,
            requested: false,
        }
    }

    /// Non-blocking check for a pending stop request.
    pub fn is_requested(&mut self) -> bool {
        if self.requested {
            return true;
        }

        let Some(receiver) = self.receiver.as_mut() else {
            return false;
        };

        self.requested = match receiver.try_recv() {
            Ok(Signal::Shutdown) | Err(TryRecvError::Closed | TryRecvError::Lagged(_)) => true,
            Err(TryRecvError::Empty) => false,
        };

        self.requested
    }

    /// Resolves once a stop has been requested. Never resolves for
    /// [`Shutdown::never`].
    pub async fn requested(&mut self) {
        if self.requested {
            return;
        }

        match self.receiver.as_mut() {
            Some(receiver) => {
                if let Err(e) = receiver.recv().await {
                    tracing::debug!("Shutdown channel ended: {e}");
                }
                self.requested = true;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Sleep for `duration` unless a stop request arrives first.
    ///
    /// Returns `true` when the sleep was cut short by shutdown.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }

        tokio::select! {
            () = tokio::time::sleep(duration) => false,
            () = self.requested() => true,
        }
    }
}
