use std::sync::{Arc, LazyLock};

use relayq_common::{Shutdown, Signal, internal, logging};
use relayq_delivery::{DeliveryConfig, DeliveryProcessor, SmtpConfig, SmtpTransport};
use relayq_store::StoreConfig;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::mailq;

/// The daemon as described by its configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct Relayq {
    #[serde(default)]
    pub verbose: bool,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Waits for SIGINT or SIGTERM and broadcasts [`Signal::Shutdown`].
///
/// Only returns early on a second Ctrl+C, which forces the daemon down
/// without waiting for the current message.
#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Forcing shutdown");

    Ok(())
}

impl Relayq {
    /// Run the delivery loop until it stops or a signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened, or when delivery
    /// gives up (repeated authentication failures, store failures).
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init(self.verbose);

        internal!(level = INFO, "Controller running");

        let store = self.store.open().await?;
        let transport = Arc::new(SmtpTransport::new(self.smtp));
        let mut processor = DeliveryProcessor::new(store, transport, self.delivery);

        let ret = tokio::select! {
            r = processor.serve(Shutdown::new(SHUTDOWN_BROADCAST.subscribe())) => {
                r.map_err(anyhow::Error::from)
            }
            r = shutdown() => {
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }

    /// Print the queue report for the configured store to stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or read.
    pub async fn mailq(self) -> anyhow::Result<()> {
        logging::init(self.verbose);

        let store = self.store.open().await?;
        let pending = store.pending().await?;
        print!("{}", mailq::report(&pending));

        Ok(())
    }
}
