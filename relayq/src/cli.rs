use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::controller::Relayq;

/// Deliver queued mail through an SMTP relay
#[derive(Parser, Debug)]
#[command(name = "relayq")]
#[command(about = "Deliver queued mail through an SMTP relay", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: $RELAYQ_CONFIG, ./relayq.config.ron,
    /// /etc/relayq/relayq.config.ron)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only check for new mail and deliver once
    #[arg(short, long)]
    pub once: bool,

    /// Maximum number of emails to send per run
    #[arg(short, long, value_name = "BATCH_SIZE")]
    pub batch_size: Option<usize>,

    /// Delay between checks for new mail, in seconds
    #[arg(long, value_name = "SECONDS")]
    pub delay: Option<u64>,

    /// Maximum age of an unsent email, in seconds. 0 disables expiry
    #[arg(long, value_name = "SECONDS")]
    pub max_age: Option<u64>,

    /// Be verbose
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Display a list of emails waiting to be sent
    Mailq,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    pub fn apply(&self, config: &mut Relayq) {
        if self.once {
            config.delivery.once = true;
        }
        if let Some(batch_size) = self.batch_size {
            config.delivery.batch_size = Some(batch_size);
        }
        if let Some(delay) = self.delay {
            config.delivery.poll_delay_secs = delay;
        }
        if let Some(max_age) = self.max_age {
            config.delivery.max_age_secs = max_age;
        }
        if self.verbose {
            config.verbose = true;
        }
    }
}
