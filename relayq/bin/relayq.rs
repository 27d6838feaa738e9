#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use clap::Parser;
use relayq::{
    cli::{Cli, Command},
    config::{self, CONFIG_ENV},
};

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env = std::env::var(CONFIG_ENV).ok();
    let config_path = config::find_config_file(cli.config.as_deref(), env.as_deref())?;
    let mut relayq = config::load(&config_path)?;
    cli.apply(&mut relayq);

    match cli.command {
        Some(Command::Mailq) => relayq.mailq().await,
        None => relayq.run().await,
    }
}
