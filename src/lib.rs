// Podsloth - Terminal Podcast Player
// Module declarations
pub mod audio;
pub mod cli;
pub mod commands;
pub mod db;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod queue;
pub mod settings;
pub mod state;

use clap::Parser;

pub use audio::{Player, PlayerEvent, PlayerOptions, TransportState};
pub use error::PlayerError;

/// Log to stderr so stdout stays free for the progress display
fn configure_logging() {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("podsloth=info,podsloth_lib=info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

pub async fn run() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    configure_logging();
    tracing::debug!("Starting with {:?}", cli);
    cli::execute(cli).await
}
