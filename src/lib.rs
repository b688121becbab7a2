pub mod cli;
pub mod cmd;
pub mod config;
pub mod discovery;
pub mod fs;
pub mod hooks;
pub mod platform;
pub mod service;
pub mod suspend;
pub mod types;
pub mod verify;

use anyhow::{Context, Result};
use clap::Parser as _;
use cmd::IntoCommand as _;
use shadow_rs::shadow;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

shadow!(build);

pub async fn run() -> Result<()> {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let (filter, reload_handle) = tracing_subscriber::reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = cli::Cli::parse();

    if let cli::GlobalSubcommand::Suspend(suspend_options) = &args.command {
        if suspend_options.debug {
            reload_handle
                .modify(|filter| {
                    *filter = tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "debug".into())
                })
                .context("Failed to update log level to DEBUG")?;

            tracing::info!("Log level set to DEBUG");
        }

        tracing::info!(
            "luks-suspend version: v{}  commit: {}  buildtime: {}",
            build::PKG_VERSION,
            build::COMMIT_HASH,
            build::BUILD_TIME
        );
    }

    // Handle the command
    args.command.into_command().run().await?;

    Ok(())
}
